// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Seeded random streams owned by an experiment.
//!
//! Inter-arrival sampling, invocation ordering and specification sampling each
//! draw from their own stream. All three are seeded from the experiment seed,
//! so a stream's output does not depend on how much the others were used.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RandomSource {
    seed: u64,
    iat: StdRng,
    invocation: StdRng,
    spec: StdRng,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            iat: StdRng::seed_from_u64(seed),
            invocation: StdRng::seed_from_u64(seed),
            spec: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Stream for inter-arrival times and schedule shifts.
    pub fn iat(&mut self) -> &mut StdRng {
        &mut self.iat
    }

    /// Stream for invocation ordering.
    pub fn invocation(&mut self) -> &mut StdRng {
        &mut self.invocation
    }

    /// Stream for runtime and memory specifications.
    pub fn spec(&mut self) -> &mut StdRng {
        &mut self.spec
    }
}
