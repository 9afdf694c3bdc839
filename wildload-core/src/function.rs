// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Function model: empirical trace statistics and generated specifications.

use serde::{Deserialize, Serialize};

use crate::config::TraceGranularity;
use crate::types::{Endpoint, FunctionName};

/// Historical execution time distribution of a function, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionRuntimeStats {
    pub average: u64,
    pub count: u64,
    pub minimum: u64,
    pub maximum: u64,
    pub percentile0: u64,
    pub percentile1: u64,
    pub percentile25: u64,
    pub percentile50: u64,
    pub percentile75: u64,
    pub percentile99: u64,
    pub percentile100: u64,
}

/// Historical allocated memory distribution of a function, in MiB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMemoryStats {
    pub average: u64,
    pub count: u64,
    pub percentile1: u64,
    pub percentile5: u64,
    pub percentile25: u64,
    pub percentile50: u64,
    pub percentile75: u64,
    pub percentile95: u64,
    pub percentile99: u64,
    pub percentile100: u64,
}

/// Target invocation count for every trace slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionInvocationStats {
    invocations: Vec<u64>,
}

impl FunctionInvocationStats {
    pub fn new(invocations: Vec<u64>) -> Self {
        Self { invocations }
    }

    /// Flat synthetic schedule issuing `rps` requests per second for `slots` slots.
    pub fn from_rps(rps: f64, slots: usize, granularity: TraceGranularity) -> Self {
        let per_slot = (rps * granularity.slot_duration().as_secs_f64()).round() as u64;
        Self {
            invocations: vec![per_slot; slots],
        }
    }

    /// Invocations requested in slot `index`, zero past the end of the trace.
    pub fn at(&self, index: usize) -> u64 {
        self.invocations.get(index).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.invocations
    }

    /// Keep only the first `slots` entries.
    pub fn truncate(&mut self, slots: usize) {
        self.invocations.truncate(slots);
    }
}

/// Resource contract for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSpecification {
    /// Requested execution time in milliseconds.
    pub runtime: u64,
    /// Requested memory in MiB.
    pub memory: u64,
}

/// Generated schedule of a function, indexed `[slot][invocation]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpecification {
    /// Inter-arrival delays in microseconds.
    pub iat: Vec<Vec<f64>>,
    pub runtime_specification: Vec<Vec<RuntimeSpecification>>,
}

impl FunctionSpecification {
    /// Delays and resource specs of one slot. Empty past the end of the schedule.
    pub fn slot(&self, index: usize) -> (&[f64], &[RuntimeSpecification]) {
        let iat = self.iat.get(index).map(Vec::as_slice).unwrap_or(&[]);
        let specs = self
            .runtime_specification
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        (iat, specs)
    }

    pub fn slots(&self) -> usize {
        self.iat.len()
    }

    pub fn total_invocations(&self) -> usize {
        self.iat.iter().map(Vec::len).sum()
    }
}

/// A function taking part in an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: FunctionName,
    /// Set by the deployer before scheduling starts.
    pub endpoint: Option<Endpoint>,
    pub invocation_stats: FunctionInvocationStats,
    pub runtime_stats: FunctionRuntimeStats,
    pub memory_stats: FunctionMemoryStats,
    /// Instances to pre-provision, computed from the profiling slot.
    #[serde(default)]
    pub initial_scale: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<FunctionSpecification>,
}

impl Function {
    pub fn new(
        name: FunctionName,
        invocation_stats: FunctionInvocationStats,
        runtime_stats: FunctionRuntimeStats,
        memory_stats: FunctionMemoryStats,
    ) -> Self {
        Self {
            name,
            endpoint: None,
            invocation_stats,
            runtime_stats,
            memory_stats,
            initial_scale: 0,
            specification: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Whether the trace carries a fixed, user-supplied specification.
    ///
    /// Upstream tooling marks such functions by setting the 100th memory
    /// percentile equal to the maximum runtime.
    pub fn has_fixed_specification(&self) -> bool {
        self.memory_stats.percentile100 == self.runtime_stats.maximum
    }
}
