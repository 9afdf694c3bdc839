// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Execution records: the durable outcome of one invocation attempt.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Experiment phase an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    /// Stabilises the platform; excluded from steady-state analysis.
    Warmup,
    /// Measured part of the experiment.
    Execution,
}

impl ExperimentPhase {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Execution => "execution",
        }
    }
}

impl fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Invocation identifier, unique per function within an experiment.
pub fn compose_invocation_id(minute_index: usize, invocation_index: usize) -> String {
    format!("min{}.inv{}", minute_index, invocation_index)
}

/// One row of the record file.
///
/// All durations are in microseconds. Exactly one of {success, one or more
/// timeout flags} holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub phase: ExperimentPhase,
    /// Server identity that handled the request, the function name until known.
    pub instance: String,
    pub invocation_id: String,
    /// Wall-clock start, microseconds since the Unix epoch.
    pub start_time: i64,

    pub requested_duration: u64,
    pub connection_establish_time: u64,
    pub response_time: u64,
    pub actual_duration: u64,
    /// KiB.
    pub actual_memory_usage: u64,

    pub connection_timeout: bool,
    pub function_timeout: bool,
    pub memory_allocation_timeout: bool,
}

impl ExecutionRecord {
    /// Fresh record for an invocation about to be issued.
    pub fn new(
        phase: ExperimentPhase,
        instance: impl Into<String>,
        invocation_id: String,
        start_time: i64,
        requested_runtime_ms: u64,
    ) -> Self {
        Self {
            phase,
            instance: instance.into(),
            invocation_id,
            start_time,
            requested_duration: requested_runtime_ms * 1_000,
            connection_establish_time: 0,
            response_time: 0,
            actual_duration: 0,
            actual_memory_usage: 0,
            connection_timeout: false,
            function_timeout: false,
            memory_allocation_timeout: false,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.connection_timeout && !self.function_timeout && !self.memory_allocation_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_id() {
        assert_eq!(compose_invocation_id(1, 2), "min1.inv2");
        assert_ne!(compose_invocation_id(1, 12), compose_invocation_id(11, 2));
    }

    #[test]
    fn test_new_record_is_success() {
        let record = ExecutionRecord::new(
            ExperimentPhase::Execution,
            "f",
            compose_invocation_id(0, 0),
            1,
            250,
        );
        assert!(record.is_success());
        assert_eq!(record.requested_duration, 250_000);
    }

    #[test]
    fn test_any_timeout_flag_is_failure() {
        let mut record =
            ExecutionRecord::new(ExperimentPhase::Warmup, "f", compose_invocation_id(0, 0), 1, 1);
        record.memory_allocation_timeout = true;
        assert!(!record.is_success());
    }
}
