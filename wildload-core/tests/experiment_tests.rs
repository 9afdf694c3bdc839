// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end experiment tests.
//!
//! Experiments run against in-process stub clients on a paused clock, so a
//! twenty-minute trace replays in milliseconds of real time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use wildload_core::generator::generate_iat_files;
use wildload_core::{
    read_records, Driver, Endpoint, ExecutionRecord, ExperimentConfig, ExperimentPhase, Function,
    FunctionInvocationStats, FunctionMemoryStats, FunctionName, FunctionRuntimeStats,
    IatDistribution, InvocationClient, InvocationReply, InvocationRequest, InvokeError, LoadError,
};

/// Replies like a healthy trace function.
struct AlwaysSucceeds {
    calls: AtomicU64,
}

impl AlwaysSucceeds {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl InvocationClient for AlwaysSucceeds {
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationReply, InvokeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(InvocationReply::ok(format!(
            r#"{{"Status":"OK","Function":"{}","MachineName":"stub","ExecutionTime":{}}}"#,
            request.function_name,
            request.runtime_specification.runtime * 1000
        )))
    }
}

/// Nothing is listening.
struct ConnectionRefused;

#[async_trait]
impl InvocationClient for ConnectionRefused {
    async fn invoke(&self, _request: InvocationRequest) -> Result<InvocationReply, InvokeError> {
        Err(InvokeError::Connection {
            reason: "connection refused".to_string(),
        })
    }
}

/// Replies only after `delay`.
struct Slow {
    delay: Duration,
}

#[async_trait]
impl InvocationClient for Slow {
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationReply, InvokeError> {
        tokio::time::sleep(self.delay).await;
        AlwaysSucceeds::new().invoke(request).await
    }
}

fn trace_function(name: &str, invocations: Vec<u64>) -> Function {
    Function::new(
        FunctionName::new(name).unwrap(),
        FunctionInvocationStats::new(invocations),
        FunctionRuntimeStats {
            average: 50,
            count: 100,
            minimum: 1,
            maximum: 100,
            percentile0: 1,
            percentile1: 2,
            percentile25: 25,
            percentile50: 50,
            percentile75: 75,
            percentile99: 99,
            percentile100: 100,
        },
        FunctionMemoryStats {
            average: 128,
            count: 100,
            percentile1: 64,
            percentile5: 70,
            percentile25: 100,
            percentile50: 128,
            percentile75: 160,
            percentile95: 200,
            percentile99: 250,
            percentile100: 256,
        },
    )
    .with_endpoint(Endpoint::new("localhost:8080").unwrap())
}

fn experiment(temp_dir: &TempDir, experiment_duration: u64) -> ExperimentConfig {
    ExperimentConfig {
        seed: 42,
        distribution: IatDistribution::Equidistant,
        experiment_duration,
        output_dir: temp_dir.path().join("out"),
        output_prefix: "test".to_string(),
        max_concurrency: 4,
        ..Default::default()
    }
}

fn records_of(config: &ExperimentConfig) -> Vec<ExecutionRecord> {
    read_records(config.output_file()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_twenty_minute_equidistant_replay() {
    let temp_dir = TempDir::new().unwrap();
    let config = experiment(&temp_dir, 20);
    let client = Arc::new(AlwaysSucceeds::new());

    let summary = Driver::new(
        config.clone(),
        vec![trace_function("trace-func-0", vec![5; 20])],
        client.clone(),
    )
    .run_experiment()
    .await
    .unwrap();

    assert_eq!(summary.issued, 100);
    assert_eq!(summary.successes, 100);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.records_written, 100);
    assert!(!summary.overloaded);
    assert_eq!(client.calls.load(Ordering::Relaxed), 100);

    let records = records_of(&config);
    assert_eq!(records.len(), 100);
    for record in &records {
        assert_eq!(record.phase, ExperimentPhase::Execution);
        assert!(record.is_success());
        assert!(!record.connection_timeout);
        assert!(!record.function_timeout);
        assert!(!record.memory_allocation_timeout);
        assert_eq!(record.instance, "trace-func-0");
    }

    for pair in records.windows(2) {
        let delta = (pair[1].start_time - pair[0].start_time).abs();
        assert!(delta < 20_000_000, "start times {} µs apart", delta);
    }

    assert!(!config.overload_flag_file().exists());
}

#[tokio::test(start_paused = true)]
async fn test_warmup_records_precede_execution() {
    let temp_dir = TempDir::new().unwrap();
    // One profiling slot, one warmup slot, one measured slot.
    let config = ExperimentConfig {
        warmup_duration: 1,
        ..experiment(&temp_dir, 1)
    };

    let summary = Driver::new(
        config.clone(),
        vec![trace_function("trace-func-0", vec![5, 5, 5])],
        Arc::new(AlwaysSucceeds::new()),
    )
    .run_experiment()
    .await
    .unwrap();
    assert_eq!(summary.records_written, 10);

    let records = records_of(&config);
    assert_eq!(records.len(), 10);
    for record in &records[..5] {
        assert_eq!(record.phase, ExperimentPhase::Warmup);
        assert!(record.invocation_id.starts_with("min1."));
    }
    for record in &records[5..] {
        assert_eq!(record.phase, ExperimentPhase::Execution);
        assert!(record.invocation_id.starts_with("min2."));
    }
}

#[tokio::test(start_paused = true)]
async fn test_invocation_ids_unique() {
    let temp_dir = TempDir::new().unwrap();
    let config = ExperimentConfig {
        distribution: IatDistribution::Exponential,
        shift: true,
        ..experiment(&temp_dir, 4)
    };

    let functions = vec![
        trace_function("trace-func-0", vec![3, 0, 7, 12]),
        trace_function("trace-func-1", vec![10, 1, 1, 2]),
    ];
    let summary = Driver::new(config.clone(), functions, Arc::new(AlwaysSucceeds::new()))
        .run_experiment()
        .await
        .unwrap();
    assert_eq!(summary.records_written, 36);

    let records = records_of(&config);
    let ids: HashSet<(String, String)> = records
        .iter()
        .map(|r| (r.instance.clone(), r.invocation_id.clone()))
        .collect();
    assert_eq!(ids.len(), records.len());

    let per_function = |name: &str| records.iter().filter(|r| r.instance == name).count();
    assert_eq!(per_function("trace-func-0"), 22);
    assert_eq!(per_function("trace-func-1"), 14);
}

#[tokio::test(start_paused = true)]
async fn test_failures_recorded_and_overload_flagged() {
    let temp_dir = TempDir::new().unwrap();
    let config = experiment(&temp_dir, 2);

    let summary = Driver::new(
        config.clone(),
        vec![trace_function("trace-func-0", vec![4, 4])],
        Arc::new(ConnectionRefused),
    )
    .run_experiment()
    .await
    .unwrap();

    assert_eq!(summary.failures, 8);
    assert_eq!(summary.successes, 0);
    assert!(summary.overloaded);
    assert!(config.overload_flag_file().exists());

    let records = records_of(&config);
    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r.connection_timeout && !r.is_success()));
}

#[tokio::test(start_paused = true)]
async fn test_stragglers_recorded_after_force_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let config = ExperimentConfig {
        force_timeout: Duration::from_secs(5),
        ..experiment(&temp_dir, 2)
    };

    let summary = Driver::new(
        config.clone(),
        vec![trace_function("trace-func-0", vec![2, 2])],
        Arc::new(Slow {
            delay: Duration::from_secs(120),
        }),
    )
    .run_experiment()
    .await
    .unwrap();

    assert_eq!(summary.issued, 4);
    assert_eq!(summary.records_written, 4);
    assert!(records_of(&config).iter().all(ExecutionRecord::is_success));
}

#[tokio::test(start_paused = true)]
async fn test_replay_from_iat_files() {
    let temp_dir = TempDir::new().unwrap();
    let config = ExperimentConfig {
        distribution: IatDistribution::Exponential,
        ..experiment(&temp_dir, 3)
    };

    let mut functions = vec![trace_function("trace-func-0", vec![2, 6, 4])];
    let paths = generate_iat_files(&config, &mut functions).unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with("iat0.json"));

    let replay = ExperimentConfig {
        iat_from_file: true,
        ..config.clone()
    };
    let summary = Driver::new(
        replay,
        vec![trace_function("trace-func-0", vec![2, 6, 4])],
        Arc::new(AlwaysSucceeds::new()),
    )
    .run_experiment()
    .await
    .unwrap();

    assert_eq!(summary.records_written, 12);
    assert_eq!(records_of(&config).len(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_short_trace_rejected_before_scheduling() {
    let temp_dir = TempDir::new().unwrap();
    let config = experiment(&temp_dir, 5);

    let result = Driver::new(
        config.clone(),
        vec![trace_function("trace-func-0", vec![1, 1])],
        Arc::new(AlwaysSucceeds::new()),
    )
    .run_experiment()
    .await;

    assert!(matches!(result, Err(LoadError::Validation(_))));
    assert!(!config.output_file().exists());
}

#[tokio::test(start_paused = true)]
async fn test_endpoint_template_deployment() {
    let temp_dir = TempDir::new().unwrap();
    let config = ExperimentConfig {
        endpoint_template: Some("{name}.default.example:80".to_string()),
        ..experiment(&temp_dir, 1)
    };
    let function = Function::new(
        FunctionName::new("trace-func-0").unwrap(),
        FunctionInvocationStats::new(vec![1]),
        FunctionRuntimeStats::default(),
        FunctionMemoryStats::default(),
    );

    let summary = Driver::new(config, vec![function], Arc::new(AlwaysSucceeds::new()))
        .run_experiment()
        .await
        .unwrap();
    assert_eq!(summary.successes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_endpoint_fails_deployment() {
    let temp_dir = TempDir::new().unwrap();
    let function = Function::new(
        FunctionName::new("trace-func-0").unwrap(),
        FunctionInvocationStats::new(vec![1]),
        FunctionRuntimeStats::default(),
        FunctionMemoryStats::default(),
    );

    let result = Driver::new(
        experiment(&temp_dir, 1),
        vec![function],
        Arc::new(AlwaysSucceeds::new()),
    )
    .run_experiment()
    .await;
    assert!(matches!(result, Err(LoadError::Deployment { .. })));
}
