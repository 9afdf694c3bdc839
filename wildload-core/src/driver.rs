// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Trace driver.
//!
//! Replays every function's schedule slot by slot against wall-clock time:
//! invocations are spawned at their arrival offsets, each slot waits for its
//! in-flight work (bounded by the force timeout) and lasts at least one slot
//! duration. Phases run Warmup -> Execution -> Done.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::client::InvocationClient;
use crate::collector::{MetricsCollector, DEFAULT_CHANNEL_CAPACITY};
use crate::config::{ExperimentConfig, TraceGranularity};
use crate::deployment::{deploy_functions, Deployer, StaticDeployer};
use crate::dispatcher::{invoke_function, InvocationMetadata};
use crate::error::{LoadError, LoadResult, ValidationError};
use crate::function::{Function, FunctionSpecification};
use crate::generator::{read_specification, specification_path, SpecificationGenerator};
use crate::record::{ExecutionRecord, ExperimentPhase};

/// Failure rate above which a slot counts as overloaded.
pub const OVERLOAD_THRESHOLD: f64 = 0.3;

/// Share of requested invocations that must be issued for a slot to count.
pub const REQUEST_TARGET_RATIO: f64 = 0.8;

const ONE_MINUTE: Duration = Duration::from_secs(60);

/// Whether at least one minute has passed since `start`.
pub fn has_minute_expired(start: Instant) -> bool {
    start.elapsed() >= ONE_MINUTE
}

/// Whether the slot that began at `start` is over.
pub fn has_slot_expired(start: Instant, granularity: TraceGranularity) -> bool {
    start.elapsed() >= granularity.slot_duration()
}

pub fn is_request_target_achieved(requested: u64, issued: u64) -> bool {
    issued as f64 >= REQUEST_TARGET_RATIO * requested as f64
}

pub fn check_overload(successes: u64, failures: u64) -> bool {
    let total = successes + failures;
    total > 0 && failures as f64 / total as f64 > OVERLOAD_THRESHOLD
}

/// Trace slots to replay, in order, with the phase each belongs to.
///
/// With warmup, slot 0 is only used for profiling and is not replayed.
pub fn slot_plan(experiment_duration: u64, warmup_duration: u64) -> Vec<(usize, ExperimentPhase)> {
    let warmup = warmup_duration as usize;
    let execution = experiment_duration as usize;

    if warmup == 0 {
        return (0..execution)
            .map(|slot| (slot, ExperimentPhase::Execution))
            .collect();
    }

    (1..=warmup)
        .map(|slot| (slot, ExperimentPhase::Warmup))
        .chain((warmup + 1..warmup + 1 + execution).map(|slot| (slot, ExperimentPhase::Execution)))
        .collect()
}

/// Outcome of a finished experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub issued: u64,
    pub successes: u64,
    pub failures: u64,
    pub records_written: u64,
    pub overloaded: bool,
}

/// Counts of one function's scheduling loop.
#[derive(Debug, Clone, Copy, Default)]
struct FunctionTally {
    issued: u64,
    successes: u64,
    failures: u64,
}

/// Latched overload indicator; the first trip writes the flag file.
#[derive(Debug)]
struct OverloadLatch {
    tripped: AtomicBool,
    flag_file: PathBuf,
}

impl OverloadLatch {
    fn new(flag_file: PathBuf) -> Self {
        Self {
            tripped: AtomicBool::new(false),
            flag_file,
        }
    }

    fn trip(&self) {
        if self.tripped.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(path = %self.flag_file.display(), "Platform overloaded, writing overload flag");
        if let Err(e) = std::fs::write(&self.flag_file, b"") {
            tracing::error!(path = %self.flag_file.display(), error = %e, "Failed to write overload flag");
        }
    }

    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// State shared by every function's scheduling loop.
struct SchedulingContext {
    client: Arc<dyn InvocationClient>,
    limiter: Arc<Semaphore>,
    record_output: mpsc::Sender<ExecutionRecord>,
    overload: OverloadLatch,
    granularity: TraceGranularity,
    force_timeout: Duration,
    plan: Vec<(usize, ExperimentPhase)>,
}

pub struct Driver {
    config: ExperimentConfig,
    functions: Vec<Function>,
    client: Arc<dyn InvocationClient>,
    deployer: Arc<dyn Deployer>,
}

impl Driver {
    /// Driver deploying through a [`StaticDeployer`] built from `config`.
    pub fn new(
        config: ExperimentConfig,
        functions: Vec<Function>,
        client: Arc<dyn InvocationClient>,
    ) -> Self {
        let deployer = Arc::new(StaticDeployer::new(config.endpoint_template.clone()));
        Self {
            config,
            functions,
            client,
            deployer,
        }
    }

    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = deployer;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run the experiment to completion.
    pub async fn run_experiment(mut self) -> LoadResult<ExperimentSummary> {
        self.validate()?;

        let with_warmup = self.config.with_warmup();
        deploy_functions(
            Arc::clone(&self.deployer),
            &mut self.functions,
            with_warmup,
            self.config.granularity,
        )
        .await?;

        self.prepare_specifications()?;

        let (collector, record_output) =
            MetricsCollector::start(self.config.output_file(), DEFAULT_CHANNEL_CAPACITY).await?;

        let plan = slot_plan(self.config.experiment_duration, self.config.warmup_duration);
        tracing::info!(
            functions = self.functions.len(),
            warmup_slots = self.config.warmup_duration,
            execution_slots = self.config.experiment_duration,
            granularity = %self.config.granularity,
            max_concurrency = self.config.max_concurrency,
            "Starting experiment"
        );

        let ctx = Arc::new(SchedulingContext {
            client: Arc::clone(&self.client),
            limiter: Arc::new(Semaphore::new(self.config.max_concurrency)),
            record_output,
            overload: OverloadLatch::new(self.config.overload_flag_file()),
            granularity: self.config.granularity,
            force_timeout: self.config.force_timeout,
            plan,
        });

        let mut loops = Vec::with_capacity(self.functions.len());
        for function in self.functions.drain(..) {
            let function = Arc::new(function);
            let name = function.name.clone();
            loops.push((name, tokio::spawn(run_function(Arc::clone(&ctx), function))));
        }

        let mut summary = ExperimentSummary::default();
        for (name, handle) in loops {
            let tally = handle.await.map_err(|e| LoadError::Scheduling {
                function: name,
                reason: e.to_string(),
            })?;
            summary.issued += tally.issued;
            summary.successes += tally.successes;
            summary.failures += tally.failures;
        }

        summary.overloaded = ctx.overload.is_tripped();

        // Last sender goes with the context; stragglers still hold clones.
        drop(ctx);
        summary.records_written = collector.finish().await?;

        tracing::info!(
            issued = summary.issued,
            successes = summary.successes,
            failures = summary.failures,
            records = summary.records_written,
            overloaded = summary.overloaded,
            "Experiment finished"
        );

        Ok(summary)
    }

    /// Checks that hold regardless of how the functions were loaded.
    fn validate(&self) -> LoadResult<()> {
        if self.config.experiment_duration < 1 {
            return Err(ValidationError::InvalidExperimentDuration {
                duration: self.config.experiment_duration,
            }
            .into());
        }

        if self.config.max_concurrency == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_concurrency",
                value: "0".to_string(),
                reason: "At least one invocation must be allowed in flight".to_string(),
            }
            .into());
        }

        if self.functions.is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "functions",
                context: "experiment".to_string(),
            }
            .into());
        }

        let required = self.config.trace_duration() as usize;
        let mut seen = HashSet::new();
        for function in &self.functions {
            if !seen.insert(&function.name) {
                return Err(ValidationError::DuplicateFunction {
                    name: function.name.to_string(),
                }
                .into());
            }
            if function.invocation_stats.len() < required {
                return Err(ValidationError::TraceTooShort {
                    function: function.name.to_string(),
                    available: function.invocation_stats.len(),
                    required,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Generate every function's schedule, or load it from IAT files.
    fn prepare_specifications(&mut self) -> LoadResult<()> {
        let required = self.config.trace_duration() as usize;

        if self.config.iat_from_file {
            for (index, function) in self.functions.iter_mut().enumerate() {
                let spec = read_specification(&self.config.output_dir, index)?;
                if spec.slots() < required {
                    return Err(LoadError::Specification {
                        path: specification_path(&self.config.output_dir, index),
                        message: format!("{} slots, {} required", spec.slots(), required),
                    });
                }
                tracing::debug!(function = %function.name, slots = spec.slots(), "Loaded specification");
                function.specification = Some(spec);
            }
            return Ok(());
        }

        let mut generator = SpecificationGenerator::new(self.config.seed, self.config.bounds);
        for function in self.functions.iter_mut() {
            function.specification = Some(generator.generate_invocation_data(
                function,
                self.config.distribution,
                self.config.shift,
                self.config.granularity,
            ));
        }

        Ok(())
    }
}

/// Replay one function's schedule across every planned slot.
async fn run_function(ctx: Arc<SchedulingContext>, function: Arc<Function>) -> FunctionTally {
    let mut tally = FunctionTally::default();
    let empty = FunctionSpecification::default();
    let spec = function.specification.as_ref().unwrap_or(&empty);
    let mut previous_phase = None;

    for &(minute_index, phase) in &ctx.plan {
        if previous_phase == Some(ExperimentPhase::Warmup) && phase == ExperimentPhase::Execution {
            tracing::info!(function = %function.name, "Warmup phase finished, starting execution");
        }
        previous_phase = Some(phase);

        let slot = run_slot(&ctx, &function, spec, minute_index, phase).await;
        tally.issued += slot.issued;
        tally.successes += slot.successes;
        tally.failures += slot.failures;
    }

    tracing::debug!(
        function = %function.name,
        issued = tally.issued,
        "Trace replay finished"
    );

    tally
}

async fn run_slot(
    ctx: &SchedulingContext,
    function: &Arc<Function>,
    spec: &FunctionSpecification,
    minute_index: usize,
    phase: ExperimentPhase,
) -> FunctionTally {
    let slot_start = Instant::now();
    let requested = function.invocation_stats.at(minute_index);
    let (iats, runtime_specs) = spec.slot(minute_index);

    let success_count = Arc::new(AtomicU64::new(0));
    let failure_count = Arc::new(AtomicU64::new(0));
    let mut in_flight = JoinSet::new();
    let mut issued = 0u64;
    let mut offset_micros = 0.0f64;

    for (invocation_index, (iat, runtime_specification)) in
        iats.iter().zip(runtime_specs).enumerate()
    {
        offset_micros += iat.max(0.0);
        tokio::time::sleep_until(slot_start + Duration::from_secs_f64(offset_micros / 1e6)).await;

        let metadata = InvocationMetadata {
            function: Arc::clone(function),
            runtime_specification: *runtime_specification,
            phase,
            minute_index,
            invocation_index,
            success_count: Arc::clone(&success_count),
            failure_count: Arc::clone(&failure_count),
            record_output: ctx.record_output.clone(),
        };
        in_flight.spawn(invoke_function(
            Arc::clone(&ctx.client),
            metadata,
            Arc::clone(&ctx.limiter),
        ));
        issued += 1;
    }

    let drained = tokio::time::timeout(ctx.force_timeout, async {
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(function = %function.name, error = %e, "Invocation task failed");
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            function = %function.name,
            minute = minute_index,
            stragglers = in_flight.len(),
            "Slot did not finish within the force timeout, detaching stragglers"
        );
        in_flight.detach_all();
    }

    if !has_slot_expired(slot_start, ctx.granularity) {
        tokio::time::sleep_until(slot_start + ctx.granularity.slot_duration()).await;
    }

    let successes = success_count.load(Ordering::Relaxed);
    let failures = failure_count.load(Ordering::Relaxed);

    if is_request_target_achieved(requested, issued) {
        tracing::info!(
            function = %function.name,
            minute = minute_index,
            %phase,
            issued,
            requested,
            successes,
            failures,
            "Slot finished"
        );
    } else {
        tracing::warn!(
            function = %function.name,
            minute = minute_index,
            %phase,
            issued,
            requested,
            "Request target not achieved"
        );
    }

    if check_overload(successes, failures) {
        ctx.overload.trip();
    }

    FunctionTally {
        issued,
        successes,
        failures,
    }
}
