// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Invocation dispatcher.
//!
//! Executes one invocation attempt against the [`InvocationClient`], classifies
//! the outcome and emits exactly one [`ExecutionRecord`] to the collector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;

use crate::client::{InvocationClient, InvocationRequest};
use crate::error::InvokeError;
use crate::function::{Function, RuntimeSpecification};
use crate::record::{compose_invocation_id, ExecutionRecord, ExperimentPhase};

/// Everything a dispatcher task needs to issue and report one invocation.
#[derive(Debug, Clone)]
pub struct InvocationMetadata {
    pub function: Arc<Function>,
    pub runtime_specification: RuntimeSpecification,
    pub phase: ExperimentPhase,
    pub minute_index: usize,
    pub invocation_index: usize,
    pub success_count: Arc<AtomicU64>,
    pub failure_count: Arc<AtomicU64>,
    pub record_output: mpsc::Sender<ExecutionRecord>,
}

impl InvocationMetadata {
    pub fn invocation_id(&self) -> String {
        compose_invocation_id(self.minute_index, self.invocation_index)
    }
}

/// Issue one invocation and report it.
///
/// Holds a permit of `limiter` for the duration of the network call. Returns
/// whether the invocation succeeded; the outcome is also counted in the
/// metadata's counters and persisted through its record channel.
pub async fn invoke_function(
    client: Arc<dyn InvocationClient>,
    metadata: InvocationMetadata,
    limiter: Arc<Semaphore>,
) -> bool {
    let function = &metadata.function;
    let spec = metadata.runtime_specification;

    let mut record = ExecutionRecord::new(
        metadata.phase,
        function.name.as_str(),
        metadata.invocation_id(),
        0,
        spec.runtime,
    );

    let _permit = match limiter.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::error!(function = %function.name, "Concurrency limiter closed");
            record.start_time = wall_clock_micros();
            record.connection_timeout = true;
            return report(record, &metadata).await;
        }
    };

    tracing::trace!(
        function = %function.name,
        runtime_ms = spec.runtime,
        memory_mib = spec.memory,
        "Invoking"
    );

    record.start_time = wall_clock_micros();
    let start = Instant::now();

    let request = match &function.endpoint {
        Some(endpoint) => Ok(InvocationRequest {
            function_name: function.name.clone(),
            endpoint: endpoint.clone(),
            runtime_specification: spec,
        }),
        None => Err(InvokeError::RequestConstruction {
            reason: "function has no endpoint".to_string(),
        }),
    };

    let reply = match request {
        Ok(request) => client.invoke(request).await,
        Err(e) => Err(e),
    };

    match reply {
        Err(e) => {
            tracing::error!(function = %function.name, error = %e, "Failed to invoke function");
            record.response_time = elapsed_micros(start);
            if e.is_connection_failure() {
                record.connection_timeout = true;
            } else {
                record.function_timeout = true;
            }
        }
        Ok(reply) => {
            record.connection_establish_time =
                reply.connection_establish_time.as_micros() as u64;
            if reply.is_memory_allocation_failure() {
                record.memory_allocation_timeout = true;
            }

            match reply.into_function_response() {
                Ok(response) => {
                    record.instance = response.function;
                    record.actual_duration = response.execution_time;
                }
                Err(e) => {
                    tracing::error!(
                        function = %function.name,
                        endpoint = ?function.endpoint,
                        error = %e,
                        "Invocation failed"
                    );
                    record.function_timeout = true;
                }
            }
            record.response_time = elapsed_micros(start);
        }
    }

    tracing::trace!(
        function = %function.name,
        invocation_id = %record.invocation_id,
        latency_ms = record.response_time as f64 / 1e3,
        "Replied"
    );

    report(record, &metadata).await
}

async fn report(record: ExecutionRecord, metadata: &InvocationMetadata) -> bool {
    let success = record.is_success();
    if success {
        metadata.success_count.fetch_add(1, Ordering::Relaxed);
    } else {
        metadata.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    if let Err(e) = metadata.record_output.send(record).await {
        tracing::error!(
            function = %metadata.function.name,
            invocation_id = %e.0.invocation_id,
            "Record channel closed, dropping record"
        );
    }

    success
}

fn wall_clock_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

fn elapsed_micros(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}
