// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Live Prometheus metrics for a running experiment.

use std::time::Instant;

use async_trait::async_trait;
use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};
use tokio::net::TcpListener;

use wildload_core::{InvocationClient, InvocationReply, InvocationRequest, InvokeError};

lazy_static! {
    pub static ref INVOCATIONS: IntCounterVec = register_int_counter_vec!(
        "wildload_invocations_total",
        "Total number of invocations issued, by outcome",
        &["function", "outcome"]
    )
    .unwrap();
    pub static ref RESPONSE_TIME: HistogramVec = register_histogram_vec!(
        "wildload_response_time_seconds",
        "End-to-end latency of an invocation as seen by the client",
        &["function"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();
    pub static ref INFLIGHT: IntGauge = register_int_gauge!(
        "wildload_inflight_invocations",
        "Invocations currently waiting for a reply"
    )
    .unwrap();
}

/// Wraps an invocation client and records every call.
pub struct InstrumentedClient<C> {
    inner: C,
}

impl<C> InstrumentedClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

fn outcome(result: &Result<InvocationReply, InvokeError>) -> &'static str {
    match result {
        Ok(reply) if reply.is_memory_allocation_failure() => "mem_alloc",
        Ok(reply) if reply.is_success_status() => "ok",
        Ok(_) => "bad_status",
        Err(e) if e.is_connection_failure() => "connection_error",
        Err(_) => "body_error",
    }
}

#[async_trait]
impl<C: InvocationClient> InvocationClient for InstrumentedClient<C> {
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationReply, InvokeError> {
        let function = request.function_name.to_string();

        INFLIGHT.inc();
        let start = Instant::now();

        let result = self.inner.invoke(request).await;

        RESPONSE_TIME
            .with_label_values(&[function.as_str()])
            .observe(start.elapsed().as_secs_f64());
        INFLIGHT.dec();
        INVOCATIONS
            .with_label_values(&[function.as_str(), outcome(&result)])
            .inc();

        result
    }
}

/// Start the metrics server in a background task.
pub fn start_metrics_server(port: u16) {
    // Force initialization of metrics
    lazy_static::initialize(&INVOCATIONS);
    lazy_static::initialize(&RESPONSE_TIME);
    lazy_static::initialize(&INFLIGHT);

    tokio::spawn(async move {
        let addr = format!("0.0.0.0:{}", port);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                tracing::info!("Metrics server starting on {}", addr);
                if let Err(e) = axum::serve(listener, metrics_router()).await {
                    tracing::error!("Metrics server failed: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("Failed to bind metrics server: {}", e);
            }
        }
    });
}

fn metrics_router() -> Router {
    Router::new().route("/metrics", get(|| async { metrics_handler() }))
}

fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("Encoding error"))
}
