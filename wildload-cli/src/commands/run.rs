// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wildload run` command - Replay the trace against deployed functions.

use std::sync::Arc;

use wildload_core::{ConfigLoader, Driver, InvocationClient};

use crate::http_client::HttpInvoker;
use crate::metrics::{start_metrics_server, InstrumentedClient};

pub async fn execute(
    config_path: &str,
    generated: bool,
    metrics_port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, generated, "Starting experiment");

    // Load and validate configuration - fail fast on invalid config
    let mut config = ConfigLoader::load_file(config_path)?;
    config.experiment.iat_from_file = generated;

    let invoker = HttpInvoker::new(&config.experiment.platform, config.experiment.request_timeout)?;
    let client: Arc<dyn InvocationClient> = match metrics_port {
        Some(port) => {
            start_metrics_server(port);
            Arc::new(InstrumentedClient::new(invoker))
        }
        None => Arc::new(invoker),
    };

    let record_file = config.experiment.output_file();
    let summary = Driver::new(config.experiment, config.functions, client)
        .run_experiment()
        .await?;

    println!();
    println!("Experiment finished");
    println!("  Issued:      {}", summary.issued);
    println!("  Successful:  {}", summary.successes);
    println!("  Failed:      {}", summary.failures);
    println!("  Records:     {} → {}", summary.records_written, record_file.display());
    if summary.overloaded {
        println!("  ⚠ Platform overload detected (failure rate above 30% in at least one slot)");
    }

    Ok(())
}
