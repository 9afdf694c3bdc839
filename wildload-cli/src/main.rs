// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Wildload CLI
//!
//! Command-line interface for replaying serverless invocation traces.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod http_client;
mod metrics;

/// Wildload - Trace-replay load generator for serverless platforms
#[derive(Parser)]
#[command(name = "wildload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Experiment file path
    #[arg(short, long, default_value = "experiment.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the experiment
    Run {
        /// Replay specifications from previously generated IAT files
        #[arg(long)]
        generated: bool,

        /// Expose Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,
    },

    /// Generate IAT files only
    Generate,

    /// Validate the experiment file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            generated,
            metrics_port,
        } => commands::run::execute(&cli.config, generated, metrics_port).await,
        Commands::Generate => commands::generate::execute(&cli.config).await,
        Commands::Validate => commands::validate::execute(&cli.config).await,
    }
}
