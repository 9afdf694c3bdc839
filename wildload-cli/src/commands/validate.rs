// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wildload validate` command - Validate an experiment file.

use wildload_core::ConfigLoader;

pub async fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating experiment");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let experiment = &config.experiment;
            println!("✓ Experiment is valid");
            println!();
            println!("Experiment Settings:");
            println!(
                "  IAT Distribution:   {}{}",
                experiment.distribution,
                if experiment.shift { " (shifted)" } else { "" }
            );
            println!("  Granularity:        {}", experiment.granularity);
            println!(
                "  Duration:           {} slots ({} warmup)",
                experiment.experiment_duration, experiment.warmup_duration
            );
            println!("  Trace Slots Used:   {}", experiment.trace_duration());
            println!("  Max Concurrency:    {}", experiment.max_concurrency);
            println!("  Record File:        {}", experiment.output_file().display());
            println!();
            println!("Functions ({}):", config.functions.len());
            for func in &config.functions {
                let traced: u64 = func.invocation_stats.as_slice().iter().sum();
                println!(
                    "  - {} (endpoint: {}, invocations: {}, avg runtime: {}ms, avg memory: {}MiB)",
                    func.name,
                    func.endpoint
                        .as_ref()
                        .map(|e| e.as_str())
                        .unwrap_or("<template>"),
                    traced,
                    func.runtime_stats.average,
                    func.memory_stats.average
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Experiment validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
