// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `wildload generate` command - Write IAT files without invoking anything.

use wildload_core::generator::generate_iat_files;
use wildload_core::ConfigLoader;

pub async fn execute(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(config = %config_path, "Generating specifications");

    let mut config = ConfigLoader::load_file(config_path)?;
    let paths = generate_iat_files(&config.experiment, &mut config.functions)?;

    println!("✓ Generated {} specification file(s)", paths.len());
    for (function, path) in config.functions.iter().zip(&paths) {
        let invocations = function
            .specification
            .as_ref()
            .map(|s| s.total_invocations())
            .unwrap_or(0);
        println!(
            "  - {} → {} ({} invocations)",
            function.name,
            path.display(),
            invocations
        );
    }

    Ok(())
}
