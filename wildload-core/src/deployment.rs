// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Deployment boundary and static trace profiling.
//!
//! Deploying functions on a real platform is out of scope for the scheduler.
//! The [`Deployer`] trait is the seam; [`StaticDeployer`] resolves endpoints
//! from configuration so experiments can target functions deployed by other
//! tooling.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TraceGranularity;
use crate::error::{LoadError, LoadResult};
use crate::function::Function;
use crate::types::Endpoint;

/// Placeholder replaced by the function name in endpoint templates.
pub const NAME_PLACEHOLDER: &str = "{name}";

#[async_trait]
pub trait Deployer: Send + Sync {
    /// Make `function` reachable and return its endpoint.
    ///
    /// `function.initial_scale` is already set when profiling ran.
    async fn deploy(&self, function: &Function) -> LoadResult<Endpoint>;

    /// Tear down whatever [`deploy`](Self::deploy) created.
    async fn clean(&self) -> LoadResult<()> {
        Ok(())
    }
}

/// Assigns endpoints from configuration.
///
/// A function's own endpoint wins; otherwise `{name}` in the template is
/// replaced by the function name.
#[derive(Debug, Clone, Default)]
pub struct StaticDeployer {
    template: Option<String>,
}

impl StaticDeployer {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }
}

#[async_trait]
impl Deployer for StaticDeployer {
    async fn deploy(&self, function: &Function) -> LoadResult<Endpoint> {
        if let Some(endpoint) = &function.endpoint {
            return Ok(endpoint.clone());
        }

        let template = self.template.as_ref().ok_or_else(|| LoadError::Deployment {
            function: function.name.clone(),
            reason: "no endpoint configured and no endpoint template set".to_string(),
        })?;

        Endpoint::new(template.replace(NAME_PLACEHOLDER, function.name.as_str())).map_err(|e| {
            LoadError::Deployment {
                function: function.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Instances needed to absorb the profiling slot.
///
/// `ceil(invocations[0] * average_runtime / slot_duration)`: the mean
/// concurrency of the first slot of the trace.
pub fn profile_initial_scale(function: &Function, granularity: TraceGranularity) -> u64 {
    let slot_ms = granularity.slot_duration().as_millis() as f64;
    let busy_ms = function.invocation_stats.at(0) as f64 * function.runtime_stats.average as f64;
    (busy_ms / slot_ms).ceil() as u64
}

/// Profile and deploy every function concurrently, one task per function.
///
/// Profiling only runs when the experiment has a warmup phase; otherwise the
/// initial scale stays zero.
pub async fn deploy_functions(
    deployer: Arc<dyn Deployer>,
    functions: &mut [Function],
    with_warmup: bool,
    granularity: TraceGranularity,
) -> LoadResult<()> {
    let mut handles = Vec::with_capacity(functions.len());

    for function in functions.iter_mut() {
        if with_warmup {
            function.initial_scale = profile_initial_scale(function, granularity);
            tracing::debug!(
                function = %function.name,
                initial_scale = function.initial_scale,
                "Profiled initial scale"
            );
        }

        let deployer = Arc::clone(&deployer);
        let snapshot = function.clone();
        handles.push(tokio::spawn(async move { deployer.deploy(&snapshot).await }));
    }

    for (function, handle) in functions.iter_mut().zip(handles) {
        let endpoint = handle.await.map_err(|e| LoadError::Deployment {
            function: function.name.clone(),
            reason: e.to_string(),
        })??;

        tracing::info!(function = %function.name, endpoint = %endpoint, "Deployed function");
        function.endpoint = Some(endpoint);
    }

    Ok(())
}
