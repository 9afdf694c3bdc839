// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! HTTP invocation client.
//!
//! Issues `GET http://<endpoint>` carrying the invocation's resource contract
//! in request headers. Trace functions read `requested_cpu` (runtime in ms)
//! and `requested_memory` (MiB) and reply with a JSON execution report.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HOST;
use reqwest::Client;

use wildload_core::{InvocationClient, InvocationReply, InvocationRequest, InvokeError};

pub struct HttpInvoker {
    client: Client,
    /// Knative routes by hostname already; other platforms need the function
    /// name in the `Host` header.
    set_host_header: bool,
}

impl HttpInvoker {
    pub fn new(platform: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            set_host_header: !platform.to_lowercase().contains("knative"),
        })
    }
}

#[async_trait]
impl InvocationClient for HttpInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationReply, InvokeError> {
        let name = request.function_name.as_str();
        let spec = request.runtime_specification;

        let mut builder = self
            .client
            .get(request.endpoint.url())
            .header("function", name)
            .header("requested_cpu", spec.runtime.to_string())
            .header("requested_memory", spec.memory.to_string());
        if self.set_host_header {
            builder = builder.header(HOST, name);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                InvokeError::RequestConstruction {
                    reason: e.to_string(),
                }
            } else {
                InvokeError::Connection {
                    reason: e.to_string(),
                }
            }
        })?;
        let connection_establish_time = start.elapsed();

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| InvokeError::Body {
            reason: e.to_string(),
        })?;

        Ok(InvocationReply {
            status,
            body,
            connection_establish_time,
        })
    }
}
