// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Invocation client boundary.
//!
//! The scheduler never talks to the network directly. Anything that can carry
//! a request to a deployed function and hand back the raw reply implements
//! [`InvocationClient`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InvokeError;
use crate::function::RuntimeSpecification;
use crate::types::{Endpoint, FunctionName};

/// Reply body prefix a function emits when it could not allocate its memory.
pub const MEMORY_ALLOCATION_FAILURE: &str = "FAILURE - mem_alloc";

/// One invocation attempt as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub function_name: FunctionName,
    pub endpoint: Endpoint,
    pub runtime_specification: RuntimeSpecification,
}

/// Raw reply, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReply {
    pub status: u16,
    pub body: String,
    /// Time from issuing the request until the reply headers arrived.
    pub connection_establish_time: Duration,
}

impl InvocationReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            connection_establish_time: Duration::ZERO,
        }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_memory_allocation_failure(&self) -> bool {
        self.body.starts_with(MEMORY_ALLOCATION_FAILURE)
    }

    /// Check status and body, then decode the function's JSON reply.
    pub fn into_function_response(self) -> Result<FunctionResponse, InvokeError> {
        if !self.is_success_status() {
            return Err(InvokeError::BadStatus {
                status: self.status,
                body: self.body,
            });
        }
        if self.body.is_empty() {
            return Err(InvokeError::EmptyBody {
                status: self.status,
            });
        }
        serde_json::from_str(&self.body).map_err(|e| InvokeError::MalformedReply {
            reason: e.to_string(),
        })
    }
}

/// JSON reply of a trace function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionResponse {
    pub status: String,
    pub function: String,
    pub machine_name: String,
    /// Microseconds spent executing the function body.
    pub execution_time: u64,
}

#[async_trait]
pub trait InvocationClient: Send + Sync {
    /// Carry one request to the function.
    ///
    /// `Err` only for failures below the function: construction and transport.
    /// Any reply that made it back, whatever its status, is `Ok`.
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationReply, InvokeError>;
}
