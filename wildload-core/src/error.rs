// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for wildload.
//!
//! Explicit enum error types only. No `Box<dyn Error>` and no `anyhow::Result`
//! in the library; every failure the scheduler can surface has a variant.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::FunctionName;

/// Top-level error type for an experiment.
/// Anything returned as `LoadError` aborts the run.
#[derive(Debug, Error)]
pub enum LoadError {
    // =========================================================================
    // Configuration Errors - Fail-Fast Before Scheduling
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Experiment file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Experiment file parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Specification Files (IAT-only mode)
    // =========================================================================
    #[error("Invalid specification file {path}: {message}")]
    Specification { path: PathBuf, message: String },

    // =========================================================================
    // Deployment Collaborator
    // =========================================================================
    #[error("Deployment of {function} failed: {reason}")]
    Deployment {
        function: FunctionName,
        reason: String,
    },

    // =========================================================================
    // Persistence Errors - No Output Means No Experiment
    // =========================================================================
    #[error("Persistence error: {context} - {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Record sink error: {0}")]
    RecordSink(#[from] csv::Error),

    #[error("Metrics collector failed: {reason}")]
    Collector { reason: String },

    // =========================================================================
    // Scheduler
    // =========================================================================
    #[error("Scheduling loop of {function} failed: {reason}")]
    Scheduling {
        function: FunctionName,
        reason: String,
    },
}

/// Validation errors abort the experiment before any invocation is issued.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unsupported IAT distribution: {value}")]
    UnsupportedDistribution { value: String },

    #[error("Unsupported trace granularity: {value}")]
    UnsupportedGranularity { value: String },

    #[error("Experiment duration must be at least one slot, got {duration}")]
    InvalidExperimentDuration { duration: u64 },

    #[error("Duplicate function name: {name}")]
    DuplicateFunction { name: String },

    #[error("Trace of {function} covers {available} slots, {required} required")]
    TraceTooShort {
        function: String,
        available: usize,
        required: usize,
    },
}

/// Failures at the invocation client boundary.
///
/// These never abort an experiment: the dispatcher turns each one into a
/// classified [`ExecutionRecord`](crate::record::ExecutionRecord).
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Failed to build request: {reason}")]
    RequestConstruction { reason: String },

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Function replied with status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Function replied with an empty body (status {status})")]
    EmptyBody { status: u16 },

    #[error("Failed to read reply body: {reason}")]
    Body { reason: String },

    #[error("Malformed reply: {reason}")]
    MalformedReply { reason: String },
}

impl InvokeError {
    /// True when the request never reached the function.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::RequestConstruction { .. } | Self::Connection { .. }
        )
    }
}

/// Result type alias using LoadError.
pub type LoadResult<T> = Result<T, LoadError>;
