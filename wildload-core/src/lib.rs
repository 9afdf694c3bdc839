//! Wildload Core Library
//!
//! Trace-replay load generation for serverless platforms.
//! Provides the specification generator, the slot-by-slot trace driver,
//! the invocation dispatcher and the record collector.

pub mod client;
pub mod collector;
pub mod config;
pub mod deployment;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod function;
pub mod generator;
pub mod random;
pub mod record;
pub mod types;

// Re-export commonly used types
pub use client::{FunctionResponse, InvocationClient, InvocationReply, InvocationRequest};
pub use collector::{read_records, MetricsCollector};
pub use config::{
    Config, ConfigLoader, ExperimentConfig, IatDistribution, SpecBounds, TraceGranularity,
};
pub use deployment::{Deployer, StaticDeployer};
pub use dispatcher::{invoke_function, InvocationMetadata};
pub use driver::{Driver, ExperimentSummary};
pub use error::{InvokeError, LoadError, LoadResult, ValidationError};
pub use function::{
    Function, FunctionInvocationStats, FunctionMemoryStats, FunctionRuntimeStats,
    FunctionSpecification, RuntimeSpecification,
};
pub use generator::SpecificationGenerator;
pub use record::{ExecutionRecord, ExperimentPhase};
pub use types::{Endpoint, FunctionName};
