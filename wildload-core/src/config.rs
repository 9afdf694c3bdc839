// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML experiment configuration with strict schema validation.
//!
//! Validates the experiment and its functions before anything is scheduled.
//! Any invalid field results in a ValidationError that prevents the run.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult, ValidationError};
use crate::function::{
    Function, FunctionInvocationStats, FunctionMemoryStats, FunctionRuntimeStats,
};
use crate::types::{Endpoint, FunctionName};

/// Maximum time the driver waits for a slot's outstanding invocations.
/// Matches the longest function timeout offered by the popular clouds.
pub const FORCE_TIMEOUT_MINUTES: u64 = 15;

/// Inter-arrival sampling law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IatDistribution {
    Exponential,
    Uniform,
    Equidistant,
}

impl IatDistribution {
    /// Parse a configuration selector into a distribution and its shift flag.
    pub fn parse(value: &str) -> Result<(Self, bool), ValidationError> {
        match value {
            "exponential" => Ok((Self::Exponential, false)),
            "exponential_shift" => Ok((Self::Exponential, true)),
            "uniform" => Ok((Self::Uniform, false)),
            "uniform_shift" => Ok((Self::Uniform, true)),
            "equidistant" => Ok((Self::Equidistant, false)),
            other => Err(ValidationError::UnsupportedDistribution {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for IatDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exponential => write!(f, "exponential"),
            Self::Uniform => write!(f, "uniform"),
            Self::Equidistant => write!(f, "equidistant"),
        }
    }
}

/// Time resolution of the invocation trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceGranularity {
    Minute,
    Second,
}

impl TraceGranularity {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "minute" => Ok(Self::Minute),
            "second" => Ok(Self::Second),
            other => Err(ValidationError::UnsupportedGranularity {
                value: other.to_string(),
            }),
        }
    }

    /// Wall-clock length of one trace slot.
    pub const fn slot_duration(&self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Second => Duration::from_secs(1),
        }
    }
}

impl fmt::Display for TraceGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Second => write!(f, "second"),
        }
    }
}

/// Clamp bounds applied to every generated specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecBounds {
    pub min_runtime_ms: u64,
    pub max_runtime_ms: u64,
    pub min_memory_mib: u64,
    pub max_memory_mib: u64,
}

impl Default for SpecBounds {
    fn default() -> Self {
        Self {
            // 1ms is the minimum billing unit of AWS Lambda
            min_runtime_ms: 1,
            max_runtime_ms: 60_000,
            min_memory_mib: 1,
            max_memory_mib: 10_240,
        }
    }
}

/// Raw experiment section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawExperimentConfig {
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default = "default_distribution")]
    iat_distribution: String,
    #[serde(default = "default_granularity")]
    granularity: String,
    experiment_duration: u64,
    #[serde(default)]
    warmup_duration: u64,
    #[serde(default = "default_output_dir")]
    output_dir: String,
    #[serde(default = "default_output_prefix")]
    output_prefix: String,
    #[serde(default)]
    max_concurrency: usize,
    #[serde(default = "default_platform")]
    platform: String,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_force_timeout_minutes")]
    force_timeout_minutes: u64,
    #[serde(default)]
    endpoint_template: Option<String>,
    #[serde(default)]
    bounds: SpecBounds,
}

fn default_seed() -> u64 {
    42
}

fn default_distribution() -> String {
    "exponential".to_string()
}

fn default_granularity() -> String {
    "minute".to_string()
}

fn default_output_dir() -> String {
    "data/out".to_string()
}

fn default_output_prefix() -> String {
    "experiment".to_string()
}

fn default_platform() -> String {
    "knative".to_string()
}

fn default_request_timeout_ms() -> u64 {
    FORCE_TIMEOUT_MINUTES * 60 * 1000
}

fn default_force_timeout_minutes() -> u64 {
    FORCE_TIMEOUT_MINUTES
}

/// Raw function entry.
#[derive(Debug, Deserialize)]
struct RawFunctionConfig {
    name: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    invocations: Option<Vec<u64>>,
    #[serde(default)]
    rps: Option<f64>,
    runtime: FunctionRuntimeStats,
    memory: FunctionMemoryStats,
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    experiment: RawExperimentConfig,
    functions: Vec<RawFunctionConfig>,
}

/// Validated experiment settings.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub seed: u64,
    pub distribution: IatDistribution,
    pub shift: bool,
    pub granularity: TraceGranularity,
    /// Measured slots.
    pub experiment_duration: u64,
    /// Warmup slots; a non-zero value also adds one profiling slot.
    pub warmup_duration: u64,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    /// Concurrent in-flight invocations; always at least one.
    pub max_concurrency: usize,
    pub platform: String,
    pub request_timeout: Duration,
    pub force_timeout: Duration,
    pub endpoint_template: Option<String>,
    pub bounds: SpecBounds,
    /// Load specifications from IAT files instead of generating them.
    pub iat_from_file: bool,
}

impl ExperimentConfig {
    /// Number of trace slots the experiment consumes, profiling slot included.
    pub fn trace_duration(&self) -> u64 {
        determine_duration_to_parse(self.experiment_duration, self.warmup_duration)
    }

    pub fn with_warmup(&self) -> bool {
        self.warmup_duration > 0
    }

    /// Path of the record file for this experiment.
    pub fn output_file(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}_duration_{}.csv",
            self.output_prefix, self.experiment_duration
        ))
    }

    pub fn overload_flag_file(&self) -> PathBuf {
        self.output_dir.join("overload.flag")
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            distribution: IatDistribution::Exponential,
            shift: false,
            granularity: TraceGranularity::Minute,
            experiment_duration: 1,
            warmup_duration: 0,
            output_dir: PathBuf::from(default_output_dir()),
            output_prefix: default_output_prefix(),
            max_concurrency: num_cpus::get().max(1),
            platform: default_platform(),
            request_timeout: Duration::from_millis(default_request_timeout_ms()),
            force_timeout: Duration::from_secs(FORCE_TIMEOUT_MINUTES * 60),
            endpoint_template: None,
            bounds: SpecBounds::default(),
            iat_from_file: false,
        }
    }
}

/// Trace slots to read for an experiment: the measured slots, plus one
/// profiling slot and the warmup slots when warmup is enabled.
pub fn determine_duration_to_parse(experiment_duration: u64, warmup_duration: u64) -> u64 {
    let mut result = 0;

    if warmup_duration > 0 {
        result += 1; // profiling
        result += warmup_duration;
    }

    result + experiment_duration
}

/// Complete validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub experiment: ExperimentConfig,
    pub functions: Vec<Function>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> LoadResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LoadError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Persistence {
            context: "reading experiment file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> LoadResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| LoadError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> LoadResult<Config> {
        let experiment = Self::validate_experiment(raw.experiment)?;
        let trace_duration = experiment.trace_duration() as usize;

        let mut functions = Vec::with_capacity(raw.functions.len());
        let mut seen = HashSet::new();

        for (index, raw_func) in raw.functions.into_iter().enumerate() {
            let func = Self::validate_function(raw_func, index, &experiment, trace_duration)?;

            if !seen.insert(func.name.clone()) {
                return Err(ValidationError::DuplicateFunction {
                    name: func.name.to_string(),
                }
                .into());
            }

            functions.push(func);
        }

        if functions.is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "functions",
                context: "experiment file (at least one function must be defined)".to_string(),
            }
            .into());
        }

        Ok(Config {
            experiment,
            functions,
        })
    }

    fn validate_experiment(raw: RawExperimentConfig) -> LoadResult<ExperimentConfig> {
        let (distribution, shift) = IatDistribution::parse(&raw.iat_distribution)?;
        let granularity = TraceGranularity::parse(&raw.granularity)?;

        if raw.experiment_duration < 1 {
            return Err(ValidationError::InvalidExperimentDuration {
                duration: raw.experiment_duration,
            }
            .into());
        }

        let bounds = raw.bounds;
        if bounds.min_runtime_ms == 0 || bounds.min_runtime_ms > bounds.max_runtime_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "bounds.runtime",
                value: format!("{}..={}", bounds.min_runtime_ms, bounds.max_runtime_ms),
                reason: "Runtime bounds must satisfy 1 <= min <= max".to_string(),
            }
            .into());
        }
        if bounds.min_memory_mib == 0 || bounds.min_memory_mib > bounds.max_memory_mib {
            return Err(ValidationError::InvalidFieldValue {
                field: "bounds.memory",
                value: format!("{}..={}", bounds.min_memory_mib, bounds.max_memory_mib),
                reason: "Memory bounds must satisfy 1 <= min <= max".to_string(),
            }
            .into());
        }

        if raw.request_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "request_timeout_ms",
                value: "0".to_string(),
                reason: "Request timeout must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.force_timeout_minutes == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "force_timeout_minutes",
                value: "0".to_string(),
                reason: "Force timeout must be greater than 0".to_string(),
            }
            .into());
        }

        if raw.output_prefix.is_empty() {
            return Err(ValidationError::MissingRequiredField {
                field: "output_prefix",
                context: "experiment".to_string(),
            }
            .into());
        }

        let max_concurrency = if raw.max_concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            raw.max_concurrency
        };

        Ok(ExperimentConfig {
            seed: raw.seed,
            distribution,
            shift,
            granularity,
            experiment_duration: raw.experiment_duration,
            warmup_duration: raw.warmup_duration,
            output_dir: PathBuf::from(raw.output_dir),
            output_prefix: raw.output_prefix,
            max_concurrency,
            platform: raw.platform,
            request_timeout: Duration::from_millis(raw.request_timeout_ms),
            force_timeout: Duration::from_secs(raw.force_timeout_minutes * 60),
            endpoint_template: raw.endpoint_template,
            bounds,
            iat_from_file: false,
        })
    }

    fn validate_function(
        raw: RawFunctionConfig,
        index: usize,
        experiment: &ExperimentConfig,
        trace_duration: usize,
    ) -> LoadResult<Function> {
        let context = format!("function at index {}", index);

        let name = FunctionName::new(&raw.name)?;

        let mut invocation_stats = match (raw.invocations, raw.rps) {
            (Some(invocations), None) => FunctionInvocationStats::new(invocations),
            (None, Some(rps)) => {
                if !rps.is_finite() || rps <= 0.0 {
                    return Err(ValidationError::InvalidFieldValue {
                        field: "rps",
                        value: rps.to_string(),
                        reason: "RPS must be a positive number".to_string(),
                    }
                    .into());
                }
                FunctionInvocationStats::from_rps(rps, trace_duration, experiment.granularity)
            }
            (Some(_), Some(_)) => {
                return Err(ValidationError::InvalidFieldValue {
                    field: "invocations",
                    value: format!("invocations and rps in {}", context),
                    reason: "Specify either an invocation trace or an RPS target, not both"
                        .to_string(),
                }
                .into());
            }
            (None, None) => {
                return Err(ValidationError::MissingRequiredField {
                    field: "invocations",
                    context,
                }
                .into());
            }
        };

        if invocation_stats.len() < trace_duration {
            return Err(ValidationError::TraceTooShort {
                function: name.to_string(),
                available: invocation_stats.len(),
                required: trace_duration,
            }
            .into());
        }
        invocation_stats.truncate(trace_duration);

        let endpoint = raw.endpoint.map(Endpoint::new).transpose()?;

        let mut function = Function::new(name, invocation_stats, raw.runtime, raw.memory);
        function.endpoint = endpoint;
        Ok(function)
    }
}
