// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Specification generator.
//!
//! Turns a function's trace statistics into a concrete schedule: inter-arrival
//! delays for every slot and a (runtime, memory) pair for every invocation.
//! Generation is pure apart from the experiment-owned [`RandomSource`]; the same
//! seed reproduces the same schedule bit for bit.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::Exp1;

use crate::config::{ExperimentConfig, IatDistribution, SpecBounds, TraceGranularity};
use crate::error::{LoadError, LoadResult};
use crate::function::{Function, FunctionSpecification, RuntimeSpecification};
use crate::random::RandomSource;

pub const ONE_SECOND_IN_MICROSECONDS: f64 = 1_000_000.0;

/// Slack kept at the end of every slot so the last invocation is issued
/// before the slot boundary.
const SAFETY_MARGIN_MICROSECONDS: f64 = 1_000.0;

/// Microsecond is the finest granularity the driver schedules at.
const MIN_IAT_MICROSECONDS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct SpecificationGenerator {
    random: RandomSource,
    bounds: SpecBounds,
}

impl SpecificationGenerator {
    pub fn new(seed: u64, bounds: SpecBounds) -> Self {
        Self::with_random_source(RandomSource::new(seed), bounds)
    }

    pub fn with_random_source(random: RandomSource, bounds: SpecBounds) -> Self {
        Self { random, bounds }
    }

    pub fn bounds(&self) -> SpecBounds {
        self.bounds
    }

    /// Inter-arrival delays (µs) for `invocations` requests within one slot.
    ///
    /// Returns exactly `invocations` delays, each at least 1µs, summing to at
    /// most the slot length minus the safety margin.
    pub fn generate_interarrival_times(
        &mut self,
        invocations: u64,
        distribution: IatDistribution,
        shift: bool,
        granularity: TraceGranularity,
    ) -> Vec<f64> {
        if invocations == 0 {
            return Vec::new();
        }

        let slot_micro = granularity.slot_duration().as_secs_f64() * ONE_SECOND_IN_MICROSECONDS;
        let budget = slot_micro - SAFETY_MARGIN_MICROSECONDS;

        let mut delays = self.draw_delays(invocations, distribution, slot_micro);

        // Equally spaced schedules look identical under rotation.
        if shift && distribution == IatDistribution::Exponential {
            let split_fraction: f64 = self.random.iat().gen();
            rotate_schedule(&mut delays, split_fraction);
        }

        floor_and_normalize(&mut delays, budget);
        delays
    }

    /// Raw delays before flooring and normalisation.
    fn draw_delays(
        &mut self,
        invocations: u64,
        distribution: IatDistribution,
        slot_micro: f64,
    ) -> Vec<f64> {
        let n = invocations as usize;

        match distribution {
            IatDistribution::Equidistant | IatDistribution::Uniform => {
                vec![slot_micro / invocations as f64; n]
            }
            IatDistribution::Exponential => {
                let rate_per_second =
                    invocations as f64 / (slot_micro / ONE_SECOND_IN_MICROSECONDS);
                let rng = self.random.iat();
                (0..n)
                    .map(|_| {
                        let x: f64 = rng.sample(Exp1);
                        x / rate_per_second * ONE_SECOND_IN_MICROSECONDS
                    })
                    .collect()
            }
        }
    }

    /// Draw the (runtime, memory) pair for one invocation of `function`.
    pub fn generate_execution_spec(&mut self, function: &Function) -> RuntimeSpecification {
        if function.has_fixed_specification() {
            return RuntimeSpecification {
                runtime: function.runtime_stats.average,
                memory: function.memory_stats.average,
            };
        }

        let rng = self.random.spec();
        let mem_qtl: f64 = rng.gen();
        let run_qtl: f64 = rng.gen();

        let mem = &function.memory_stats;
        let memory = match mem_qtl {
            q if q <= 0.01 => mem.percentile1,
            q if q <= 0.05 => between(rng, mem.percentile1, mem.percentile5),
            q if q <= 0.25 => between(rng, mem.percentile5, mem.percentile25),
            q if q <= 0.50 => between(rng, mem.percentile25, mem.percentile50),
            q if q <= 0.75 => between(rng, mem.percentile50, mem.percentile75),
            q if q <= 0.95 => between(rng, mem.percentile75, mem.percentile95),
            q if q <= 0.99 => between(rng, mem.percentile95, mem.percentile99),
            _ => between(rng, mem.percentile99, mem.percentile100),
        };

        let run = &function.runtime_stats;
        let runtime = match run_qtl {
            q if q <= 0.01 => run.percentile0,
            q if q <= 0.25 => between(rng, run.percentile1, run.percentile25),
            q if q <= 0.50 => between(rng, run.percentile25, run.percentile50),
            q if q <= 0.75 => between(rng, run.percentile50, run.percentile75),
            q if q <= 0.95 => between(rng, run.percentile75, run.percentile99),
            q if q <= 0.99 => between(rng, run.percentile99, run.percentile100),
            // The recorded maximum can exceed the 100th percentile.
            _ => between(rng, run.percentile100, run.maximum),
        };

        RuntimeSpecification {
            runtime: runtime.clamp(self.bounds.min_runtime_ms, self.bounds.max_runtime_ms),
            memory: memory.clamp(self.bounds.min_memory_mib, self.bounds.max_memory_mib),
        }
    }

    /// Full schedule of `function`: delays and specs for every trace slot.
    pub fn generate_invocation_data(
        &mut self,
        function: &Function,
        distribution: IatDistribution,
        shift: bool,
        granularity: TraceGranularity,
    ) -> FunctionSpecification {
        let slots = function.invocation_stats.len();
        let mut iat = Vec::with_capacity(slots);
        let mut runtime_specification = Vec::with_capacity(slots);

        for slot in 0..slots {
            let invocations = function.invocation_stats.at(slot);
            iat.push(self.generate_interarrival_times(
                invocations,
                distribution,
                shift,
                granularity,
            ));
            runtime_specification.push(
                (0..invocations)
                    .map(|_| self.generate_execution_spec(function))
                    .collect(),
            );
        }

        self.shuffle_invocations_in_place(&mut runtime_specification);

        let spec = FunctionSpecification {
            iat,
            runtime_specification,
        };

        tracing::debug!(
            function = %function.name,
            slots,
            invocations = spec.total_invocations(),
            "Generated invocation data"
        );

        spec
    }

    /// Reorder every slot's specifications with the invocation stream.
    ///
    /// Decouples the order invocations are issued in from the order their
    /// specs were drawn. Mutates `slots` in place.
    pub fn shuffle_invocations_in_place(&mut self, slots: &mut [Vec<RuntimeSpecification>]) {
        let rng = self.random.invocation();
        for slot in slots.iter_mut() {
            slot.shuffle(&mut *rng);
        }
    }
}

/// Uniform draw in `[lo, lo + max(hi - lo, 1))`.
fn between<R: Rng + ?Sized>(rng: &mut R, lo: u64, hi: u64) -> u64 {
    let interval = hi.saturating_sub(lo).max(1);
    lo + rng.gen_range(0..interval)
}

/// Rotate a schedule around a split point drawn as a fraction of its length.
///
/// Arrival offsets `c` become `(c - split) mod total`; the re-sorted offsets are
/// turned back into delays. The number of delays and their sum are unchanged up
/// to the position of the last arrival.
fn rotate_schedule(delays: &mut [f64], split_fraction: f64) {
    let total: f64 = delays.iter().sum();
    if total <= 0.0 {
        return;
    }

    let split = split_fraction * total;
    let mut elapsed = 0.0;
    let mut offsets: Vec<f64> = delays
        .iter()
        .map(|delay| {
            elapsed += delay;
            (elapsed - split).rem_euclid(total)
        })
        .collect();
    offsets.sort_by(f64::total_cmp);

    let mut previous = 0.0;
    for (delay, offset) in delays.iter_mut().zip(offsets) {
        *delay = offset - previous;
        previous = offset;
    }
}

/// Clamp delays to 1µs and squeeze the schedule into `budget` if it overflows.
fn floor_and_normalize(delays: &mut [f64], budget: f64) {
    let mut total = 0.0;
    for delay in delays.iter_mut() {
        if *delay < MIN_IAT_MICROSECONDS {
            *delay = MIN_IAT_MICROSECONDS;
        }
        total += *delay;
    }

    if total > budget {
        for delay in delays.iter_mut() {
            *delay = (*delay / total * budget).max(MIN_IAT_MICROSECONDS);
        }
    }
}

/// Path of the specification file of the `index`-th function.
pub fn specification_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("iat{}.json", index))
}

/// Persist a generated specification as indented JSON.
pub fn write_specification(
    dir: &Path,
    index: usize,
    spec: &FunctionSpecification,
) -> LoadResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| LoadError::Persistence {
        context: "creating specification directory",
        source: e,
    })?;

    let path = specification_path(dir, index);
    let file = File::create(&path).map_err(|e| LoadError::Persistence {
        context: "creating specification file",
        source: e,
    })?;

    serde_json::to_writer_pretty(BufWriter::new(file), spec).map_err(|e| {
        LoadError::Specification {
            path: path.clone(),
            message: e.to_string(),
        }
    })?;

    Ok(path)
}

/// Load a specification written by [`write_specification`].
///
/// Files are trusted to be already floored and normalised.
pub fn read_specification(dir: &Path, index: usize) -> LoadResult<FunctionSpecification> {
    let path = specification_path(dir, index);
    let file = File::open(&path).map_err(|e| LoadError::Persistence {
        context: "opening specification file",
        source: e,
    })?;

    let spec: FunctionSpecification =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| LoadError::Specification {
            path: path.clone(),
            message: e.to_string(),
        })?;

    if spec.iat.len() != spec.runtime_specification.len() {
        return Err(LoadError::Specification {
            path,
            message: format!(
                "{} IAT slots but {} specification slots",
                spec.iat.len(),
                spec.runtime_specification.len()
            ),
        });
    }

    for (slot, (iat, specs)) in spec.iat.iter().zip(&spec.runtime_specification).enumerate() {
        if iat.len() != specs.len() {
            return Err(LoadError::Specification {
                path,
                message: format!(
                    "slot {} has {} delays but {} specifications",
                    slot,
                    iat.len(),
                    specs.len()
                ),
            });
        }
    }

    Ok(spec)
}

/// IAT-only mode: generate every function's specification and write it to
/// `<output_dir>/iat<i>.json`.
pub fn generate_iat_files(
    experiment: &ExperimentConfig,
    functions: &mut [Function],
) -> LoadResult<Vec<PathBuf>> {
    let mut generator = SpecificationGenerator::new(experiment.seed, experiment.bounds);
    let mut paths = Vec::with_capacity(functions.len());

    for (index, function) in functions.iter_mut().enumerate() {
        let spec = generator.generate_invocation_data(
            function,
            experiment.distribution,
            experiment.shift,
            experiment.granularity,
        );
        let path = write_specification(&experiment.output_dir, index, &spec)?;
        tracing::info!(function = %function.name, path = %path.display(), "Wrote specification");
        function.specification = Some(spec);
        paths.push(path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{
        FunctionInvocationStats, FunctionMemoryStats, FunctionRuntimeStats,
    };
    use crate::types::FunctionName;
    use tempfile::TempDir;

    const ONE_MINUTE_BUDGET: f64 = 60_000_000.0 - SAFETY_MARGIN_MICROSECONDS;

    fn test_function() -> Function {
        Function::new(
            FunctionName::new("test-function").unwrap(),
            FunctionInvocationStats::new(vec![5; 20]),
            FunctionRuntimeStats {
                average: 50,
                count: 100,
                minimum: 0,
                maximum: 100,
                percentile0: 0,
                percentile1: 1,
                percentile25: 25,
                percentile50: 50,
                percentile75: 75,
                percentile99: 99,
                percentile100: 100,
            },
            FunctionMemoryStats {
                average: 5000,
                count: 100,
                percentile1: 100,
                percentile5: 500,
                percentile25: 2500,
                percentile50: 5000,
                percentile75: 7500,
                percentile95: 9500,
                percentile99: 9900,
                percentile100: 10000,
            },
        )
    }

    fn generator(seed: u64) -> SpecificationGenerator {
        SpecificationGenerator::new(seed, SpecBounds::default())
    }

    const DISTRIBUTIONS: [IatDistribution; 3] = [
        IatDistribution::Exponential,
        IatDistribution::Uniform,
        IatDistribution::Equidistant,
    ];

    #[test]
    fn test_iat_count_floor_and_budget() {
        let mut gen = generator(1);
        for distribution in DISTRIBUTIONS {
            for shift in [false, true] {
                for n in [1u64, 2, 5, 60, 1_000, 100_000] {
                    let iats = gen.generate_interarrival_times(
                        n,
                        distribution,
                        shift,
                        TraceGranularity::Minute,
                    );
                    assert_eq!(iats.len(), n as usize);
                    assert!(iats.iter().all(|&iat| iat >= 1.0));
                    let sum: f64 = iats.iter().sum();
                    assert!(
                        sum <= ONE_MINUTE_BUDGET + 1e-3,
                        "{:?} n={} sum={}",
                        distribution,
                        n,
                        sum
                    );
                }
            }
        }
    }

    #[test]
    fn test_zero_invocations() {
        let mut gen = generator(1);
        assert!(gen
            .generate_interarrival_times(0, IatDistribution::Exponential, true, TraceGranularity::Minute)
            .is_empty());
    }

    #[test]
    fn test_equidistant_and_uniform_are_constant() {
        let mut gen = generator(1);
        for distribution in [IatDistribution::Equidistant, IatDistribution::Uniform] {
            let raw = gen.draw_delays(5, distribution, 60_000_000.0);
            assert!(raw.iter().all(|&iat| iat == 12_000_000.0));

            let iats =
                gen.generate_interarrival_times(5, distribution, true, TraceGranularity::Minute);
            assert!(iats.windows(2).all(|w| w[0] == w[1]));
            assert!((iats[0] - 12_000_000.0).abs() <= SAFETY_MARGIN_MICROSECONDS);
        }
    }

    #[test]
    fn test_tiny_delays_are_floored() {
        let mut delays = vec![0.0, 0.25, 5.0];
        floor_and_normalize(&mut delays, 1_000.0);
        assert_eq!(delays, vec![1.0, 1.0, 5.0]);
    }

    #[test]
    fn test_normalization_refloors() {
        // Rescaling pushes the small delays below 1µs a second time.
        let mut delays = vec![1.0, 1.0, 1_000_000.0];
        floor_and_normalize(&mut delays, 1_000.0);
        assert_eq!(delays[0], 1.0);
        assert_eq!(delays[1], 1.0);
        assert!(delays[2] < 1_000.0);
    }

    #[test]
    fn test_second_granularity_budget() {
        let mut gen = generator(3);
        let iats = gen.generate_interarrival_times(
            10,
            IatDistribution::Exponential,
            false,
            TraceGranularity::Second,
        );
        let sum: f64 = iats.iter().sum();
        assert_eq!(iats.len(), 10);
        assert!(sum <= ONE_SECOND_IN_MICROSECONDS - SAFETY_MARGIN_MICROSECONDS + 1e-6);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let function = test_function();
        let a = generator(99).generate_invocation_data(
            &function,
            IatDistribution::Exponential,
            true,
            TraceGranularity::Minute,
        );
        let b = generator(99).generate_invocation_data(
            &function,
            IatDistribution::Exponential,
            true,
            TraceGranularity::Minute,
        );
        assert_eq!(a, b);

        let c = generator(100).generate_invocation_data(
            &function,
            IatDistribution::Exponential,
            true,
            TraceGranularity::Minute,
        );
        assert_ne!(a.iat, c.iat);
    }

    #[test]
    fn test_rotation_preserves_count_and_span() {
        let mut delays = vec![10.0, 20.0, 30.0, 40.0];
        rotate_schedule(&mut delays, 0.5);
        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|&d| d >= 0.0));
        let span: f64 = delays.iter().sum();
        assert!(span <= 100.0);
        // Split at 50: arrivals 10,30,60,100 move to 60,80,10,50.
        assert_eq!(delays, vec![10.0, 40.0, 10.0, 20.0]);
    }

    #[test]
    fn test_execution_spec_within_bounds() {
        let bounds = SpecBounds {
            min_runtime_ms: 5,
            max_runtime_ms: 80,
            min_memory_mib: 200,
            max_memory_mib: 9000,
        };
        let mut gen = SpecificationGenerator::new(17, bounds);
        let function = test_function();

        for _ in 0..10_000 {
            let spec = gen.generate_execution_spec(&function);
            assert!((5..=80).contains(&spec.runtime), "runtime {}", spec.runtime);
            assert!((200..=9000).contains(&spec.memory), "memory {}", spec.memory);
        }
    }

    #[test]
    fn test_execution_spec_default_bounds() {
        let mut gen = generator(5);
        let function = test_function();
        let bounds = SpecBounds::default();

        for _ in 0..10_000 {
            let spec = gen.generate_execution_spec(&function);
            assert!(spec.runtime >= bounds.min_runtime_ms && spec.runtime <= bounds.max_runtime_ms);
            assert!(spec.memory >= bounds.min_memory_mib && spec.memory <= bounds.max_memory_mib);
        }
    }

    #[test]
    fn test_degenerate_table_stays_in_bounds() {
        // Non-monotonic and zero-width percentiles.
        let mut function = test_function();
        function.runtime_stats.percentile25 = 0;
        function.runtime_stats.percentile50 = 0;
        function.memory_stats.percentile50 = 10;
        function.memory_stats.percentile75 = 10;
        let mut gen = generator(8);

        for _ in 0..5_000 {
            let spec = gen.generate_execution_spec(&function);
            assert!(spec.runtime >= 1 && spec.runtime <= 60_000);
            assert!(spec.memory >= 1 && spec.memory <= 10_240);
        }
    }

    #[test]
    fn test_fixed_specification_sentinel() {
        let mut function = test_function();
        function.memory_stats.percentile100 = function.runtime_stats.maximum;

        for seed in [1, 2, 3] {
            let mut gen = generator(seed);
            for _ in 0..10 {
                let spec = gen.generate_execution_spec(&function);
                assert_eq!(spec.runtime, 50);
                assert_eq!(spec.memory, 5000);
            }
        }
    }

    #[test]
    fn test_invocation_data_shape() {
        let mut function = test_function();
        function.invocation_stats = FunctionInvocationStats::new(vec![3, 0, 7]);
        let spec = generator(4).generate_invocation_data(
            &function,
            IatDistribution::Uniform,
            false,
            TraceGranularity::Minute,
        );

        assert_eq!(spec.slots(), 3);
        for (slot, expected) in [3usize, 0, 7].into_iter().enumerate() {
            let (iat, specs) = spec.slot(slot);
            assert_eq!(iat.len(), expected);
            assert_eq!(specs.len(), expected);
        }
    }

    #[test]
    fn test_specification_file_roundtrip_is_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let spec = FunctionSpecification {
            iat: vec![vec![0.5, 70_000_000.0]],
            runtime_specification: vec![vec![
                RuntimeSpecification {
                    runtime: 10,
                    memory: 128
                };
                2
            ]],
        };

        let path = write_specification(temp_dir.path(), 3, &spec).unwrap();
        assert!(path.ends_with("iat3.json"));
        // Indented, human-readable output.
        assert!(fs::read_to_string(&path).unwrap().contains("\n  "));

        // Loading does not re-floor or re-normalise.
        let loaded = read_specification(temp_dir.path(), 3).unwrap();
        assert_eq!(loaded, spec);
    }

    #[test]
    fn test_read_mismatched_specification() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            specification_path(temp_dir.path(), 0),
            r#"{"iat": [[1.0, 2.0]], "runtime_specification": [[{"runtime": 1, "memory": 1}]]}"#,
        )
        .unwrap();

        assert!(matches!(
            read_specification(temp_dir.path(), 0),
            Err(LoadError::Specification { .. })
        ));
    }

    #[test]
    fn test_generate_iat_files() {
        let temp_dir = TempDir::new().unwrap();
        let experiment = ExperimentConfig {
            output_dir: temp_dir.path().to_path_buf(),
            distribution: IatDistribution::Equidistant,
            ..ExperimentConfig::default()
        };
        let mut functions = vec![test_function(), test_function()];

        let paths = generate_iat_files(&experiment, &mut functions).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(functions.iter().all(|f| f.specification.is_some()));

        let loaded = read_specification(temp_dir.path(), 1).unwrap();
        assert_eq!(Some(loaded), functions[1].specification);
    }
}
