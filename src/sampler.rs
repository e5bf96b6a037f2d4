//! # Local Sampler
//!
//! Timing loops executed identically on every rank. Both modes run a warmup
//! phase of `skip` untimed invocations before measuring.
//!
//! - [`measure_average`] brackets the whole measured phase with a single
//!   barrier and one pair of timestamps, and reports `total / iterations`.
//!   Keeping barriers out of the timed loop avoids barrier-induced skew while
//!   still starting every rank from a synchronized state.
//! - [`measure_sequence`] synchronizes before every round and times each
//!   invocation on its own, so one rank's delay cannot bleed into the next
//!   sample. The first `skip` rounds are timed but discarded.
//!
//! [`ComputeWorkload`] is the CPU-bound filler used by the overlap benchmark.

use crate::error::{BenchError, BenchResult, GroupError};
use crate::group::Collective;
use crate::percentile::SampleSequence;
use crate::timer::Timer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::hint::black_box;
use tracing::debug;

/// Iteration counts for one measurement.
///
/// Construction validates the counts, so a `SamplerConfig` in hand always has
/// at least one measured iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplerConfig {
    iterations: usize,
    skip: usize,
}

impl SamplerConfig {
    pub fn new(iterations: usize, skip: usize) -> BenchResult<Self> {
        if iterations < 1 {
            return Err(BenchError::InvalidIterations(iterations));
        }
        Ok(Self { iterations, skip })
    }

    /// Number of measured iterations.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of warmup iterations that are not measured.
    pub fn skip(&self) -> usize {
        self.skip
    }
}

/// Result of a per-iteration measurement on one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRun {
    /// Retained latencies in microseconds, in measurement order.
    pub samples: SampleSequence,
    pub min: f64,
    pub max: f64,
    pub average: f64,
}

/// Average latency of `operation` in microseconds.
///
/// Runs `skip` warmup invocations, a barrier, then `iterations` back-to-back
/// invocations timed as one block.
pub fn measure_average<G, F>(group: &G, config: SamplerConfig, mut operation: F) -> BenchResult<f64>
where
    G: Collective + ?Sized,
    F: FnMut() -> Result<(), GroupError>,
{
    for _ in 0..config.skip {
        operation()?;
    }
    group.barrier()?;

    let start = Timer::now();
    for _ in 0..config.iterations {
        operation()?;
    }
    let stop = Timer::now();

    let average = Timer::elapsed_us(start, stop) / config.iterations as f64;
    debug!(
        "Rank {}: averaged {} iterations at {:.3} us",
        group.rank(),
        config.iterations,
        average
    );
    Ok(average)
}

/// Per-iteration latencies of `operation` in microseconds.
///
/// The sample buffer is allocated before the first round, so an allocation
/// failure surfaces before this rank enters any collective call.
pub fn measure_sequence<G, F>(
    group: &G,
    config: SamplerConfig,
    mut operation: F,
) -> BenchResult<SequenceRun>
where
    G: Collective + ?Sized,
    F: FnMut() -> Result<(), GroupError>,
{
    let mut samples = SampleSequence::with_capacity(config.iterations)?;
    let mut min = f64::MAX;
    let mut max = 0.0_f64;
    let mut sum = 0.0;

    for round in 0..config.iterations + config.skip {
        group.barrier()?;
        let start = Timer::now();
        operation()?;
        let stop = Timer::now();

        if round < config.skip {
            continue;
        }
        let latency = Timer::elapsed_us(start, stop);
        samples.push(latency);
        min = min.min(latency);
        max = max.max(latency);
        sum += latency;
    }

    let average = sum / config.iterations as f64;
    debug!(
        "Rank {}: collected {} samples (min {:.2}, max {:.2}, avg {:.3} us)",
        group.rank(),
        samples.len(),
        min,
        max,
        average
    );
    Ok(SequenceRun {
        samples,
        min,
        max,
        average,
    })
}

/// Deterministic CPU-bound filler whose cost grows quadratically with the
/// requested amount.
///
/// Each call bubble-sorts the first `amount` elements of a fixed buffer. Only
/// the cost curve matters; the sorted result is never read.
#[derive(Debug, Clone)]
pub struct ComputeWorkload {
    buffer: Vec<f64>,
}

impl ComputeWorkload {
    /// Buffer of `capacity` values seeded from `seed` (the rank, in practice).
    pub fn new(capacity: usize, seed: u64) -> BenchResult<Self> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|_| BenchError::Allocation {
                requested: capacity,
            })?;
        let mut rng = StdRng::seed_from_u64(seed);
        buffer.extend((0..capacity).map(|_| rng.gen::<f64>()));
        Ok(Self { buffer })
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Run the workload over `amount` elements (clamped to the capacity).
    pub fn run(&mut self, amount: usize) {
        let n = amount.min(self.buffer.len());
        let buffer = black_box(&mut self.buffer[..n]);
        for i in 0..n.saturating_sub(1) {
            for j in 0..n - i - 1 {
                if black_box(buffer[j]) > black_box(buffer[j + 1]) {
                    buffer.swap(j, j + 1);
                }
            }
        }
        black_box(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{LaunchOptions, ThreadGroup};
    use std::cell::Cell;

    #[test]
    fn test_sampler_config_rejects_zero_iterations() {
        assert!(matches!(
            SamplerConfig::new(0, 10),
            Err(BenchError::InvalidIterations(0))
        ));
        let config = SamplerConfig::new(1, 0).unwrap();
        assert_eq!(config.iterations(), 1);
        assert_eq!(config.skip(), 0);
    }

    #[test]
    fn test_measure_average_invokes_skip_plus_iterations() {
        let outputs = ThreadGroup::launch(2, LaunchOptions::default(), |member| {
            let calls = Cell::new(0usize);
            let config = SamplerConfig::new(20, 7)?;
            let average = measure_average(member, config, || {
                calls.set(calls.get() + 1);
                Ok(())
            })?;
            Ok((calls.get(), average))
        })
        .unwrap();

        for (calls, average) in outputs {
            assert_eq!(calls, 27);
            assert!(average >= 0.0);
        }
    }

    #[test]
    fn test_measure_sequence_keeps_exactly_iterations_samples() {
        let outputs = ThreadGroup::launch(2, LaunchOptions::default(), |member| {
            let calls = Cell::new(0usize);
            let config = SamplerConfig::new(5, 3)?;
            let run = measure_sequence(member, config, || {
                calls.set(calls.get() + 1);
                Ok(())
            })?;
            Ok((calls.get(), run))
        })
        .unwrap();

        for (calls, run) in outputs {
            assert_eq!(calls, 8);
            assert_eq!(run.samples.len(), 5);
            assert!(run.min <= run.average && run.average <= run.max);
        }
    }

    #[test]
    fn test_measure_sequence_discards_warmup_rounds() {
        // The warmup rounds are made slow; none of them may show up in the
        // retained samples.
        let outputs = ThreadGroup::launch(1, LaunchOptions::default(), |member| {
            let round = Cell::new(0usize);
            let config = SamplerConfig::new(5, 3)?;
            let run = measure_sequence(member, config, || {
                if round.get() < 3 {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                round.set(round.get() + 1);
                Ok(())
            })?;
            Ok(run)
        })
        .unwrap();

        let run = &outputs[0];
        assert_eq!(run.samples.len(), 5);
        assert!(run.max < 20_000.0, "warmup latency leaked: {:?}", run.samples);
    }

    #[test]
    fn test_measure_average_reflects_operation_cost() {
        let outputs = ThreadGroup::launch(1, LaunchOptions::default(), |member| {
            let config = SamplerConfig::new(5, 0)?;
            let average = measure_average(member, config, || {
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(())
            })?;
            Ok(average)
        })
        .unwrap();
        assert!(outputs[0] >= 1_000.0);
    }

    #[test]
    fn test_operation_error_is_propagated() {
        let result = ThreadGroup::launch(1, LaunchOptions::default(), |member| {
            let config = SamplerConfig::new(3, 0)?;
            measure_average(member, config, || Err(GroupError::Aborted { rank: 0 }))?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_workload_sorts_prefix() {
        let mut workload = ComputeWorkload::new(64, 3).unwrap();
        assert_eq!(workload.capacity(), 64);
        workload.run(16);
        let prefix = &workload.buffer[..16];
        assert!(prefix.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_compute_workload_clamps_amount() {
        let mut workload = ComputeWorkload::new(8, 1).unwrap();
        workload.run(0);
        workload.run(1);
        workload.run(1_000);
        assert!(workload.buffer.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_compute_workload_is_seeded_deterministically() {
        let a = ComputeWorkload::new(32, 9).unwrap();
        let b = ComputeWorkload::new(32, 9).unwrap();
        let c = ComputeWorkload::new(32, 10).unwrap();
        assert_eq!(a.buffer, b.buffer);
        assert_ne!(a.buffer, c.buffer);
    }
}
