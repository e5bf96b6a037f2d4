//! # Overlap Decomposer
//!
//! Quantifies how much of a group synchronization's latency can be hidden
//! behind concurrent computation.
//!
//! The communication-only latency is measured once, with an empty workload,
//! before the size loop. Then, for each workload size `1, 2, 4, ... W_max`:
//!
//! 1. computation-only latency: the workload alone, averaged;
//! 2. overlapped latency: post a split-phase synchronization, run the
//!    workload, wait for the synchronization, averaged;
//! 3. `overhead = overlapped - computation_only` and
//!    `availability = 1 - overhead / communication_only`;
//! 4. the four quantities are aggregated across the group in the order
//!    computation, overlapped, overhead, availability.
//!
//! Availability close to 1 means the synchronization cost is almost entirely
//! hidden; values near or below 0 mean computation and communication simply
//! add up. A zero communication-only latency leaves availability undefined and
//! it is reported as NaN.

use crate::aggregate::{aggregate, StatTriple};
use crate::error::BenchResult;
use crate::group::{Collective, ReduceScratch};
use crate::sampler::{measure_average, ComputeWorkload, SamplerConfig};
use crate::timer::Timer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Largest workload size measured by default.
pub const DEFAULT_MAX_WORKLOAD: usize = 512;

/// Geometric workload sizes `1, 2, 4, ...` not exceeding `max_workload`.
pub fn workload_sizes(max_workload: usize) -> impl Iterator<Item = usize> {
    std::iter::successors(Some(1usize), |size| size.checked_mul(2))
        .take_while(move |&size| size <= max_workload)
}

/// `1 - overhead / communication_only`, or NaN when the communication-only
/// latency is zero.
pub fn availability(overhead: f64, communication_only: f64) -> f64 {
    if communication_only == 0.0 {
        return f64::NAN;
    }
    1.0 - overhead / communication_only
}

/// Local (single-rank) overlap figures for one workload size, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapMeasurement {
    pub workload_size: usize,
    pub computation_only: f64,
    pub communication_only: f64,
    pub overlapped: f64,
    pub overhead: f64,
    pub availability: f64,
}

impl OverlapMeasurement {
    pub fn derive(
        workload_size: usize,
        computation_only: f64,
        communication_only: f64,
        overlapped: f64,
    ) -> Self {
        let overhead = overlapped - computation_only;
        Self {
            workload_size,
            computation_only,
            communication_only,
            overlapped,
            overhead,
            availability: availability(overhead, communication_only),
        }
    }
}

/// Group-wide overlap figures for one workload size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapRow {
    pub workload_size: usize,
    pub computation: StatTriple,
    pub overlapped: StatTriple,
    pub overhead: StatTriple,
    pub availability: StatTriple,
}

/// Everything the overlap benchmark produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapOutcome {
    pub communication: StatTriple,
    pub rows: Vec<OverlapRow>,
}

/// Parameters of an overlap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverlapConfig {
    pub sampler: SamplerConfig,
    pub max_workload: usize,
}

/// Average latency of post / workload / wait rounds.
///
/// Warmup rounds run unsynchronized, then a barrier opens the timed window.
pub fn measure_overlapped<G>(
    group: &G,
    config: SamplerConfig,
    workload: &mut ComputeWorkload,
    amount: usize,
) -> BenchResult<f64>
where
    G: Collective + ?Sized,
{
    for _ in 0..config.skip() {
        let handle = group.sync_post()?;
        workload.run(amount);
        group.sync_wait(handle)?;
    }
    group.barrier()?;

    let start = Timer::now();
    for _ in 0..config.iterations() {
        let handle = group.sync_post()?;
        workload.run(amount);
        group.sync_wait(handle)?;
    }
    let stop = Timer::now();

    Ok(Timer::elapsed_us(start, stop) / config.iterations() as f64)
}

/// Drives the overlap measurement on one rank.
pub struct OverlapDecomposer<'g, G: Collective + ?Sized> {
    group: &'g G,
    config: OverlapConfig,
    workload: ComputeWorkload,
    scratch: ReduceScratch,
}

impl<'g, G: Collective + ?Sized> OverlapDecomposer<'g, G> {
    /// Allocates the workload buffer (seeded by rank) and reduction scratch.
    pub fn new(group: &'g G, config: OverlapConfig) -> BenchResult<Self> {
        let workload = ComputeWorkload::new(config.max_workload, group.rank() as u64)?;
        Ok(Self {
            group,
            config,
            workload,
            scratch: ReduceScratch::new(group.size()),
        })
    }

    /// Communication-only latency: local value and its group aggregate.
    pub fn measure_communication(&mut self) -> BenchResult<(f64, StatTriple)> {
        let local = measure_overlapped(self.group, self.config.sampler, &mut self.workload, 0)?;
        let triple = aggregate(self.group, local, &mut self.scratch)?;
        Ok((local, triple))
    }

    /// Measure and aggregate one workload size.
    pub fn measure_size(
        &mut self,
        workload_size: usize,
        communication_only: f64,
    ) -> BenchResult<(OverlapMeasurement, OverlapRow)> {
        let group = self.group;
        let sampler = self.config.sampler;

        let workload = &mut self.workload;
        let computation_only = measure_average(group, sampler, || {
            workload.run(workload_size);
            Ok(())
        })?;
        let overlapped = measure_overlapped(group, sampler, &mut self.workload, workload_size)?;
        let local = OverlapMeasurement::derive(
            workload_size,
            computation_only,
            communication_only,
            overlapped,
        );

        group.barrier()?;
        let row = OverlapRow {
            workload_size,
            computation: aggregate(group, local.computation_only, &mut self.scratch)?,
            overlapped: aggregate(group, local.overlapped, &mut self.scratch)?,
            overhead: aggregate(group, local.overhead, &mut self.scratch)?,
            availability: aggregate(group, local.availability, &mut self.scratch)?,
        };
        debug!(
            "Rank {}: workload {} -> compute {:.2} us, overlapped {:.2} us, availability {:.3}",
            group.rank(),
            workload_size,
            local.computation_only,
            local.overlapped,
            local.availability
        );
        Ok((local, row))
    }

    /// Run the full size sweep.
    pub fn run(&mut self) -> BenchResult<OverlapOutcome> {
        let (communication_only, communication) = self.measure_communication()?;
        if crate::group::is_reporting_rank(self.group) {
            info!("Communication-only latency: {} us", communication);
        }

        let mut rows = Vec::new();
        for size in workload_sizes(self.config.max_workload) {
            let (_, row) = self.measure_size(size, communication_only)?;
            rows.push(row);
        }
        Ok(OverlapOutcome {
            communication,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{LaunchOptions, ThreadGroup};

    #[test]
    fn test_workload_sizes_are_geometric() {
        let sizes: Vec<usize> = workload_sizes(512).collect();
        assert_eq!(sizes, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512]);
        assert_eq!(workload_sizes(600).last(), Some(512));
        assert_eq!(workload_sizes(1).collect::<Vec<_>>(), vec![1]);
        assert_eq!(workload_sizes(0).count(), 0);
    }

    #[test]
    fn test_workload_sizes_do_not_overflow() {
        assert_eq!(workload_sizes(usize::MAX).count(), usize::BITS as usize);
    }

    #[test]
    fn test_perfect_overlap_gives_full_availability() {
        let measurement = OverlapMeasurement::derive(0, 12.5, 4.0, 12.5);
        assert_eq!(measurement.overhead, 0.0);
        assert_eq!(measurement.availability, 1.0);
    }

    #[test]
    fn test_additive_latencies_give_zero_availability() {
        let measurement = OverlapMeasurement::derive(8, 10.0, 4.0, 14.0);
        assert_eq!(measurement.overhead, 4.0);
        assert_eq!(measurement.availability, 0.0);
    }

    #[test]
    fn test_zero_communication_latency_is_undefined() {
        assert!(availability(0.0, 0.0).is_nan());
        assert!(availability(3.0, 0.0).is_nan());
        assert!(OverlapMeasurement::derive(4, 1.0, 0.0, 1.0).availability.is_nan());
    }

    #[test]
    fn test_decomposer_produces_one_row_per_size() {
        let outputs = ThreadGroup::launch(2, LaunchOptions::default(), |member| {
            let config = OverlapConfig {
                sampler: SamplerConfig::new(20, 2)?,
                max_workload: 16,
            };
            let mut decomposer = OverlapDecomposer::new(member, config)?;
            Ok(decomposer.run()?)
        })
        .unwrap();

        for outcome in &outputs {
            let sizes: Vec<usize> = outcome.rows.iter().map(|row| row.workload_size).collect();
            assert_eq!(sizes, vec![1, 2, 4, 8, 16]);
            for row in &outcome.rows {
                for triple in [row.computation, row.overlapped, row.overhead] {
                    assert!(triple.minimum <= triple.average && triple.average <= triple.maximum);
                }
            }
        }
        // Every rank receives the same reduced figures.
        assert_eq!(
            outputs[0].rows[4].computation,
            outputs[1].rows[4].computation
        );
    }
}
