//! # Benchmark Engine Module
//!
//! Runs one of the three benchmark programs on a single rank. Every rank of
//! the group executes the same [`BenchmarkRunner::run`] with an identical,
//! already-validated [`BenchmarkConfig`], so all ranks issue the same
//! sequence of collective calls.
//!
//! ## Programs
//!
//! - **Average latency**: one timed block of back-to-back invocations, then
//!   a barrier and a single aggregate of the local average.
//! - **Tail latency**: individually timed invocations, sorted locally. For
//!   each requested percentile (in request order) a barrier followed by an
//!   aggregate of the local percentile value; then the group-wide range and
//!   the aggregate of local averages (the "noised" average).
//! - **Overlap**: delegated to [`OverlapDecomposer`].
//!
//! Aggregates are computed on every rank; only the reporting rank keeps the
//! resulting [`Report`].

use crate::aggregate::{aggregate, aggregate_range};
use crate::cli::{Args, BenchmarkKind, Verbosity};
use crate::error::{BenchError, BenchResult};
use crate::group::{is_reporting_rank, Collective, ReduceScratch};
use crate::operation::SyncOperation;
use crate::overlap::{OverlapConfig, OverlapDecomposer};
use crate::percentile::{validate_percentiles, PercentileSpec, SortedSamples};
use crate::results::{
    AvgLatencyReport, OverlapReport, RankInfo, Report, RunLabels, TailLatency, TailLatencyReport,
};
use crate::sampler::{measure_average, measure_sequence, SamplerConfig};
use serde::Serialize;
use tracing::{debug, info};

/// Configuration for benchmark execution
///
/// Built once from the command line before the group is launched and then
/// shared read-only by every rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkConfig {
    pub kind: BenchmarkKind,
    /// Ignored by the overlap program, which always uses split-phase sync.
    pub operation: SyncOperation,
    pub sampler: SamplerConfig,
    /// Validated, in request order. Only read by the tail-latency program.
    pub percentiles: Vec<PercentileSpec>,
    pub verbosity: Verbosity,
    /// Group size.
    pub ranks: usize,
    pub pin_cores: bool,
    /// Largest overlap workload size.
    pub max_workload: usize,
}

impl BenchmarkConfig {
    /// Create benchmark configuration from CLI arguments
    ///
    /// Applies the per-program iteration default and validates everything a
    /// rank would otherwise trip over mid-run.
    ///
    /// ## Errors
    /// - [`BenchError::InvalidIterations`] for zero iterations
    /// - [`BenchError::NoPercentiles`], [`BenchError::TooManyPercentiles`] or
    ///   [`BenchError::InvalidPercentile`] for a bad percentile list
    /// - [`BenchError::InvalidVerbosity`] for a level above 2
    /// - [`BenchError::InvalidGroupSize`] for zero ranks
    /// - [`BenchError::InvalidWorkload`] for a zero workload bound
    pub fn from_args(args: &Args) -> BenchResult<Self> {
        let iterations = args
            .iterations
            .unwrap_or_else(|| args.benchmark.default_iterations());
        let sampler = SamplerConfig::new(iterations, args.skip)?;
        let percentiles = validate_percentiles(&args.percentiles)?;
        let verbosity = Verbosity::try_from(args.verbosity)?;

        if args.ranks == 0 {
            return Err(BenchError::InvalidGroupSize(args.ranks));
        }
        if args.max_workload == 0 {
            return Err(BenchError::InvalidWorkload(args.max_workload));
        }

        Ok(Self {
            kind: args.benchmark,
            operation: args.operation,
            sampler,
            percentiles,
            verbosity,
            ranks: args.ranks,
            pin_cores: args.pin,
            max_workload: args.max_workload,
        })
    }

    /// Footer labels for the report.
    pub fn labels(&self) -> RunLabels {
        RunLabels {
            iterations: self.sampler.iterations(),
            skip: self.sampler.skip(),
            ranks: self.ranks,
        }
    }
}

impl std::fmt::Display for BenchmarkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark for: {}", self.kind)?;
        match self.kind {
            BenchmarkKind::Overlap => {
                writeln!(f, "  Max Workload:       {}", self.max_workload)?;
            }
            _ => {
                writeln!(f, "  Operation:          {}", self.operation)?;
            }
        }
        writeln!(f, "  Iterations:         {}", self.sampler.iterations())?;
        writeln!(f, "  Skip:               {}", self.sampler.skip())?;
        if self.kind == BenchmarkKind::TailLatency {
            let percentiles: Vec<String> =
                self.percentiles.iter().map(|p| p.to_string()).collect();
            writeln!(f, "  Percentiles:        {}", percentiles.join(", "))?;
        }
        writeln!(f, "  Ranks:              {}", self.ranks)?;
        writeln!(
            f,
            "  Core Pinning:       {}",
            if self.pin_cores { "Enabled" } else { "Disabled" }
        )?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// What one rank hands back after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RankOutput {
    pub info: RankInfo,
    /// Present on the reporting rank only.
    pub report: Option<Report>,
    /// Sorted per-iteration latencies, kept for the highest verbosity level
    /// of the tail-latency program.
    pub samples: Option<Vec<f64>>,
}

/// Per-rank benchmark driver.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run the configured program on this rank.
    ///
    /// ## Parameters
    /// - `group`: this rank's handle on the process group
    ///
    /// ## Returns
    /// - `Ok(RankOutput)`: rank identity, the report on the reporting rank,
    ///   and optionally the local samples
    /// - `Err(BenchError)`: a collective or allocation failure; fatal for the
    ///   whole group
    pub fn run<G: Collective + ?Sized>(&self, group: &G) -> BenchResult<RankOutput> {
        let config = &self.config;
        let info = RankInfo::collect(
            group.rank(),
            group.size(),
            config.sampler.skip(),
            config.sampler.iterations(),
        );
        if is_reporting_rank(group) {
            info!("Running {} benchmark on {} ranks", config.kind, group.size());
        }

        let mut samples = None;
        let report = match config.kind {
            BenchmarkKind::AvgLatency => Report::AvgLatency(self.run_avg_latency(group)?),
            BenchmarkKind::TailLatency => {
                let (report, sorted) = self.run_tail_latency(group)?;
                if config.verbosity >= Verbosity::Samples {
                    samples = Some(sorted.into_vec());
                }
                Report::TailLatency(report)
            }
            BenchmarkKind::Overlap => Report::Overlap(self.run_overlap(group)?),
        };

        if is_reporting_rank(group) {
            info!("{} benchmark completed", config.kind);
        }
        Ok(RankOutput {
            info,
            report: is_reporting_rank(group).then_some(report),
            samples,
        })
    }

    /// Average latency of the configured operation, aggregated across ranks.
    pub fn run_avg_latency<G: Collective + ?Sized>(
        &self,
        group: &G,
    ) -> BenchResult<AvgLatencyReport> {
        let config = &self.config;
        let mut scratch = ReduceScratch::new(group.size());

        let local = measure_average(group, config.sampler, config.operation.bind(group))?;
        group.barrier()?;
        let latency = aggregate(group, local, &mut scratch)?;

        Ok(AvgLatencyReport {
            latency,
            operation: config.operation,
            labels: config.labels(),
        })
    }

    /// Tail latencies of the configured operation.
    ///
    /// Also returns this rank's sorted samples so the caller can dump them.
    pub fn run_tail_latency<G: Collective + ?Sized>(
        &self,
        group: &G,
    ) -> BenchResult<(TailLatencyReport, SortedSamples)> {
        let config = &self.config;
        let mut scratch = ReduceScratch::new(group.size());

        let run = measure_sequence(group, config.sampler, config.operation.bind(group))?;
        let sorted = run.samples.into_sorted()?;

        let mut tails = Vec::with_capacity(config.percentiles.len());
        for &percentile in &config.percentiles {
            group.barrier()?;
            let local = sorted.percentile(percentile);
            debug!(
                "Rank {}: {} percentile at {:.2} us",
                group.rank(),
                percentile,
                local
            );
            tails.push(TailLatency {
                percentile,
                latency: aggregate(group, local, &mut scratch)?,
            });
        }

        let range = aggregate_range(group, run.min, run.max, &mut scratch)?;
        let noised_average = aggregate(group, run.average, &mut scratch)?;

        let report = TailLatencyReport {
            noised_average,
            range,
            tails,
            operation: config.operation,
            labels: config.labels(),
        };
        Ok((report, sorted))
    }

    /// Computation / communication overlap sweep.
    pub fn run_overlap<G: Collective + ?Sized>(&self, group: &G) -> BenchResult<OverlapReport> {
        let config = &self.config;
        let overlap_config = OverlapConfig {
            sampler: config.sampler,
            max_workload: config.max_workload,
        };
        let outcome = OverlapDecomposer::new(group, overlap_config)?.run()?;
        Ok(OverlapReport {
            outcome,
            labels: config.labels(),
        })
    }
}
