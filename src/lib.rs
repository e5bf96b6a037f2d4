//! # Sync Benchmark Suite Library
//!
//! Micro-benchmarks for group synchronization primitives in a
//! single-program, multiple-rank setting. Every rank runs the same program;
//! per-rank measurements are reduced across the group into
//! average/minimum/maximum triples and reported by rank 0.
//!
//! ## Benchmarks
//!
//! - **Average latency**: mean cost of one synchronization call over a long
//!   back-to-back loop.
//! - **Tail latency**: per-call latency distribution, reported at requested
//!   percentiles together with the global range and the average.
//! - **Overlap**: how much of a split-phase synchronization can be hidden
//!   behind CPU-bound work of growing size.
//!
//! ## Architecture Overview
//!
//! - `group`: the `Collective` abstraction and the thread-backed runtime
//!   (`ThreadGroup`) that provides barriers, split-phase sync and reductions
//! - `timer`: monotonic microsecond clock
//! - `operation`: the closed set of benchmarkable synchronization operations
//! - `sampler`, `percentile`, `aggregate`, `overlap`: measurement and
//!   statistics
//! - `benchmark`: per-rank program driver and validated configuration
//! - `results`: report types, fixed-width text output and JSON results files
//! - `cli`, `logging`: command-line surface and tracing setup
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use sync_bench::{Args, BenchmarkConfig, BenchmarkRunner, LaunchOptions, ThreadGroup};
//!
//! fn main() -> anyhow::Result<()> {
//!     let args = Args::parse_from(["sync-bench", "tail-latency", "-n", "4"]);
//!     let config = BenchmarkConfig::from_args(&args)?;
//!     let runner = BenchmarkRunner::new(config);
//!
//!     let outputs = ThreadGroup::launch(4, LaunchOptions::default(), |member| {
//!         Ok(runner.run(member)?)
//!     })?;
//!     println!("{:?}", outputs[0].report);
//!     Ok(())
//! }
//! ```
//!
//! ## Measurement Characteristics
//!
//! - Latencies are taken from a monotonic clock and expressed in microseconds
//! - Warmup iterations are always excluded from the statistics
//! - Every rank issues the same sequence of collective calls, so reductions
//!   never mismatch

/// Cross-rank reduction of scalar statistics into average/min/max triples.
pub mod aggregate;

/// Per-rank benchmark programs
///
/// Contains the `BenchmarkRunner` and `BenchmarkConfig` types. The runner
/// drives one of the three programs on a single rank:
/// - warmup and measurement through the samplers
/// - percentile extraction for the tail-latency program
/// - aggregation of every reported figure across the group
pub mod benchmark;

/// Command-line interface and configuration
pub mod cli;

/// Typed errors of the runtime and the benchmark core.
pub mod error;

/// Process-group abstraction and the thread-backed runtime
///
/// Provides the `Collective` trait used by every measurement, plus:
/// - a split-phase generation barrier
/// - double-banked all-gather slots for reductions
/// - whole-group abort when any rank fails or panics
pub mod group;

/// Colorized tracing output and subscriber setup
///
/// Events go to stderr so stdout carries only the report; an optional
/// non-blocking file layer mirrors them to a log file.
pub mod logging;

/// Synchronization operations under test.
pub mod operation;

/// Computation/communication overlap decomposition over growing workloads.
pub mod overlap;

/// Nearest-rank percentiles over locally collected samples.
pub mod percentile;

/// Report data, text formatting and JSON results output
///
/// Manages the presentation of benchmark results with support for:
/// - fixed-width text reports on stdout
/// - per-rank details at higher verbosity levels
/// - structured JSON output with run metadata and system information
pub mod results;

/// Warmup-then-measure timing loops and the synthetic compute workload
///
/// Two modes are provided:
/// - one averaged block bracketed by a single barrier
/// - individually timed, barrier-separated invocations for tail analysis
pub mod sampler;

/// Monotonic microsecond timestamps.
pub mod timer;

// Re-export key types for convenient library usage

/// Main benchmark execution engine
pub use benchmark::{BenchmarkConfig, BenchmarkRunner, RankOutput};

/// Command-line interface types
pub use cli::{Args, BenchmarkKind, Verbosity};

pub use error::{BenchError, BenchResult, GroupError};

/// Process-group runtime
///
/// `Collective` is the seam measurements are written against; `ThreadGroup`
/// is the runtime shipped with the crate.
pub use group::{Collective, LaunchOptions, ReduceOp, ThreadGroup};

pub use operation::SyncOperation;

/// Result collection and management
pub use results::{Report, ReportFormatter, ResultsManager};

/// The current version of the sync benchmark suite
///
/// Populated from Cargo.toml and recorded in JSON results for
/// reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Warmup iterations excluded from every measurement.
    pub const SKIP: usize = 200;

    /// Measured iterations for the average-latency benchmark.
    pub const AVG_LATENCY_ITERATIONS: usize = 10_000;

    /// Measured iterations for the tail-latency and overlap benchmarks.
    ///
    /// Tail estimates need many more samples than a mean to be stable.
    pub const TAIL_LATENCY_ITERATIONS: usize = 100_000;

    /// Tail-latency percentiles reported when none are requested.
    pub const PERCENTILES: [f64; 2] = [0.99, 0.95];

    /// Largest overlap workload size.
    pub const MAX_WORKLOAD: usize = crate::overlap::DEFAULT_MAX_WORKLOAD;

    /// Number of ranks in the process group.
    pub const RANKS: usize = 2;
}
