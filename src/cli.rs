use crate::error::BenchError;
use crate::operation::SyncOperation;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sync Benchmark Suite - latency, tail latency and overlap of group synchronization
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None, disable_version_flag = true)]
pub struct Args {
    /// Benchmark to run
    #[clap(value_enum, default_value_t = BenchmarkKind::AvgLatency, help_heading = "Core Options")]
    pub benchmark: BenchmarkKind,

    /// Synchronization operation to benchmark (ignored by the overlap benchmark)
    #[clap(short = 'f', long = "function", value_enum, default_value_t = SyncOperation::SyncAll, help_heading = "Core Options")]
    pub operation: SyncOperation,

    /// Number of measured iterations [default: 10000 for avg-latency, 100000 otherwise]
    #[clap(short = 'i', long, help_heading = "Core Options")]
    pub iterations: Option<usize>,

    /// Number of warmup iterations excluded from measurement
    #[clap(short = 's', long, default_value_t = crate::defaults::SKIP, help_heading = "Core Options")]
    pub skip: usize,

    /// Tail-latency percentiles as fractions, e.g. -p 0.99,0.95
    #[clap(short = 'p', long, value_delimiter = ',', default_values_t = crate::defaults::PERCENTILES.to_vec(), allow_negative_numbers = true, help_heading = "Core Options")]
    pub percentiles: Vec<f64>,

    /// Largest synthetic workload size for the overlap benchmark
    #[clap(long, default_value_t = crate::defaults::MAX_WORKLOAD, help_heading = "Core Options")]
    pub max_workload: usize,

    /// Number of ranks in the process group
    #[clap(short = 'n', long, default_value_t = crate::defaults::RANKS, help_heading = "Group Options")]
    pub ranks: usize,

    /// Pin each rank to its own CPU core
    #[clap(long, default_value_t = false, help_heading = "Group Options")]
    pub pin: bool,

    /// Report verbosity {0=low, 1=per-rank info, 2=per-rank samples}
    #[clap(short = 'V', long, default_value_t = 0, help_heading = "Output Options")]
    pub verbosity: u8,

    /// Write results as JSON to this file
    #[clap(short = 'o', long, help_heading = "Output Options")]
    pub output_file: Option<PathBuf>,

    /// Also write diagnostic logs to this file
    #[clap(long, help_heading = "Output Options")]
    pub log_file: Option<PathBuf>,

    /// Only log errors to stderr
    #[clap(short = 'q', long, default_value_t = false, help_heading = "Output Options")]
    pub quiet: bool,

    /// Print version
    #[clap(short = 'v', long, action = clap::ArgAction::Version)]
    pub version: Option<bool>,
}

/// Available benchmark programs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum BenchmarkKind {
    /// Average latency of the selected operation
    #[default]
    #[clap(name = "avg-latency")]
    AvgLatency,

    /// Per-call latency distribution of the selected operation
    #[clap(name = "tail-latency")]
    TailLatency,

    /// Overlap of group synchronization with computation
    #[clap(name = "overlap")]
    Overlap,
}

impl BenchmarkKind {
    /// Signature line printed above every report.
    pub fn title(self) -> &'static str {
        match self {
            BenchmarkKind::AvgLatency => "Group sync avg latency test",
            BenchmarkKind::TailLatency => "Group sync tail-latency test",
            BenchmarkKind::Overlap => "Group sync overlap benchmark",
        }
    }

    pub fn default_iterations(self) -> usize {
        match self {
            BenchmarkKind::AvgLatency => crate::defaults::AVG_LATENCY_ITERATIONS,
            BenchmarkKind::TailLatency | BenchmarkKind::Overlap => {
                crate::defaults::TAIL_LATENCY_ITERATIONS
            }
        }
    }
}

impl std::fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchmarkKind::AvgLatency => write!(f, "Average Latency"),
            BenchmarkKind::TailLatency => write!(f, "Tail Latency"),
            BenchmarkKind::Overlap => write!(f, "Overlap"),
        }
    }
}

/// Amount of per-rank detail added to the report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verbosity {
    #[default]
    Low,
    /// One identity line per rank.
    RankInfo,
    /// Rank identities plus every rank's sorted samples, when kept.
    Samples,
}

impl TryFrom<u8> for Verbosity {
    type Error = BenchError;

    fn try_from(level: u8) -> Result<Self, BenchError> {
        match level {
            0 => Ok(Verbosity::Low),
            1 => Ok(Verbosity::RankInfo),
            2 => Ok(Verbosity::Samples),
            other => Err(BenchError::InvalidVerbosity(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["sync-bench"]);
        assert_eq!(args.benchmark, BenchmarkKind::AvgLatency);
        assert_eq!(args.operation, SyncOperation::SyncAll);
        assert_eq!(args.iterations, None);
        assert_eq!(args.skip, 200);
        assert_eq!(args.percentiles, vec![0.99, 0.95]);
        assert_eq!(args.verbosity, 0);
        assert_eq!(args.ranks, 2);
        assert!(!args.pin);
    }

    #[test]
    fn test_parse_tail_latency_options() {
        let args = Args::parse_from([
            "sync-bench",
            "tail-latency",
            "-f",
            "barrier-all",
            "-i",
            "500",
            "-s",
            "10",
            "-p",
            "0.5,0.9,0.999",
            "-V",
            "2",
            "-n",
            "4",
        ]);
        assert_eq!(args.benchmark, BenchmarkKind::TailLatency);
        assert_eq!(args.operation, SyncOperation::BarrierAll);
        assert_eq!(args.iterations, Some(500));
        assert_eq!(args.skip, 10);
        assert_eq!(args.percentiles, vec![0.5, 0.9, 0.999]);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.ranks, 4);
    }

    #[test]
    fn test_verbosity_and_version_flags_are_distinct() {
        let args = Args::try_parse_from(["sync-bench", "-V", "2"]).unwrap();
        assert_eq!(args.verbosity, 2);
        let args = Args::try_parse_from(["sync-bench", "--verbosity", "1"]).unwrap();
        assert_eq!(args.verbosity, 1);

        let version = Args::try_parse_from(["sync-bench", "-v"]).unwrap_err();
        assert_eq!(version.kind(), clap::error::ErrorKind::DisplayVersion);
        let version = Args::try_parse_from(["sync-bench", "--version"]).unwrap_err();
        assert_eq!(version.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_command_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_negative_skip_is_rejected() {
        assert!(Args::try_parse_from(["sync-bench", "-s", "-1"]).is_err());
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        assert!(Args::try_parse_from(["sync-bench", "-f", "sol"]).is_err());
    }

    #[test]
    fn test_benchmark_kind_display() {
        assert_eq!(BenchmarkKind::AvgLatency.to_string(), "Average Latency");
        assert_eq!(BenchmarkKind::TailLatency.to_string(), "Tail Latency");
        assert_eq!(BenchmarkKind::Overlap.to_string(), "Overlap");
    }

    #[test]
    fn test_default_iterations_per_kind() {
        assert_eq!(BenchmarkKind::AvgLatency.default_iterations(), 10_000);
        assert_eq!(BenchmarkKind::TailLatency.default_iterations(), 100_000);
        assert_eq!(BenchmarkKind::Overlap.default_iterations(), 100_000);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::try_from(0).unwrap(), Verbosity::Low);
        assert_eq!(Verbosity::try_from(1).unwrap(), Verbosity::RankInfo);
        assert_eq!(Verbosity::try_from(2).unwrap(), Verbosity::Samples);
        assert!(matches!(
            Verbosity::try_from(3),
            Err(BenchError::InvalidVerbosity(3))
        ));
        assert!(Verbosity::Samples > Verbosity::RankInfo);
    }
}
