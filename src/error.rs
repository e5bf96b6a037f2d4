use thiserror::Error;

/// Failures of the process-group runtime.
///
/// Every one of these is fatal to the whole run: collectives have no
/// partial-failure path, so a single failed rank takes the group down.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Another rank failed while this rank was blocked in a collective.
    #[error("process group aborted while rank {rank} was inside a collective call")]
    Aborted { rank: usize },

    /// A split-phase synchronization was posted while another was still
    /// outstanding on the same rank.
    #[error("rank {rank} posted a synchronization while a previous one is still pending")]
    SyncInProgress { rank: usize },

    /// A rank's body panicked instead of returning.
    #[error("rank {rank} panicked")]
    RankPanicked { rank: usize },

    /// The runtime could not start a rank.
    #[error("failed to spawn rank {rank}: {source}")]
    Spawn {
        rank: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the benchmark core.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("iteration count must be at least 1 (got {0})")]
    InvalidIterations(usize),

    #[error("percentile {0} is outside [0, 1]")]
    InvalidPercentile(f64),

    #[error("at least one percentile must be requested")]
    NoPercentiles,

    #[error("too many percentiles requested ({count}, maximum is {max})")]
    TooManyPercentiles { count: usize, max: usize },

    #[error("verbosity level must be 0, 1 or 2 (got {0})")]
    InvalidVerbosity(u8),

    #[error("maximum workload size must be at least 1 (got {0})")]
    InvalidWorkload(usize),

    #[error("group size must be at least 1 (got {0})")]
    InvalidGroupSize(usize),

    #[error("failed to allocate a buffer for {requested} latency samples")]
    Allocation { requested: usize },

    #[error("cannot extract a percentile from an empty sample sequence")]
    EmptySamples,

    #[error(transparent)]
    Group(#[from] GroupError),
}

pub type BenchResult<T> = std::result::Result<T, BenchError>;
