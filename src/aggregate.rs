//! Cross-rank reduction of scalar statistics.
//!
//! [`aggregate`] turns one local value per rank into a group-wide
//! [`StatTriple`] using three collective reductions, always in the order
//! min, max, sum. Every rank must call it the same number of times and in the
//! same order as its peers; callers needing several metrics call it once per
//! metric.

use crate::error::BenchResult;
use crate::group::{Collective, ReduceOp, ReduceScratch};
use serde::{Deserialize, Serialize};

/// Group-wide average, minimum and maximum of one per-rank statistic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatTriple {
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl StatTriple {
    /// The triple every rank would get if all of them reported `value`.
    pub fn uniform(value: f64) -> Self {
        Self {
            average: value,
            minimum: value,
            maximum: value,
        }
    }

    /// Combine reduced values into a triple.
    ///
    /// The mean is clamped into `[minimum, maximum]` so that summation
    /// rounding can never break `minimum <= average <= maximum`. A NaN in any
    /// input makes the whole triple NaN.
    pub fn from_reductions(minimum: f64, maximum: f64, sum: f64, group_size: usize) -> Self {
        let mean = sum / group_size as f64;
        if minimum.is_nan() || maximum.is_nan() || mean.is_nan() {
            return Self::uniform(f64::NAN);
        }
        Self {
            average: mean.clamp(minimum, maximum),
            minimum,
            maximum,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.average.is_nan() || self.minimum.is_nan() || self.maximum.is_nan()
    }
}

impl std::fmt::Display for StatTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} [{:.2}-{:.2}]",
            self.average, self.minimum, self.maximum
        )
    }
}

/// Group-wide minimum and maximum of per-rank extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub minimum: f64,
    pub maximum: f64,
}

impl std::fmt::Display for LatencyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.2}-{:.2}]", self.minimum, self.maximum)
    }
}

/// Reduce `local` across the group into a [`StatTriple`].
///
/// Issues exactly three reductions: min, max, sum.
pub fn aggregate<G>(group: &G, local: f64, scratch: &mut ReduceScratch) -> BenchResult<StatTriple>
where
    G: Collective + ?Sized,
{
    let minimum = group.reduce(ReduceOp::Min, local, scratch)?;
    let maximum = group.reduce(ReduceOp::Max, local, scratch)?;
    let sum = group.reduce(ReduceOp::Sum, local, scratch)?;
    Ok(StatTriple::from_reductions(minimum, maximum, sum, group.size()))
}

/// Reduce per-rank extremes into the group-wide range.
///
/// Issues exactly two reductions: min of `local_min`, then max of `local_max`.
pub fn aggregate_range<G>(
    group: &G,
    local_min: f64,
    local_max: f64,
    scratch: &mut ReduceScratch,
) -> BenchResult<LatencyRange>
where
    G: Collective + ?Sized,
{
    let minimum = group.reduce(ReduceOp::Min, local_min, scratch)?;
    let maximum = group.reduce(ReduceOp::Max, local_max, scratch)?;
    Ok(LatencyRange { minimum, maximum })
}
