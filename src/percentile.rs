//! Nearest-rank percentile extraction over locally collected samples.
//!
//! A [`SampleSequence`] is filled during measurement and then consumed by
//! [`SampleSequence::into_sorted`], which yields a read-only
//! [`SortedSamples`]. Percentiles use the nearest-rank definition without
//! interpolation: index `floor(len * fraction)`, clamped to the last element.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};

/// Maximum number of percentiles a single run may request.
pub const MAX_PERCENTILES: usize = 49;

/// A requested percentile as a fraction in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct PercentileSpec(f64);

impl PercentileSpec {
    pub fn fraction(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for PercentileSpec {
    type Error = BenchError;

    fn try_from(fraction: f64) -> BenchResult<Self> {
        if (0.0..=1.0).contains(&fraction) {
            Ok(Self(fraction))
        } else {
            Err(BenchError::InvalidPercentile(fraction))
        }
    }
}

impl From<PercentileSpec> for f64 {
    fn from(spec: PercentileSpec) -> f64 {
        spec.0
    }
}

impl std::fmt::Display for PercentileSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

/// Validate a requested percentile list, preserving request order.
pub fn validate_percentiles(fractions: &[f64]) -> BenchResult<Vec<PercentileSpec>> {
    if fractions.is_empty() {
        return Err(BenchError::NoPercentiles);
    }
    if fractions.len() > MAX_PERCENTILES {
        return Err(BenchError::TooManyPercentiles {
            count: fractions.len(),
            max: MAX_PERCENTILES,
        });
    }
    fractions
        .iter()
        .map(|&fraction| PercentileSpec::try_from(fraction))
        .collect()
}

/// Index of the nearest-rank percentile in a sorted sequence of `len` samples.
pub fn percentile_index(len: usize, fraction: f64) -> usize {
    debug_assert!(len > 0);
    let index = (len as f64 * fraction) as usize;
    index.min(len - 1)
}

/// Per-iteration latencies collected by one rank, in collection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSequence {
    samples: Vec<f64>,
}

impl SampleSequence {
    /// Reserve room for exactly `capacity` samples up front.
    ///
    /// Allocation failure is reported instead of aborting, so the caller can
    /// fail before entering any collective call.
    pub fn with_capacity(capacity: usize) -> BenchResult<Self> {
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(capacity)
            .map_err(|_| BenchError::Allocation {
                requested: capacity,
            })?;
        Ok(Self { samples })
    }

    pub fn push(&mut self, latency_us: f64) {
        self.samples.push(latency_us);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    /// Sort ascending in place and freeze the sequence.
    pub fn into_sorted(mut self) -> BenchResult<SortedSamples> {
        if self.samples.is_empty() {
            return Err(BenchError::EmptySamples);
        }
        self.samples.sort_unstable_by(f64::total_cmp);
        Ok(SortedSamples {
            samples: self.samples,
        })
    }
}

impl From<Vec<f64>> for SampleSequence {
    fn from(samples: Vec<f64>) -> Self {
        Self { samples }
    }
}

/// A non-empty, ascending, read-only sample sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedSamples {
    samples: Vec<f64>,
}

impl SortedSamples {
    pub fn percentile(&self, spec: PercentileSpec) -> f64 {
        self.samples[percentile_index(self.samples.len(), spec.fraction())]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.samples
    }
}
