//! Monotonic microsecond timestamps.
//!
//! Latency samples are taken from the system monotonic clock and truncated to
//! whole microseconds, which is the resolution every report is expressed in.
//! A clock that cannot be read leaves no meaningful way to continue a latency
//! benchmark, so [`Timer::now`] aborts the process instead of returning an
//! error.

/// A point on the monotonic clock, in whole microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    micros: i64,
}

impl Timestamp {
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub fn as_micros(&self) -> i64 {
        self.micros
    }
}

/// Zero-sized handle over the clock source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer;

impl Timer {
    /// Sample the monotonic clock.
    ///
    /// Aborts the process if the clock source is unavailable.
    #[cfg(unix)]
    pub fn now() -> Timestamp {
        use nix::time::{clock_gettime, ClockId};
        use tracing::error;

        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => {
                let micros = (ts.tv_sec() as i64) * 1_000_000 + (ts.tv_nsec() as i64) / 1_000;
                Timestamp::from_micros(micros)
            }
            Err(e) => {
                error!("Monotonic clock unavailable: {}", e);
                std::process::abort();
            }
        }
    }

    /// Sample the monotonic clock.
    #[cfg(not(unix))]
    pub fn now() -> Timestamp {
        use std::sync::OnceLock;
        use std::time::Instant;

        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let origin = *ORIGIN.get_or_init(Instant::now);
        Timestamp::from_micros(origin.elapsed().as_micros() as i64)
    }

    /// Elapsed microseconds between two timestamps, never negative.
    pub fn elapsed_us(start: Timestamp, end: Timestamp) -> f64 {
        (end.micros - start.micros).max(0) as f64
    }
}
