//! Wait timeouts
//!
//! `select(2)` takes its timeout as whole seconds plus microseconds. A
//! [`Timeout`] holds exactly that decomposition, or no bound at all.

use nix::libc::{suseconds_t, time_t};
use nix::sys::time::TimeVal;

use std::time::Duration;

const MICROS_PER_SEC: u32 = 1_000_000;

/// Timeout for [`Multiplexer::wait`](super::Multiplexer::wait)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until a descriptor is ready or a signal interrupts the wait
    Infinite,
    /// Block for at most `secs` seconds plus `micros` microseconds
    After {
        /// Whole seconds
        secs: u64,
        /// Sub-second part, always below one second
        micros: u32,
    },
}

impl Timeout {
    /// Zero timeout: poll without blocking
    pub const ZERO: Timeout = Timeout::After { secs: 0, micros: 0 };

    /// Create a timeout from seconds and microseconds
    ///
    /// Microseconds above one second are carried into `secs`.
    pub fn new(secs: u64, micros: u32) -> Self {
        Timeout::After {
            secs: secs.saturating_add(u64::from(micros / MICROS_PER_SEC)),
            micros: micros % MICROS_PER_SEC,
        }
    }

    /// Check if this timeout never elapses
    pub fn is_infinite(&self) -> bool {
        matches!(self, Timeout::Infinite)
    }

    /// Convert to the `timeval` expected by `select(2)`
    ///
    /// Returns `None` for [`Timeout::Infinite`].
    pub(crate) fn to_timeval(self) -> Option<TimeVal> {
        match self {
            Timeout::Infinite => None,
            Timeout::After { secs, micros } => Some(TimeVal::new(
                time_t::try_from(secs).unwrap_or(time_t::MAX),
                suseconds_t::try_from(micros).unwrap_or(0),
            )),
        }
    }
}

impl From<Duration> for Timeout {
    /// Sub-microsecond remainders round up so a non-zero duration never
    /// degrades into a non-blocking poll.
    fn from(duration: Duration) -> Self {
        let micros = duration.subsec_nanos().div_ceil(1_000);
        Self::new(duration.as_secs(), micros)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Timeout::Infinite, Timeout::from)
    }
}
