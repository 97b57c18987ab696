//! Minimum interval gate for transcript rewrites
//!
//! The gate never blocks or delays an event. When a transcript arrives before
//! the interval has elapsed it is forwarded untouched and the timestamp is left
//! alone. One `Throttle` shared by every connection couples them: a rewrite on
//! one connection suppresses rewrites on all others for the interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sentinel for "nothing processed yet"
const NEVER: u64 = u64::MAX;

/// How widely one throttle timestamp is shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ThrottleScope {
    /// One timestamp for the whole process
    #[default]
    Global,
    /// One timestamp per client connection
    Connection,
}

impl std::fmt::Display for ThrottleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrottleScope::Global => write!(f, "global"),
            ThrottleScope::Connection => write!(f, "connection"),
        }
    }
}

/// Last-processed timestamp on a monotonic clock, updated with compare-and-swap
#[derive(Debug)]
pub struct Throttle {
    interval_ms: u64,
    epoch: Instant,
    last_ms: AtomicU64,
}

impl Throttle {
    /// `None` when the interval is zero (throttling disabled)
    pub fn new(interval: Duration) -> Option<Self> {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        if interval_ms == 0 {
            return None;
        }
        Some(Self {
            interval_ms,
            epoch: Instant::now(),
            last_ms: AtomicU64::new(NEVER),
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Claim the slot for one rewrite. Returns false if the previous claim is
    /// less than one interval old.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(self.now_ms())
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(NEVER - 1)
    }

    fn try_acquire_at(&self, now_ms: u64) -> bool {
        let mut last = self.last_ms.load(Ordering::Acquire);
        loop {
            if last != NEVER && now_ms.saturating_sub(last) < self.interval_ms {
                return false;
            }
            match self
                .last_ms
                .compare_exchange_weak(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }
}
