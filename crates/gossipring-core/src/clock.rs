//! A single monotonic clock abstraction used throughout the crate.
//!
//! §9's second open question notes the source mixes `nanoTime` (failure
//! detector arrivals) with `currentTimeMillis` (unreachable-since). This
//! re-implementation resolves that by routing every timestamp — arrival
//! intervals, unreachable-since, quarantine bookkeeping, score-map
//! timestamps — through one [`Clock`] trait, nanosecond resolution,
//! monotonic, with no relation to wall-clock time.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic nanosecond clock. Mockable for deterministic tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time, in nanoseconds, relative to an arbitrary epoch fixed
    /// at clock creation. Never decreases between calls.
    fn now_nanos(&self) -> u64;
}

/// Production clock backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Shared handle to a clock, passed by reference to every component that
/// needs time (design note §9: no global singletons).
pub type SharedClock = Arc<dyn Clock>;
