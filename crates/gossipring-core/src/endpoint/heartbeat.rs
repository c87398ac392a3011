//! Heartbeat state and the process-wide version counter (C2, §4.1, §9).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// `(generation, version)` pair.
///
/// `generation` is set once per process lifetime (typically wall-clock
/// seconds at startup) and strictly increases across restarts of the same
/// endpoint. `version` increases monotonically on every local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatState {
    pub generation: i64,
    pub version: u32,
}

impl HeartbeatState {
    pub fn new(generation: i64) -> Self {
        Self {
            generation,
            version: 0,
        }
    }
}

/// Process-wide monotonic version counter: 32-bit, never reused, never
/// decreases. Design note §9 turns the source's process-wide `static`
/// into an explicit context object owned by the composition root and
/// shared (by `Arc`) with every `EndpointState` that needs to mint a
/// version for a local mutation.
#[derive(Debug, Default)]
pub struct VersionGenerator {
    counter: AtomicU32,
}

impl VersionGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mint a new version number, raising it at least one past `floor` —
    /// the §4.1 rule that guards against races with a remote update that
    /// already landed locally before subscriber notifications complete.
    pub fn next(&self, floor: u32) -> u32 {
        loop {
            let current = self.counter.load(Ordering::SeqCst);
            let candidate = current.wrapping_add(1).max(floor.wrapping_add(1));
            if self
                .counter
                .compare_exchange(current, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate;
            }
        }
    }

    /// Bump the counter without a floor requirement (`heartbeat_tick`).
    pub fn tick(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_always_exceeds_floor() {
        let gen = VersionGenerator::new();
        let v1 = gen.next(0);
        assert!(v1 > 0);
        let v2 = gen.next(v1 + 50);
        assert!(v2 > v1 + 50);
    }

    #[test]
    fn tick_monotonic() {
        let gen = VersionGenerator::new();
        let a = gen.tick();
        let b = gen.tick();
        assert!(b > a);
    }
}
