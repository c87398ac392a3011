//! `EndpointState`: heartbeat + application-state map + liveness (C2, §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::app_state::{is_dead_status, StateEntry, StateKey};
use super::heartbeat::HeartbeatState;

/// Heartbeat, application-state map, liveness flag and last-touched
/// timestamp for one endpoint.
///
/// This is a pure data/mutation value — it holds no reference to the
/// event bus or the gossiper. Higher layers (`gossip::merge`) decide when
/// and what to notify; `EndpointState` only guarantees its own invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointState {
    pub heartbeat: HeartbeatState,
    pub entries: HashMap<StateKey, StateEntry>,
    pub is_alive: bool,
    /// Monotonic-clock nanoseconds of the last mutation.
    pub updated_at_nanos: u64,
}

impl EndpointState {
    pub fn new(generation: i64, now_nanos: u64) -> Self {
        Self {
            heartbeat: HeartbeatState::new(generation),
            entries: HashMap::new(),
            is_alive: false,
            updated_at_nanos: now_nanos,
        }
    }

    /// `max_version = max(heartbeat.version, max over entries of
    /// entry.version)` (§3 invariant).
    pub fn max_version(&self) -> u32 {
        self.entries
            .values()
            .map(|e| e.version)
            .fold(self.heartbeat.version, u32::max)
    }

    /// Insert/overwrite an entry and bump the touch timestamp. Does not
    /// itself decide version ordering — callers (`local_update`, merge)
    /// are responsible for only calling this with a version that should
    /// win.
    pub fn put_entry(&mut self, entry: StateEntry, now_nanos: u64) {
        self.entries.insert(entry.key, entry);
        self.updated_at_nanos = now_nanos;
    }

    pub fn get(&self, key: StateKey) -> Option<&StateEntry> {
        self.entries.get(&key)
    }

    /// A STATUS entry whose value begins with a dead token marks the
    /// endpoint dead irrespective of `is_alive` (§3).
    pub fn is_dead_by_status(&self) -> bool {
        self.get(StateKey::Status)
            .map(|e| is_dead_status(&e.value))
            .unwrap_or(false)
    }

    pub fn touch(&mut self, now_nanos: u64) {
        self.updated_at_nanos = now_nanos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_version_tracks_heartbeat_and_entries() {
        let mut state = EndpointState::new(1, 0);
        state.heartbeat.version = 3;
        assert_eq!(state.max_version(), 3);

        state.put_entry(StateEntry::new(StateKey::Load, "0.5", 7), 10);
        assert_eq!(state.max_version(), 7);
    }

    #[test]
    fn dead_status_detected() {
        let mut state = EndpointState::new(1, 0);
        assert!(!state.is_dead_by_status());
        state.put_entry(StateEntry::new(StateKey::Status, "LEFT,123", 1), 0);
        assert!(state.is_dead_by_status());
    }
}
