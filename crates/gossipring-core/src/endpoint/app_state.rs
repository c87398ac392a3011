//! Application-state entries (C2, §3, §6).

use serde::{Deserialize, Serialize};

/// Well-known application-state attribute names.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKey {
    Status = 0,
    Dc = 1,
    Rack = 2,
    Tokens = 3,
    HostId = 4,
    Load = 5,
    InternalIp = 6,
    NetVersion = 7,
    Severity = 8,
}

impl StateKey {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(StateKey::Status),
            1 => Some(StateKey::Dc),
            2 => Some(StateKey::Rack),
            3 => Some(StateKey::Tokens),
            4 => Some(StateKey::HostId),
            5 => Some(StateKey::Load),
            6 => Some(StateKey::InternalIp),
            7 => Some(StateKey::NetVersion),
            8 => Some(StateKey::Severity),
            _ => None,
        }
    }
}

/// STATUS tokens that mark an endpoint as dead irrespective of its
/// liveness flag (§3).
pub const DEAD_STATUS_TOKENS: &[&str] =
    &["REMOVING_TOKEN", "REMOVED_TOKEN", "LEFT", "HIBERNATE"];

/// Check whether a raw STATUS value names a dead state (prefix match, as
/// some STATUS values carry trailing payload, e.g. `LEFT,<expire_time>`).
pub fn is_dead_status(value: &str) -> bool {
    DEAD_STATUS_TOKENS
        .iter()
        .any(|token| value.starts_with(token))
}

/// A single versioned application-state entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: StateKey,
    pub value: String,
    pub version: u32,
}

impl StateEntry {
    pub fn new(key: StateKey, value: impl Into<String>, version: u32) -> Self {
        Self {
            key,
            value: value.into(),
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_status_prefix_match() {
        assert!(is_dead_status("LEFT,1700000000"));
        assert!(is_dead_status("HIBERNATE"));
        assert!(!is_dead_status("NORMAL"));
    }

    #[test]
    fn key_roundtrip() {
        for raw in 0..=8 {
            let key = StateKey::from_i32(raw).unwrap();
            assert_eq!(key as i32, raw);
        }
        assert!(StateKey::from_i32(99).is_none());
    }
}
