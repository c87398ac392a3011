//! Locally observed endpoint lifecycle (supplemented feature, see
//! SPEC_FULL.md; grounded on the teacher's `node::state::NodeStateMachine`).
//!
//! This is bookkeeping for the *locally observed* progression implied by
//! the STATUS dead-tokens rule (§3) and the join/dead/remove transitions
//! the gossiper drives (§4.3.3, §4.3.4) — not a wire concept. Driven from
//! `gossip::merge` (major state change, dead-status detection, eviction)
//! and from `Gossiper::mark_alive`/`mark_dead`; read via
//! `Gossiper::lifecycle_phase`.

use serde::{Deserialize, Serialize};

/// Locally observed lifecycle phase of a peer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Known only from a digest; no full state applied yet.
    Unknown,
    /// First full state applied (`on_join` fired, not yet echoed alive).
    Joining,
    /// Alive and participating normally.
    Normal,
    /// Marked dead by the failure detector or a dead STATUS token.
    Dead,
    /// Gracefully leaving (STATUS `LEAVING`).
    Leaving,
    /// Gracefully left (STATUS `LEFT`), pending eviction.
    Left,
}

/// A single observed transition, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
    pub at_nanos: u64,
}

/// Bounded transition history plus current phase for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleMachine {
    current: LifecyclePhase,
    history: Vec<LifecycleTransition>,
    max_history: usize,
}

impl LifecycleMachine {
    pub fn new() -> Self {
        Self {
            current: LifecyclePhase::Unknown,
            history: Vec::new(),
            max_history: 32,
        }
    }

    pub fn current(&self) -> LifecyclePhase {
        self.current
    }

    /// Attempt a transition; returns `false` and leaves state unchanged
    /// if the transition is not in the valid-transition table.
    pub fn transition(&mut self, to: LifecyclePhase, at_nanos: u64) -> bool {
        if !self.can_transition(to) {
            return false;
        }
        self.history.push(LifecycleTransition {
            from: self.current,
            to,
            at_nanos,
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
        self.current = to;
        true
    }

    fn can_transition(&self, to: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        match (self.current, to) {
            (a, b) if a as u8 == b as u8 => true,
            (Unknown, Joining) => true,
            (Joining, Normal) => true,
            (Normal, Dead) => true,
            (Normal, Leaving) => true,
            (Leaving, Left) => true,
            (Dead, Normal) => true, // recovered after conviction, e.g. flapping repair
            (Dead, Joining) => true, // restarted with a new generation
            _ => false,
        }
    }

    pub fn history(&self) -> &[LifecycleTransition] {
        &self.history
    }
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_join_to_dead_path() {
        let mut m = LifecycleMachine::new();
        assert!(m.transition(LifecyclePhase::Joining, 0));
        assert!(m.transition(LifecyclePhase::Normal, 1));
        assert!(m.transition(LifecyclePhase::Dead, 2));
        assert_eq!(m.current(), LifecyclePhase::Dead);
        assert!(!m.transition(LifecyclePhase::Leaving, 3));
    }
}
