//! Quarantine set (§4.3.4, §5, scenario test 6).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::endpoint::Endpoint;

/// Evicted endpoints and the time they were evicted. Mutated only under
/// the Gossiper's tick mutex (§5) — a plain `Mutex` is enough, there's no
/// read-heavy path that needs a concurrent map here.
#[derive(Default)]
pub struct QuarantineSet {
    evicted_at: Mutex<HashMap<Endpoint, u64>>,
}

impl QuarantineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quarantine(&self, endpoint: Endpoint, now_nanos: u64) {
        self.evicted_at.lock().insert(endpoint, now_nanos);
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.evicted_at.lock().contains_key(endpoint)
    }

    /// Drop entries older than `quarantine_delay_nanos` (§4.3.4).
    pub fn purge(&self, now_nanos: u64, quarantine_delay_nanos: u64) {
        self.evicted_at
            .lock()
            .retain(|_, evicted_at| now_nanos.saturating_sub(*evicted_at) < quarantine_delay_nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn ep() -> Endpoint {
        Endpoint::new("127.0.0.1:7000".parse::<SocketAddr>().unwrap())
    }

    #[test]
    fn scenario_eviction_and_quarantine() {
        let set = QuarantineSet::new();
        let endpoint = ep();
        let t = 0u64;
        set.quarantine(endpoint, t);

        let quarantine_delay = 60_000_000_000u64; // 60s in nanos

        // T+15s: still quarantined.
        set.purge(15_000_000_000, quarantine_delay);
        assert!(set.contains(&endpoint));

        // T+61s: purged.
        set.purge(61_000_000_000, quarantine_delay);
        assert!(!set.contains(&endpoint));
    }
}
