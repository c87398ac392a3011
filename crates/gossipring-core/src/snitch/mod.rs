//! Proximity oracle (C6, §4.5).

pub mod dynamic;

use crate::endpoint::Endpoint;
use crate::topology::TopologyMetaData;

pub use dynamic::DynamicSnitch;

/// Static topology knowledge: answers `datacenter_of`/`rack_of` from
/// configuration, with no latency awareness. Corresponds to the "sub-
/// snitch" layer of §4.5 that the dynamic wrapper adapts.
pub trait Snitch: Send + Sync {
    fn datacenter_of(&self, endpoint: &Endpoint) -> Option<String>;
    fn rack_of(&self, endpoint: &Endpoint) -> Option<String>;

    /// Order `list` by static proximity to `from`. Default implementation
    /// leaves the list untouched (no topology preference) — concrete
    /// sub-snitches override this when they have a real ordering rule.
    fn sort_by_proximity(&self, _from: &Endpoint, list: &mut [Endpoint]) {
        let _ = list;
    }
}

/// A sub-snitch backed directly by `TopologyMetaData`: same-DC, same-rack
/// endpoints sort first (§4.5's "prefer local" rule), matching the
/// common `PropertyFileSnitch`/`GossipingPropertyFileSnitch` shape that
/// the dynamic wrapper decorates.
pub struct TopologySnitch {
    topology: std::sync::Arc<TopologyMetaData>,
}

impl TopologySnitch {
    pub fn new(topology: std::sync::Arc<TopologyMetaData>) -> Self {
        Self { topology }
    }

    fn proximity_rank(&self, from: &Endpoint, candidate: &Endpoint) -> u8 {
        let from_dc = self.topology.datacenter_of(from);
        let from_rack = self.topology.rack_of(from);
        let candidate_dc = self.topology.datacenter_of(candidate);
        let candidate_rack = self.topology.rack_of(candidate);

        if candidate == from {
            0
        } else if from_dc.is_some() && from_dc == candidate_dc && from_rack == candidate_rack {
            1
        } else if from_dc.is_some() && from_dc == candidate_dc {
            2
        } else {
            3
        }
    }
}

impl Snitch for TopologySnitch {
    fn datacenter_of(&self, endpoint: &Endpoint) -> Option<String> {
        self.topology.datacenter_of(endpoint)
    }

    fn rack_of(&self, endpoint: &Endpoint) -> Option<String> {
        self.topology.rack_of(endpoint)
    }

    fn sort_by_proximity(&self, from: &Endpoint, list: &mut [Endpoint]) {
        list.sort_by_key(|candidate| self.proximity_rank(from, candidate));
    }
}
