//! Topology metadata (C5, §4.4).

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::endpoint::Endpoint;

/// `(datacenter, rack)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DcRack {
    pub datacenter: String,
    pub rack: String,
}

#[derive(Default)]
struct Inner {
    location: HashMap<Endpoint, DcRack>,
    by_host_id: HashMap<Uuid, Endpoint>,
    dc_index: HashMap<String, HashSet<Endpoint>>,
    rack_index: HashMap<(String, String), HashSet<Endpoint>>,
}

/// Cluster-wide `endpoint -> (dc, rack)` map with derived indexes,
/// mutated by subscribers to the failure-event bus (join/remove) and read
/// by the Gossiper only against a stable snapshot (§4.4).
///
/// Reads and writes share a single `RwLock` rather than a lock-free map:
/// topology changes are rare (membership churn) relative to the snitch's
/// and replication strategy's read volume, so a reader-preferring lock is
/// the right trade here, unlike the endpoint-state map (§5).
pub struct TopologyMetaData {
    inner: RwLock<Inner>,
}

impl TopologyMetaData {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Record or update `endpoint`'s location (on join, or on a DC/RACK
    /// application-state change).
    pub fn update_location(&self, endpoint: Endpoint, datacenter: impl Into<String>, rack: impl Into<String>) {
        let dc = datacenter.into();
        let rack = rack.into();
        let mut inner = self.inner.write();

        if let Some(old) = inner.location.get(&endpoint).cloned() {
            if let Some(set) = inner.dc_index.get_mut(&old.datacenter) {
                set.remove(&endpoint);
            }
            if let Some(set) = inner.rack_index.get_mut(&(old.datacenter.clone(), old.rack.clone())) {
                set.remove(&endpoint);
            }
        }

        inner
            .dc_index
            .entry(dc.clone())
            .or_default()
            .insert(endpoint);
        inner
            .rack_index
            .entry((dc.clone(), rack.clone()))
            .or_default()
            .insert(endpoint);
        inner.location.insert(endpoint, DcRack { datacenter: dc, rack });
    }

    pub fn update_host_id(&self, host_id: Uuid, endpoint: Endpoint) {
        self.inner.write().by_host_id.insert(host_id, endpoint);
    }

    /// Remove an endpoint from all indexes (on_remove, eviction).
    pub fn remove(&self, endpoint: &Endpoint) {
        let mut inner = self.inner.write();
        if let Some(loc) = inner.location.remove(endpoint) {
            if let Some(set) = inner.dc_index.get_mut(&loc.datacenter) {
                set.remove(endpoint);
            }
            if let Some(set) = inner.rack_index.get_mut(&(loc.datacenter, loc.rack)) {
                set.remove(endpoint);
            }
        }
        inner.by_host_id.retain(|_, e| e != endpoint);
    }

    pub fn datacenter_of(&self, endpoint: &Endpoint) -> Option<String> {
        self.inner.read().location.get(endpoint).map(|l| l.datacenter.clone())
    }

    pub fn rack_of(&self, endpoint: &Endpoint) -> Option<String> {
        self.inner.read().location.get(endpoint).map(|l| l.rack.clone())
    }

    pub fn endpoints_in(&self, datacenter: &str) -> Vec<Endpoint> {
        self.inner
            .read()
            .dc_index
            .get(datacenter)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn racks_in(&self, datacenter: &str) -> HashSet<String> {
        self.inner
            .read()
            .rack_index
            .keys()
            .filter(|(dc, _)| dc == datacenter)
            .map(|(_, rack)| rack.clone())
            .collect()
    }

    pub fn is_member(&self, endpoint: &Endpoint) -> bool {
        self.inner.read().location.contains_key(endpoint)
    }

    pub fn endpoint_by_host_id(&self, host_id: &Uuid) -> Option<Endpoint> {
        self.inner.read().by_host_id.get(host_id).copied()
    }

    /// All known host-ids, sorted ascending (§4.6 replica placement walks
    /// this order).
    pub fn sorted_host_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.inner.read().by_host_id.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for TopologyMetaData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap())
    }

    #[test]
    fn tracks_dc_and_rack_indexes() {
        let topo = TopologyMetaData::new();
        topo.update_location(ep(1), "east", "r1");
        topo.update_location(ep(2), "east", "r2");
        topo.update_location(ep(3), "west", "r1");

        assert_eq!(topo.datacenter_of(&ep(1)), Some("east".to_string()));
        assert_eq!(topo.endpoints_in("east").len(), 2);
        assert_eq!(topo.racks_in("east").len(), 2);
        assert!(topo.is_member(&ep(3)));
    }

    #[test]
    fn remove_clears_all_indexes() {
        let topo = TopologyMetaData::new();
        topo.update_location(ep(1), "east", "r1");
        topo.remove(&ep(1));
        assert!(!topo.is_member(&ep(1)));
        assert_eq!(topo.endpoints_in("east").len(), 0);
    }

    #[test]
    fn sorted_host_ids_is_ascending() {
        let topo = TopologyMetaData::new();
        let a = Uuid::from_u128(3);
        let b = Uuid::from_u128(1);
        topo.update_host_id(a, ep(1));
        topo.update_host_id(b, ep(2));
        assert_eq!(topo.sorted_host_ids(), vec![b, a]);
    }
}
