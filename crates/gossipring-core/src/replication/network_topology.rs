//! `NetworkTopologyStrategy`: rack-aware, multi-datacenter placement
//! (§4.6, scenario tests 2 & 3).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::endpoint::Endpoint;
use crate::error::{GossipError, Result};
use crate::topology::TopologyMetaData;

use super::ReplicationStrategy;

/// The literal option key the original rejects when passed to
/// network-topology placement — it only makes sense for a strategy with
/// a single, cluster-wide replication factor (§7.3).
const REJECTED_OPTION_KEY: &str = "replication_factor";

pub struct NetworkTopologyStrategy {
    dc_rf: Vec<(String, usize)>,
}

impl NetworkTopologyStrategy {
    pub fn new(dc_rf: Vec<(String, usize)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (dc, _) in &dc_rf {
            if dc == REJECTED_OPTION_KEY {
                return Err(GossipError::InvalidConfiguration(format!(
                    "'{REJECTED_OPTION_KEY}' is not a valid datacenter name for network-topology placement"
                )));
            }
            if !seen.insert(dc.clone()) {
                return Err(GossipError::InvalidConfiguration(format!(
                    "duplicated datacenter '{dc}' in replication options"
                )));
            }
        }
        Ok(Self { dc_rf })
    }

    pub fn total_replication_factor(&self) -> usize {
        self.dc_rf.iter().map(|(_, rf)| rf).sum()
    }

    fn place(
        &self,
        metadata: &TopologyMetaData,
        candidates: &[Endpoint],
        already_accepted: &mut HashSet<Endpoint>,
        accepted: &mut Vec<Endpoint>,
    ) {
        let rf_by_dc: HashMap<&str, usize> = self
            .dc_rf
            .iter()
            .map(|(dc, rf)| (dc.as_str(), *rf))
            .collect();

        let total_racks: HashMap<String, usize> = self
            .dc_rf
            .iter()
            .map(|(dc, _)| (dc.clone(), metadata.racks_in(dc).len()))
            .collect();

        let mut seen_racks: HashMap<String, HashSet<String>> = HashMap::new();
        let mut skipped: HashMap<String, VecDeque<Endpoint>> = HashMap::new();
        let mut accepted_per_dc: HashMap<String, usize> = HashMap::new();

        let dc_satisfied = |dc: &str, accepted_per_dc: &HashMap<String, usize>| -> bool {
            let rf = rf_by_dc.get(dc).copied().unwrap_or(0);
            let live_in_dc = metadata.endpoints_in(dc).len();
            let count = accepted_per_dc.get(dc).copied().unwrap_or(0);
            count >= rf.min(live_in_dc)
        };

        let all_satisfied = |accepted_per_dc: &HashMap<String, usize>| {
            rf_by_dc.keys().all(|dc| dc_satisfied(dc, accepted_per_dc))
        };

        for endpoint in candidates {
            if all_satisfied(&accepted_per_dc) {
                break;
            }
            if already_accepted.contains(endpoint) {
                continue;
            }
            let Some(dc) = metadata.datacenter_of(endpoint) else {
                continue;
            };
            if !rf_by_dc.contains_key(dc.as_str()) {
                continue;
            }
            if dc_satisfied(&dc, &accepted_per_dc) {
                continue;
            }
            let Some(rack) = metadata.rack_of(endpoint) else {
                continue;
            };

            let racks_seen = seen_racks.entry(dc.clone()).or_default();
            let rack_total = total_racks.get(&dc).copied().unwrap_or(0);
            let all_racks_seen_before = racks_seen.len() >= rack_total && rack_total > 0;

            let accept_now = all_racks_seen_before || !racks_seen.contains(&rack);

            if accept_now {
                racks_seen.insert(rack);
                already_accepted.insert(*endpoint);
                accepted.push(*endpoint);
                *accepted_per_dc.entry(dc.clone()).or_insert(0) += 1;

                // Draining only matters the moment the rack set first
                // becomes complete; subsequent accepts are already
                // "unconditional" via `all_racks_seen_before`.
                if racks_seen.len() >= rack_total && rack_total > 0 {
                    if let Some(queue) = skipped.get_mut(&dc) {
                        while !dc_satisfied(&dc, &accepted_per_dc) {
                            let Some(candidate) = queue.pop_front() else {
                                break;
                            };
                            if already_accepted.contains(&candidate) {
                                continue;
                            }
                            already_accepted.insert(candidate);
                            accepted.push(candidate);
                            *accepted_per_dc.entry(dc.clone()).or_insert(0) += 1;
                        }
                    }
                }
            } else {
                skipped.entry(dc.clone()).or_default().push_back(*endpoint);
            }
        }
    }
}

impl ReplicationStrategy for NetworkTopologyStrategy {
    fn calculate_replicas(
        &self,
        metadata: &TopologyMetaData,
        old_replicas: &[Endpoint],
        candidates: &[Endpoint],
        include_old: bool,
    ) -> Result<Vec<Endpoint>> {
        let mut already_accepted: HashSet<Endpoint> = HashSet::new();
        let mut accepted = Vec::new();

        if include_old {
            for endpoint in old_replicas {
                if already_accepted.insert(*endpoint) {
                    accepted.push(*endpoint);
                }
            }
        }

        let fresh: Vec<Endpoint> = candidates
            .iter()
            .filter(|e| !old_replicas.contains(e))
            .copied()
            .collect();

        self.place(metadata, &fresh, &mut already_accepted, &mut accepted);

        if accepted.len() < self.total_replication_factor() && !old_replicas.is_empty() {
            let remaining: Vec<Endpoint> = old_replicas
                .iter()
                .filter(|e| !already_accepted.contains(e))
                .copied()
                .collect();
            self.place(metadata, &remaining, &mut already_accepted, &mut accepted);
        }

        Ok(accepted)
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
    fn rejects_replication_factor_key() {
        let result = NetworkTopologyStrategy::new(vec![("replication_factor".to_string(), 3)]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_dc() {
        let result = NetworkTopologyStrategy::new(vec![
            ("east".to_string(), 3),
            ("east".to_string(), 2),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn single_rack_placement() {
        let topo = TopologyMetaData::new();
        let n1 = ep(1);
        let n2 = ep(2);
        let n3 = ep(3);
        topo.update_location(n1, "east", "r1");
        topo.update_location(n2, "east", "r2");
        topo.update_location(n3, "east", "r3");

        let strategy = NetworkTopologyStrategy::new(vec![("east".to_string(), 3)]).unwrap();
        let candidates = vec![n1, n2, n3];
        let replicas = strategy
            .calculate_replicas(&topo, &[], &candidates, false)
            .unwrap();
        assert_eq!(replicas, vec![n1, n2, n3]);
    }

    #[test]
    fn rack_exhaustion_drains_skipped_queue() {
        let topo = TopologyMetaData::new();
        let n1 = ep(1);
        let n2 = ep(2);
        let n3 = ep(3);
        let n4 = ep(4);
        topo.update_location(n1, "east", "r1");
        topo.update_location(n2, "east", "r1");
        topo.update_location(n3, "east", "r1");
        topo.update_location(n4, "east", "r2");

        let strategy = NetworkTopologyStrategy::new(vec![("east".to_string(), 3)]).unwrap();
        let candidates = vec![n1, n2, n3, n4];
        let replicas = strategy
            .calculate_replicas(&topo, &[], &candidates, false)
            .unwrap();
        assert_eq!(replicas, vec![n1, n4, n2]);
    }

    #[test]
    fn best_effort_subset_is_not_an_error() {
        let topo = TopologyMetaData::new();
        let n1 = ep(1);
        topo.update_location(n1, "east", "r1");

        let strategy = NetworkTopologyStrategy::new(vec![("east".to_string(), 3)]).unwrap();
        let replicas = strategy
            .calculate_replicas(&topo, &[], &[n1], false)
            .unwrap();
        assert_eq!(replicas, vec![n1]);
    }

    #[test]
    fn never_duplicates_and_respects_rf() {
        let topo = TopologyMetaData::new();
        let n1 = ep(1);
        let n2 = ep(2);
        topo.update_location(n1, "east", "r1");
        topo.update_location(n2, "east", "r1");

        let strategy = NetworkTopologyStrategy::new(vec![("east".to_string(), 1)]).unwrap();
        let replicas = strategy
            .calculate_replicas(&topo, &[], &[n1, n2], false)
            .unwrap();
        assert_eq!(replicas, vec![n1]);
    }
}
