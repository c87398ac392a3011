//! `LocalStrategy`: single-node replication, ignores all options (§4.6).

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::topology::TopologyMetaData;

use super::ReplicationStrategy;

pub struct LocalStrategy {
    local_endpoint: Endpoint,
}

impl LocalStrategy {
    pub fn new(local_endpoint: Endpoint) -> Self {
        Self { local_endpoint }
    }
}

impl ReplicationStrategy for LocalStrategy {
    fn calculate_replicas(
        &self,
        _metadata: &TopologyMetaData,
        _old_replicas: &[Endpoint],
        _candidates: &[Endpoint],
        _include_old: bool,
    ) -> Result<Vec<Endpoint>> {
        Ok(vec![self.local_endpoint])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn always_returns_local_endpoint_only() {
        let local = Endpoint::new("127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        let strategy = LocalStrategy::new(local);
        let topo = TopologyMetaData::new();
        let candidates = vec![Endpoint::new("127.0.0.1:7001".parse::<SocketAddr>().unwrap())];
        let replicas = strategy
            .calculate_replicas(&topo, &[], &candidates, false)
            .unwrap();
        assert_eq!(replicas, vec![local]);
    }
}
