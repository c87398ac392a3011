//! Replication strategy (C7, §4.6).

pub mod local;
pub mod network_topology;

pub use local::LocalStrategy;
pub use network_topology::NetworkTopologyStrategy;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::topology::TopologyMetaData;

/// Shared contract for replica-set placement (§4.6).
pub trait ReplicationStrategy: Send + Sync {
    /// Compute the ordered replica set for one token.
    ///
    /// `candidates` is the ordered pool of live endpoints to consider
    /// (already in sorted-host-id order for network-topology placement);
    /// `old_replicas` are replicas to preserve when `include_old` is set,
    /// topping up from the remaining candidates.
    fn calculate_replicas(
        &self,
        metadata: &TopologyMetaData,
        old_replicas: &[Endpoint],
        candidates: &[Endpoint],
        include_old: bool,
    ) -> Result<Vec<Endpoint>>;
}
