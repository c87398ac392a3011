//! Gossip digests and the §4.3.1 four-case comparison table.

use serde::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, EndpointState};

/// `(endpoint, generation, max_version)` triple carried in a `SYN`/`ACK`
/// digest list (§6 wire form).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GossipDigest {
    pub endpoint: Endpoint,
    pub generation: i64,
    pub max_version: u32,
}

impl GossipDigest {
    pub fn new(endpoint: Endpoint, generation: i64, max_version: u32) -> Self {
        Self {
            endpoint,
            generation,
            max_version,
        }
    }

    pub fn request_all(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            generation: 0,
            max_version: 0,
        }
    }
}

/// Outcome of comparing a remote digest against local knowledge (§4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestDecision {
    /// Receiver has nothing, or remote generation is strictly newer:
    /// request everything.
    RequestAll,
    /// Equal generations, remote knows a newer version than we do:
    /// request only entries past our local max.
    RequestFrom(u32),
    /// Remote generation is older: send everything we have.
    SendAll,
    /// Equal generations, we know a newer version than remote: send
    /// only entries past the remote's claimed max.
    SendFrom(u32),
    /// Equal generation and version: nothing to exchange.
    Skip,
}

/// Compare `local` (our view of `digest.endpoint`, if any) against the
/// incoming digest and decide what to request/send.
pub fn compare(local: Option<&EndpointState>, digest: &GossipDigest) -> DigestDecision {
    let Some(local) = local else {
        return DigestDecision::RequestAll;
    };

    let local_generation = local.heartbeat.generation;
    let local_max_version = local.max_version();

    if digest.generation > local_generation {
        return DigestDecision::RequestAll;
    }
    if digest.generation < local_generation {
        return DigestDecision::SendAll;
    }

    if digest.max_version > local_max_version {
        DigestDecision::RequestFrom(local_max_version)
    } else if digest.max_version < local_max_version {
        DigestDecision::SendFrom(local_max_version)
    } else {
        DigestDecision::Skip
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
    fn absent_locally_requests_all() {
        let digest = GossipDigest::new(ep(), 5, 3);
        assert_eq!(compare(None, &digest), DigestDecision::RequestAll);
    }

    #[test]
    fn remote_newer_generation_requests_all() {
        let mut local = EndpointState::new(1, 0);
        local.heartbeat.version = 9;
        let digest = GossipDigest::new(ep(), 2, 0);
        assert_eq!(compare(Some(&local), &digest), DigestDecision::RequestAll);
    }

    #[test]
    fn remote_older_generation_sends_all() {
        let local = EndpointState::new(5, 0);
        let digest = GossipDigest::new(ep(), 2, 0);
        assert_eq!(compare(Some(&local), &digest), DigestDecision::SendAll);
    }

    #[test]
    fn equal_generation_remote_ahead_requests_from_local_max() {
        let mut local = EndpointState::new(1, 0);
        local.heartbeat.version = 3;
        let digest = GossipDigest::new(ep(), 1, 10);
        assert_eq!(
            compare(Some(&local), &digest),
            DigestDecision::RequestFrom(3)
        );
    }

    #[test]
    fn equal_generation_local_ahead_sends_from_remote_max() {
        let mut local = EndpointState::new(1, 0);
        local.heartbeat.version = 10;
        let digest = GossipDigest::new(ep(), 1, 3);
        assert_eq!(compare(Some(&local), &digest), DigestDecision::SendFrom(3));
    }

    #[test]
    fn equal_generation_equal_version_skips() {
        let mut local = EndpointState::new(1, 0);
        local.heartbeat.version = 7;
        let digest = GossipDigest::new(ep(), 1, 7);
        assert_eq!(compare(Some(&local), &digest), DigestDecision::Skip);
    }
}
