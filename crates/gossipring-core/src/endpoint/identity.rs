//! Endpoint identity (C1).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// A stable identifier for a cluster node: address + listening port, plus
/// an optional host-id that survives address changes.
///
/// Two endpoints compare equal iff their `addr` matches — `host_id` is
/// carried metadata, not part of identity, since the whole point of a
/// host-id is to outlive an address change for the *same* endpoint value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Endpoint {
    /// Network address and listening port.
    pub addr: SocketAddr,

    /// Opaque host identifier (UUID), set once and stable across restarts
    /// that reuse the same address.
    pub host_id: Option<uuid::Uuid>,
}

impl Endpoint {
    /// Create a new endpoint identity with no host-id.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, host_id: None }
    }

    /// Attach a host-id.
    pub fn with_host_id(mut self, host_id: uuid::Uuid) -> Self {
        self.host_id = Some(host_id);
        self
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Endpoint {}

impl std::hash::Hash for Endpoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_host_id() {
        let addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let a = Endpoint::new(addr).with_host_id(uuid::Uuid::new_v4());
        let b = Endpoint::new(addr).with_host_id(uuid::Uuid::new_v4());
        assert_eq!(a, b);
    }

    #[test]
    fn different_addr_not_equal() {
        let a = Endpoint::new("127.0.0.1:7000".parse().unwrap());
        let b = Endpoint::new("127.0.0.1:7001".parse().unwrap());
        assert_ne!(a, b);
    }
}
