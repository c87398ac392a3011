//! The external message-transport boundary (§1 Non-goals; §6).
//!
//! A byte-oriented transport is named as an external collaborator, not
//! implemented here. This trait is the seam the Gossiper calls through;
//! a production binary wires a real network transport, tests wire the
//! in-memory one below.

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::gossip::wire::{Ack2Payload, AckPayload, SynPayload};

#[async_trait]
pub trait GossipTransport: Send + Sync {
    /// Send a `SYN` to `to` and await its `ACK` response.
    async fn send_syn(&self, to: Endpoint, payload: SynPayload) -> Result<AckPayload>;

    /// Send the concluding `ACK2` to `to`. No reply is expected (§4.3.1).
    async fn send_ack2(&self, to: Endpoint, payload: Ack2Payload) -> Result<()>;

    /// Best-effort `SHUTDOWN` broadcast (§5 cancellation).
    async fn send_shutdown(&self, to: Endpoint) -> Result<()>;

    /// Point-to-point liveness echo; resolves once the peer responds
    /// (§4.3.3's two-phase `mark_alive`).
    async fn send_echo(&self, to: Endpoint) -> Result<()>;
}

#[cfg(test)]
pub mod test_support {
    use std::collections::HashMap;
    use std::sync::{Arc, Weak};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::GossipTransport;
    use crate::endpoint::Endpoint;
    use crate::error::{GossipError, Result};
    use crate::gossip::wire::{Ack2Payload, AckPayload, SynPayload};
    use crate::gossip::Gossiper;

    /// Loopback transport wiring multiple in-process [`Gossiper`]s
    /// together by endpoint, for deterministic scenario tests (grounded
    /// on the messaging layer's in-process RPC test harness).
    #[derive(Default)]
    pub struct InMemoryNetwork {
        nodes: Mutex<HashMap<Endpoint, Weak<Gossiper>>>,
    }

    impl InMemoryNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn register(&self, endpoint: Endpoint, gossiper: &Arc<Gossiper>) {
            self.nodes.lock().insert(endpoint, Arc::downgrade(gossiper));
        }

        fn get(&self, endpoint: &Endpoint) -> Result<Arc<Gossiper>> {
            self.nodes
                .lock()
                .get(endpoint)
                .and_then(Weak::upgrade)
                .ok_or_else(|| GossipError::Transport(format!("no such node: {endpoint}")))
        }
    }

    pub struct InMemoryTransport {
        network: Arc<InMemoryNetwork>,
        from: Endpoint,
    }

    impl InMemoryTransport {
        pub fn new(network: Arc<InMemoryNetwork>, from: Endpoint) -> Self {
            Self { network, from }
        }
    }

    #[async_trait]
    impl GossipTransport for InMemoryTransport {
        async fn send_syn(&self, to: Endpoint, payload: SynPayload) -> Result<AckPayload> {
            let target = self.network.get(&to)?;
            target.handle_syn(self.from, payload)
        }

        async fn send_ack2(&self, to: Endpoint, payload: Ack2Payload) -> Result<()> {
            let target = self.network.get(&to)?;
            target.handle_ack2(payload)
        }

        async fn send_shutdown(&self, to: Endpoint) -> Result<()> {
            if let Ok(target) = self.network.get(&to) {
                target.handle_shutdown(self.from);
            }
            Ok(())
        }

        async fn send_echo(&self, to: Endpoint) -> Result<()> {
            let target = self.network.get(&to)?;
            target.handle_echo(self.from);
            Ok(())
        }
    }
}
