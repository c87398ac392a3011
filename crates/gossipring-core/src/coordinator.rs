//! Composition root (§9): wires the Gossiper, failure detector, snitch,
//! topology metadata and replication strategy together with no component
//! owning another — only back-references by endpoint, looked up on
//! demand, matching the teacher's `ClusterCoordinator` lifecycle shape.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::clock::SharedClock;
use crate::config::{GossipConfig, ReplicationConfig};
use crate::endpoint::{Endpoint, EndpointState, LifecyclePhase, StateKey, VersionGenerator};
use crate::error::Result;
use crate::events::Subscriber;
use crate::failure_detector::FailureDetector;
use crate::gossip::Gossiper;
use crate::replication::{LocalStrategy, NetworkTopologyStrategy, ReplicationStrategy};
use crate::snitch::{DynamicSnitch, TopologySnitch};
use crate::topology::TopologyMetaData;
use crate::transport::GossipTransport;

/// Subscribes to join/change/remove and keeps [`TopologyMetaData`] in
/// sync with each endpoint's `DC`/`RACK`/`HOST_ID` application state
/// (§4.4: "Updates are driven by subscribers to the failure-event bus").
struct TopologyUpdater {
    gossiper: Weak<Gossiper>,
    topology: Arc<TopologyMetaData>,
}

impl TopologyUpdater {
    fn sync_location(&self, endpoint: Endpoint, state: &EndpointState) {
        if let (Some(dc), Some(rack)) = (state.get(StateKey::Dc), state.get(StateKey::Rack)) {
            self.topology.update_location(endpoint, dc.value.clone(), rack.value.clone());
        }
        if let Some(host_id) = state.get(StateKey::HostId) {
            if let Ok(uuid) = host_id.value.parse() {
                self.topology.update_host_id(uuid, endpoint);
            }
        }
    }
}

impl Subscriber for TopologyUpdater {
    fn on_join(&self, endpoint: Endpoint) {
        if let Some(gossiper) = self.gossiper.upgrade() {
            if let Some(state) = gossiper.endpoint_state(&endpoint) {
                self.sync_location(endpoint, &state);
            }
        }
    }

    fn on_change(&self, endpoint: Endpoint, _entry: &crate::endpoint::StateEntry) {
        if let Some(gossiper) = self.gossiper.upgrade() {
            if let Some(state) = gossiper.endpoint_state(&endpoint) {
                self.sync_location(endpoint, &state);
            }
        }
    }

    fn on_remove(&self, endpoint: Endpoint) {
        self.topology.remove(&endpoint);
    }
}

/// Top-level wiring for one node's membership/placement core.
pub struct GossipRingCoordinator {
    local_endpoint: Endpoint,
    config: GossipConfig,
    clock: SharedClock,
    gossiper: Arc<Gossiper>,
    topology: Arc<TopologyMetaData>,
    snitch: Arc<DynamicSnitch<TopologySnitch>>,
    replication: Arc<dyn ReplicationStrategy>,
    failure_detector: Arc<FailureDetector>,
    score_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl GossipRingCoordinator {
    pub fn new(
        local_endpoint: Endpoint,
        config: GossipConfig,
        clock: SharedClock,
        transport: Arc<dyn GossipTransport>,
    ) -> Result<Arc<Self>> {
        let failure_detector = Arc::new(FailureDetector::new(
            clock.clone(),
            config.failure_detector.clone(),
            config.gossip.gossip_interval.as_nanos() as u64,
        ));
        let version_gen = VersionGenerator::new();
        let topology = Arc::new(TopologyMetaData::new());

        let gossiper = Gossiper::new(
            local_endpoint,
            config.cluster_id.clone(),
            config.clone(),
            clock.clone(),
            transport,
            failure_detector.clone(),
            version_gen,
        );

        gossiper.register_subscriber(Arc::new(TopologyUpdater {
            gossiper: Arc::downgrade(&gossiper),
            topology: topology.clone(),
        }));

        let sub_snitch = TopologySnitch::new(topology.clone());
        let snitch = Arc::new(DynamicSnitch::new(sub_snitch, config.dynamic_snitch.clone(), clock.clone()));

        let replication: Arc<dyn ReplicationStrategy> = match &config.replication {
            ReplicationConfig::Local => Arc::new(LocalStrategy::new(local_endpoint)),
            ReplicationConfig::NetworkTopology(dc_rf) => {
                Arc::new(NetworkTopologyStrategy::new(dc_rf.clone())?)
            }
        };

        Ok(Arc::new(Self {
            local_endpoint,
            config,
            clock,
            gossiper,
            topology,
            snitch,
            replication,
            failure_detector,
            score_task: parking_lot::Mutex::new(None),
        }))
    }

    pub fn gossiper(&self) -> &Arc<Gossiper> {
        &self.gossiper
    }

    pub fn topology(&self) -> &Arc<TopologyMetaData> {
        &self.topology
    }

    pub fn snitch(&self) -> &Arc<DynamicSnitch<TopologySnitch>> {
        &self.snitch
    }

    pub fn replication(&self) -> &Arc<dyn ReplicationStrategy> {
        &self.replication
    }

    /// Start the gossip tick plus the 100ms score-update timer (§5).
    pub fn start(self: &Arc<Self>, generation: i64) {
        info!(endpoint = %self.local_endpoint, generation, "starting gossip core");
        self.gossiper.start(generation);

        let snitch = self.snitch.clone();
        let update_interval = self.config.dynamic_snitch.update_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(update_interval);
            loop {
                interval.tick().await;
                snitch.update_scores();
            }
        });
        *self.score_task.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.score_task.lock().take() {
            handle.abort();
        }
        self.gossiper.stop().await;
    }

    /// §6 CLI surface: current per-endpoint dynamic-snitch scores.
    pub fn scores(&self) -> HashMap<Endpoint, f64> {
        self.snitch.score_map()
    }

    /// §6 CLI surface: recent latency readings for one endpoint.
    pub fn dump_timings(&self, endpoint: &Endpoint) -> Vec<f64> {
        self.snitch.timings_for(endpoint)
    }

    pub fn endpoint_downtime(&self, endpoint: &Endpoint) -> Option<Duration> {
        let state = self.gossiper.endpoint_state(endpoint)?;
        if self.gossiper.is_alive(endpoint) {
            return None;
        }
        let now = self.clock.now_nanos();
        Some(Duration::from_nanos(now.saturating_sub(state.updated_at_nanos)))
    }

    pub fn current_generation(&self, endpoint: &Endpoint) -> Option<i64> {
        self.gossiper.current_generation(endpoint)
    }

    pub fn all_endpoint_states(&self) -> HashMap<Endpoint, EndpointState> {
        self.gossiper.all_endpoint_states()
    }

    pub fn simple_states(&self) -> HashMap<Endpoint, &'static str> {
        self.gossiper.simple_states()
    }

    pub fn lifecycle_phase(&self, endpoint: &Endpoint) -> Option<LifecyclePhase> {
        self.gossiper.lifecycle_phase(endpoint)
    }

    pub fn set_phi_convict_threshold(&self, threshold: f64) {
        self.failure_detector.set_convict_threshold(threshold);
    }

    pub fn set_severity(&self, endpoint: Endpoint, severity: f64) {
        self.snitch.set_severity(endpoint, severity);
    }

    pub async fn assassinate_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        self.gossiper.assassinate(endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::transport::test_support::{InMemoryNetwork, InMemoryTransport};
    use std::net::SocketAddr;

    #[tokio::test]
    async fn coordinator_lifecycle() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();
        let local = Endpoint::new("127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        let transport = Arc::new(InMemoryTransport::new(network.clone(), local));
        let coordinator =
            GossipRingCoordinator::new(local, GossipConfig::new("test"), clock, transport).unwrap();
        network.register(local, coordinator.gossiper());

        coordinator.start(1);
        assert_eq!(coordinator.current_generation(&local), Some(1));
        coordinator.stop().await;
    }
}
