//! The Gossiper (C4, §4.3): periodic anti-entropy exchange of endpoint
//! state, liveness transitions, and the event bus fan-out.

pub mod digest;
pub mod merge;
pub mod quarantine;
pub mod wire;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::GossipConfig;
use crate::endpoint::{Endpoint, EndpointState, LifecycleMachine, LifecyclePhase, StateEntry, StateKey};
use crate::error::{GossipError, Result};
use crate::events::{EventBus, Subscriber};
use crate::failure_detector::FailureDetector;
use crate::transport::GossipTransport;

use digest::GossipDigest;
use quarantine::QuarantineSet;
use wire::{Ack2Payload, AckPayload, SynPayload};

/// Owns the endpoint-state map exclusively (§3 Ownership). Every other
/// component reaches it only through read-only accessors or the event
/// bus, never by holding a reference to `Gossiper` itself across a call.
pub struct Gossiper {
    pub(crate) local_endpoint: Endpoint,
    cluster_id: String,
    config: GossipConfig,
    clock: SharedClock,
    version_gen: Arc<crate::endpoint::VersionGenerator>,
    transport: Arc<dyn GossipTransport>,
    failure_detector: Arc<FailureDetector>,

    states: DashMap<Endpoint, EndpointState>,
    live: Mutex<HashSet<Endpoint>>,
    unreachable: Mutex<HashMap<Endpoint, u64>>,
    token_holders: Mutex<HashSet<Endpoint>>,
    quarantine: QuarantineSet,
    event_bus: RwLock<EventBus>,
    /// Locally observed per-endpoint lifecycle, driven from the merge path
    /// and the liveness transitions below (§6 `lifecycle_phase` accessor).
    lifecycles: DashMap<Endpoint, Mutex<LifecycleMachine>>,

    generation: AtomicI64,
    running: AtomicBool,
    /// Single-task-at-a-time guard for the gossip tick (§4.3).
    tick_lock: AsyncMutex<()>,
    last_tick_queued_at: Mutex<Option<u64>>,
    /// Back-reference to our own `Arc`, used only to spawn the
    /// two-phase `mark_alive` echo without the caller needing to thread
    /// an `Arc<Gossiper>` through every merge path (§9: no component
    /// owns another; this is a lookup-by-key style back-reference, not
    /// ownership).
    self_weak: Weak<Gossiper>,
}

impl Gossiper {
    pub fn new(
        local_endpoint: Endpoint,
        cluster_id: impl Into<String>,
        config: GossipConfig,
        clock: SharedClock,
        transport: Arc<dyn GossipTransport>,
        failure_detector: Arc<FailureDetector>,
        version_gen: Arc<crate::endpoint::VersionGenerator>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            local_endpoint,
            cluster_id: cluster_id.into(),
            config,
            clock,
            version_gen,
            transport,
            failure_detector,
            states: DashMap::new(),
            live: Mutex::new(HashSet::new()),
            unreachable: Mutex::new(HashMap::new()),
            token_holders: Mutex::new(HashSet::new()),
            quarantine: QuarantineSet::new(),
            event_bus: RwLock::new(EventBus::new()),
            lifecycles: DashMap::new(),
            generation: AtomicI64::new(0),
            running: AtomicBool::new(false),
            tick_lock: AsyncMutex::new(()),
            last_tick_queued_at: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    pub fn register_subscriber(&self, subscriber: Arc<dyn Subscriber>) {
        self.event_bus.write().register(subscriber);
    }

    pub fn local_generation(&self) -> i64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn current_generation(&self, endpoint: &Endpoint) -> Option<i64> {
        self.states.get(endpoint).map(|s| s.heartbeat.generation)
    }

    pub fn is_alive(&self, endpoint: &Endpoint) -> bool {
        self.live.lock().contains(endpoint)
    }

    pub fn endpoint_state(&self, endpoint: &Endpoint) -> Option<EndpointState> {
        self.states.get(endpoint).map(|s| s.clone())
    }

    /// Locally observed lifecycle phase for `endpoint` (§6 CLI surface).
    pub fn lifecycle_phase(&self, endpoint: &Endpoint) -> Option<LifecyclePhase> {
        self.lifecycles.get(endpoint).map(|m| m.lock().current())
    }

    fn transition_lifecycle(&self, endpoint: Endpoint, to: LifecyclePhase) {
        let now = self.clock.now_nanos();
        self.lifecycles
            .entry(endpoint)
            .or_default()
            .lock()
            .transition(to, now);
    }

    pub fn all_endpoint_states(&self) -> HashMap<Endpoint, EndpointState> {
        self.states
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// `{host: "UP" | "DOWN"}` accessor (§6 CLI surface).
    pub fn simple_states(&self) -> HashMap<Endpoint, &'static str> {
        let live = self.live.lock();
        self.states
            .iter()
            .map(|entry| {
                let status = if live.contains(entry.key()) { "UP" } else { "DOWN" };
                (*entry.key(), status)
            })
            .collect()
    }

    fn is_token_holder(&self, endpoint: &Endpoint) -> bool {
        self.token_holders.lock().contains(endpoint)
    }

    pub fn mark_token_holder(&self, endpoint: Endpoint) {
        self.token_holders.lock().insert(endpoint);
    }

    /// `local_update` (§4.1): assigns the next version, raised past
    /// whatever it would otherwise have been, and fires before/on-change
    /// notifications around the mutation.
    pub fn apply_local_state(&self, key: StateKey, value: impl Into<String>) {
        let now = self.clock.now_nanos();
        let value = value.into();

        let floor = self
            .states
            .get(&self.local_endpoint)
            .map(|s| s.max_version())
            .unwrap_or(0);
        let version = self.version_gen.next(floor);
        let entry = StateEntry::new(key, value, version);

        self.event_bus.read().fire_before_change(self.local_endpoint, &entry);

        self.states
            .entry(self.local_endpoint)
            .or_insert_with(|| EndpointState::new(self.local_generation(), now))
            .put_entry(entry.clone(), now);

        self.event_bus.read().fire_on_change(self.local_endpoint, &entry);
    }

    fn heartbeat_tick(&self) {
        let now = self.clock.now_nanos();
        let version = self.version_gen.tick();
        let mut entry = self
            .states
            .entry(self.local_endpoint)
            .or_insert_with(|| EndpointState::new(self.local_generation(), now));
        entry.heartbeat.version = version;
        entry.touch(now);
    }

    /// `start(generation)` (§4.3): seeds our own state, marks ourselves
    /// alive, and spawns the 1s `GossipTask`.
    pub fn start(self: &Arc<Self>, generation: i64) -> JoinHandle<()> {
        self.generation.store(generation, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let now = self.clock.now_nanos();
        self.states
            .entry(self.local_endpoint)
            .or_insert_with(|| EndpointState::new(generation, now));
        self.live.lock().insert(self.local_endpoint);

        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.gossip.gossip_interval);
            loop {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.gossip_tick().await;
            }
        })
    }

    /// `stop()` (§5 cancellation): stops the periodic task, best-effort
    /// broadcasts `SHUTDOWN` to live peers, then sleeps `2 × gossip_interval`.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let live: Vec<Endpoint> = self.live.lock().iter().copied().collect();
        for endpoint in live {
            if endpoint == self.local_endpoint {
                continue;
            }
            let _ = self.transport.send_shutdown(endpoint).await;
        }
        tokio::time::sleep(self.config.gossip.gossip_interval * 2).await;
    }

    fn digest_list(&self) -> Vec<GossipDigest> {
        let mut digests: Vec<GossipDigest> = self
            .states
            .iter()
            .map(|entry| GossipDigest::new(*entry.key(), entry.value().heartbeat.generation, entry.value().max_version()))
            .collect();
        digests.shuffle(&mut rand::thread_rng());
        digests
    }

    fn peer_pool(&self) -> (Vec<Endpoint>, Vec<Endpoint>) {
        let live: Vec<Endpoint> = self
            .live
            .lock()
            .iter()
            .filter(|e| **e != self.local_endpoint)
            .copied()
            .collect();
        let unreachable: Vec<Endpoint> = self.unreachable.lock().keys().copied().collect();
        (live, unreachable)
    }

    /// The `GossipTask` body (§4.3 steps 1-6).
    async fn gossip_tick(&self) {
        let _guard = match self.tick_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return, // previous tick still running
        };

        if let Some(queued_at) = *self.last_tick_queued_at.lock() {
            let now = self.clock.now_nanos();
            if now.saturating_sub(queued_at) > 1_000_000_000 {
                warn!("gossip tick backlogged for >1s, skipping to avoid spurious convictions");
                return;
            }
        }
        *self.last_tick_queued_at.lock() = Some(self.clock.now_nanos());

        self.heartbeat_tick();

        let (live, unreachable) = self.peer_pool();
        let mut rng = rand::thread_rng();

        let mut gossiped_to_seed = false;

        if let Some(target) = live.choose(&mut rng).copied() {
            gossiped_to_seed = self.config.seeds.contains(&target);
            self.gossip_to(target).await;
        }

        if !unreachable.is_empty() {
            let probability = unreachable.len() as f64 / (live.len() as f64 + 1.0);
            if rand::random::<f64>() < probability {
                if let Some(target) = unreachable.choose(&mut rng).copied() {
                    self.gossip_to(target).await;
                }
            }
        }

        if (!gossiped_to_seed || live.len() < self.config.seeds.len()) && !self.config.seeds.is_empty() {
            let denom = (live.len() + unreachable.len()) as f64;
            let probability = if denom > 0.0 {
                self.config.seeds.len() as f64 / denom
            } else {
                1.0
            };
            if rand::random::<f64>() < probability {
                if let Some(seed) = self.config.seeds.choose(&mut rng).copied() {
                    self.gossip_to(seed).await;
                }
            }
        }

        self.status_check();
        *self.last_tick_queued_at.lock() = None;
    }

    async fn gossip_to(&self, target: Endpoint) {
        let syn = SynPayload {
            cluster_id: self.cluster_id.clone(),
            digests: self.digest_list(),
        };
        match self.transport.send_syn(target, syn).await {
            Ok(ack) => self.on_ack(target, ack).await,
            Err(err) => debug!(%target, %err, "gossip SYN failed, will retry next tick"),
        }
    }

    async fn on_ack(&self, from: Endpoint, ack: AckPayload) {
        for (endpoint, state) in ack.haves {
            if let Err(err) = self.apply_remote_state(endpoint, state) {
                debug!(%endpoint, %err, "failed to apply remote state from ACK");
            }
        }
        if !ack.needs.is_empty() {
            let haves = self.collect_haves(&ack.needs);
            if let Err(err) = self.transport.send_ack2(from, Ack2Payload { haves }).await {
                debug!(%from, %err, "failed to send ACK2");
            }
        }
    }

    /// Inbound `SYN` handler (§4.3.1).
    pub fn handle_syn(&self, from: Endpoint, syn: SynPayload) -> Result<AckPayload> {
        if syn.cluster_id != self.cluster_id {
            return Err(GossipError::ProtocolViolation(format!(
                "cluster id mismatch: expected {}, got {}",
                self.cluster_id, syn.cluster_id
            )));
        }

        let digests = if syn.digests.is_empty() {
            // Shadow round: reply with digests for everything we know.
            self.digest_list()
        } else {
            syn.digests
        };

        let mut needs = Vec::new();
        let mut haves = Vec::new();

        for digest in &digests {
            let local = self.states.get(&digest.endpoint).map(|s| s.clone());
            match digest::compare(local.as_ref(), digest) {
                digest::DigestDecision::RequestAll => {
                    needs.push(GossipDigest::request_all(digest.endpoint));
                }
                digest::DigestDecision::RequestFrom(from_version) => {
                    needs.push(GossipDigest::new(digest.endpoint, digest.generation, from_version));
                }
                digest::DigestDecision::SendAll | digest::DigestDecision::SendFrom(_) => {
                    if let Some(state) = local {
                        haves.push((digest.endpoint, state));
                    }
                }
                digest::DigestDecision::Skip => {}
            }
        }

        let _ = from;
        Ok(AckPayload { needs, haves })
    }

    fn collect_haves(&self, needs: &[GossipDigest]) -> Vec<(Endpoint, EndpointState)> {
        needs
            .iter()
            .filter_map(|digest| self.states.get(&digest.endpoint).map(|s| (digest.endpoint, s.clone())))
            .collect()
    }

    /// Inbound `ACK2` handler (§4.3.1).
    pub fn handle_ack2(&self, ack2: Ack2Payload) -> Result<()> {
        for (endpoint, state) in ack2.haves {
            if let Err(err) = self.apply_remote_state(endpoint, state) {
                debug!(%endpoint, %err, "failed to apply remote state from ACK2");
            }
        }
        Ok(())
    }

    pub fn handle_shutdown(&self, from: Endpoint) {
        info!(%from, "peer announced shutdown");
        self.live.lock().remove(&from);
        self.unreachable.lock().insert(from, self.clock.now_nanos());
    }

    pub fn handle_echo(&self, from: Endpoint) {
        debug!(%from, "received echo");
    }

    fn apply_remote_state(&self, endpoint: Endpoint, remote: EndpointState) -> Result<()> {
        merge::apply_remote_state(self, endpoint, remote)
    }

    /// `mark_alive` (§4.3.3): two-phase, echo first, only mark alive and
    /// publish `on_alive` once the peer responds within `ring_delay`.
    pub async fn mark_alive(&self, endpoint: Endpoint) -> Result<()> {
        let echo = tokio::time::timeout(self.config.gossip.ring_delay, self.transport.send_echo(endpoint)).await;
        match echo {
            Ok(Ok(())) => {
                self.live.lock().insert(endpoint);
                self.unreachable.lock().remove(&endpoint);
                if let Some(mut state) = self.states.get_mut(&endpoint) {
                    state.is_alive = true;
                }
                self.transition_lifecycle(endpoint, LifecyclePhase::Normal);
                self.event_bus.read().fire_on_alive(endpoint);
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(GossipError::Timeout(format!(
                "echo to {endpoint} did not complete within ring_delay"
            ))),
        }
    }

    /// `mark_dead` (§4.3.3): immediate on conviction.
    pub(crate) fn mark_dead(&self, endpoint: Endpoint) {
        let removed = self.live.lock().remove(&endpoint);
        if removed {
            self.unreachable.lock().insert(endpoint, self.clock.now_nanos());
            if let Some(mut state) = self.states.get_mut(&endpoint) {
                state.is_alive = false;
            }
            self.transition_lifecycle(endpoint, LifecyclePhase::Dead);
            self.event_bus.read().fire_on_dead(endpoint);
        }
    }

    /// Spawn the echo round-trip without blocking the caller (tick or
    /// inbound-message handler).
    pub(crate) fn spawn_mark_alive(&self, endpoint: Endpoint) {
        if let Some(strong) = self.self_weak.upgrade() {
            tokio::spawn(async move {
                if let Err(err) = strong.mark_alive(endpoint).await {
                    debug!(%endpoint, %err, "mark_alive failed");
                }
            });
        }
    }

    /// As [`Self::spawn_mark_alive`], but fires `on_join` once the echo
    /// resolves — §4.3.2's "mark_alive, then emit on_join" ordering for a
    /// newly observed or restarted endpoint.
    pub(crate) fn spawn_mark_alive_then_join(&self, endpoint: Endpoint) {
        if let Some(strong) = self.self_weak.upgrade() {
            tokio::spawn(async move {
                match strong.mark_alive(endpoint).await {
                    Ok(()) => strong.event_bus.read().fire_on_join(endpoint),
                    Err(err) => debug!(%endpoint, %err, "mark_alive failed, on_join suppressed"),
                }
            });
        }
    }

    fn status_check(&self) {
        merge::status_check(self);
    }

    pub(crate) fn states_map(&self) -> &DashMap<Endpoint, EndpointState> {
        &self.states
    }

    pub(crate) fn live_set(&self) -> &Mutex<HashSet<Endpoint>> {
        &self.live
    }

    pub(crate) fn unreachable_map(&self) -> &Mutex<HashMap<Endpoint, u64>> {
        &self.unreachable
    }

    pub(crate) fn quarantine_set(&self) -> &QuarantineSet {
        &self.quarantine
    }

    pub(crate) fn set_lifecycle(&self, endpoint: Endpoint, to: LifecyclePhase) {
        self.transition_lifecycle(endpoint, to);
    }

    pub(crate) fn remove_lifecycle(&self, endpoint: &Endpoint) {
        self.lifecycles.remove(endpoint);
    }

    pub(crate) fn event_bus(&self) -> &RwLock<EventBus> {
        &self.event_bus
    }

    pub(crate) fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub(crate) fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub(crate) fn failure_detector(&self) -> &Arc<FailureDetector> {
        &self.failure_detector
    }

    pub(crate) fn token_holder(&self, endpoint: &Endpoint) -> bool {
        self.is_token_holder(endpoint)
    }

    pub(crate) fn transport_handle(&self) -> &Arc<dyn GossipTransport> {
        &self.transport
    }

    /// `assassinate_endpoint` (§4.4, §7.6, §9 open question): force-write
    /// a `LEFT` status with an expire-time `2 × ring_delay` beyond now,
    /// wait `ring_delay` for quiescence, then re-check for concurrent
    /// activity before evicting.
    pub async fn assassinate(&self, endpoint: Endpoint) -> Result<()> {
        let before = self.current_generation(&endpoint);
        if before.is_none() {
            return Err(GossipError::UnknownEndpoint(endpoint));
        }

        let now = self.clock.now_nanos();
        let expire_at = now + self.config.gossip.quarantine_delay().as_nanos() as u64;
        if let Some(mut state) = self.states.get_mut(&endpoint) {
            let version = state.max_version() + 1;
            state.put_entry(
                StateEntry::new(StateKey::Status, format!("LEFT,{expire_at}"), version),
                now,
            );
        }

        tokio::time::sleep(self.config.gossip.ring_delay).await;

        let after = self.current_generation(&endpoint);
        if before != after {
            return Err(GossipError::ConcurrentActivityDuringAssassination(endpoint));
        }

        self.live.lock().remove(&endpoint);
        self.unreachable.lock().remove(&endpoint);
        self.failure_detector.remove(&endpoint);
        self.event_bus.read().fire_on_remove(endpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::config::{FailureDetectorConfig, GossipConfig};
    use crate::endpoint::VersionGenerator;
    use crate::transport::test_support::{InMemoryNetwork, InMemoryTransport};
    use std::net::SocketAddr;

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap())
    }

    fn make_gossiper(
        local: Endpoint,
        network: &Arc<InMemoryNetwork>,
        clock: SharedClock,
    ) -> Arc<Gossiper> {
        let config = GossipConfig::new("test-cluster");
        let fd = Arc::new(FailureDetector::new(clock.clone(), FailureDetectorConfig::default(), 1_000_000_000));
        let transport = Arc::new(InMemoryTransport::new(network.clone(), local));
        let gossiper = Gossiper::new(local, "test-cluster", config, clock, transport, fd, VersionGenerator::new());
        network.register(local, &gossiper);
        gossiper
    }

    #[tokio::test]
    async fn assassinate_unknown_endpoint_errors() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();
        let gossiper = make_gossiper(ep(7000), &network, clock);
        let result = gossiper.assassinate(ep(9999)).await;
        assert!(matches!(result, Err(GossipError::UnknownEndpoint(_))));
    }

    #[test]
    fn handle_syn_rejects_wrong_cluster_id() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();
        let gossiper = make_gossiper(ep(7000), &network, clock);
        let syn = SynPayload {
            cluster_id: "other-cluster".into(),
            digests: vec![],
        };
        let result = gossiper.handle_syn(ep(7001), syn);
        assert!(matches!(result, Err(GossipError::ProtocolViolation(_))));
    }

    #[test]
    fn shadow_round_replies_with_full_digest_list() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();
        let gossiper = make_gossiper(ep(7000), &network, clock);
        gossiper.generation.store(1, Ordering::SeqCst);
        gossiper.heartbeat_tick();

        let syn = SynPayload {
            cluster_id: "test-cluster".into(),
            digests: vec![],
        };
        let ack = gossiper.handle_syn(ep(7001), syn).unwrap();
        assert!(ack.needs.is_empty());
        assert_eq!(ack.haves.len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_tracks_join_then_conviction() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();
        let a = ep(7000);
        let b = ep(7001);

        let gossiper_a = make_gossiper(a, &network, clock.clone());
        let gossiper_b = make_gossiper(b, &network, clock.clone());
        gossiper_b.generation.store(1, Ordering::SeqCst);
        gossiper_b.heartbeat_tick();

        assert_eq!(gossiper_a.lifecycle_phase(&b), None);

        let remote = gossiper_b.endpoint_state(&b).unwrap();
        gossiper_a.apply_remote_state(b, remote).unwrap();
        assert_eq!(gossiper_a.lifecycle_phase(&b), Some(LifecyclePhase::Joining));

        gossiper_a.mark_alive(b).await.unwrap();
        assert_eq!(gossiper_a.lifecycle_phase(&b), Some(LifecyclePhase::Normal));

        gossiper_a.mark_dead(b);
        assert_eq!(gossiper_a.lifecycle_phase(&b), Some(LifecyclePhase::Dead));
    }

    #[tokio::test]
    async fn scenario_cold_join() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();

        let a = ep(7000);
        let b = ep(7001);
        let c = ep(7002);

        let gossiper_a = make_gossiper(a, &network, clock.clone());
        let gossiper_b = make_gossiper(b, &network, clock.clone());
        let gossiper_c = make_gossiper(c, &network, clock.clone());

        gossiper_a.generation.store(1, Ordering::SeqCst);
        gossiper_a.heartbeat_tick();
        gossiper_a.live.lock().insert(a);

        gossiper_b.generation.store(1, Ordering::SeqCst);
        gossiper_b.heartbeat_tick();
        gossiper_b.live.lock().insert(b);
        gossiper_b.live.lock().insert(c);

        gossiper_c.generation.store(1, Ordering::SeqCst);
        gossiper_c.heartbeat_tick();
        gossiper_c.live.lock().insert(c);
        gossiper_c.live.lock().insert(b);
        gossiper_b
            .states_map()
            .insert(c, gossiper_c.endpoint_state(&c).unwrap());
        gossiper_c
            .states_map()
            .insert(b, gossiper_b.endpoint_state(&b).unwrap());

        gossiper_a.gossip_to(b).await;

        assert!(gossiper_a.endpoint_state(&b).is_some());
        assert!(gossiper_a.endpoint_state(&c).is_some());
    }
}
