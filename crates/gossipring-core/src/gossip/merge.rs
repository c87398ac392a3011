//! Local merge of incoming remote state (§4.3.2) and the per-tick status
//! check (§4.3.4).

use tracing::warn;

use crate::endpoint::{Endpoint, EndpointState, LifecyclePhase};
use crate::error::{GossipError, Result};

use super::Gossiper;

/// For one `(endpoint, remote_state)` pair received via `ACK`/`ACK2`.
pub(super) fn apply_remote_state(gossiper: &Gossiper, endpoint: Endpoint, remote: EndpointState) -> Result<()> {
    if gossiper.quarantine_set().contains(&endpoint) {
        return Ok(());
    }

    let local = gossiper.states_map().get(&endpoint).map(|r| r.clone());

    if let Some(local) = &local {
        let gap = (remote.heartbeat.generation - local.heartbeat.generation).abs();
        if gap > gossiper.config().gossip.max_generation_difference_secs {
            warn!(%endpoint, gap, "generation gap exceeds max_generation_difference, ignoring");
            return Err(GossipError::GenerationGapTooLarge {
                endpoint,
                local: local.heartbeat.generation,
                remote: remote.heartbeat.generation,
            });
        }
    }

    let was_dead = local
        .as_ref()
        .map(|s| !s.is_alive || s.is_dead_by_status())
        .unwrap_or(false);

    let now = gossiper.clock().now_nanos();

    match &local {
        None => major_state_change(gossiper, endpoint, remote, now, false),
        Some(local) if remote.heartbeat.generation > local.heartbeat.generation => {
            major_state_change(gossiper, endpoint, remote, now, true)
        }
        Some(local) if remote.heartbeat.generation == local.heartbeat.generation => {
            if remote.max_version() > local.max_version() {
                apply_entries_two_pass(gossiper, endpoint, remote, now);
            }
        }
        _ => { /* remote generation older: ignore, we already have the newer state */ }
    }

    if was_dead {
        if let Some(current) = gossiper.states_map().get(&endpoint) {
            if !current.is_dead_by_status() {
                gossiper.spawn_mark_alive(endpoint);
            }
        }
    }

    Ok(())
}

/// Remote generation strictly newer than local (or no local state at
/// all): wholly replace, `on_restart` (if this was a restart), then
/// `mark_alive` then `on_join` (§4.3.2).
fn major_state_change(
    gossiper: &Gossiper,
    endpoint: Endpoint,
    mut remote: EndpointState,
    now: u64,
    is_restart: bool,
) {
    remote.touch(now);
    gossiper.states_map().insert(endpoint, remote);
    gossiper.set_lifecycle(endpoint, LifecyclePhase::Joining);

    if is_restart {
        gossiper.event_bus().read().fire_on_restart(endpoint);
    }

    gossiper.spawn_mark_alive_then_join(endpoint);
}

/// Equal generations, remote knows a newer max version: apply every
/// entry first, then fire `on_change` for each — so any observer sees a
/// consistent snapshot mid-notification (§4.3.2).
fn apply_entries_two_pass(gossiper: &Gossiper, endpoint: Endpoint, remote: EndpointState, now: u64) {
    let bus = gossiper.event_bus().read();
    let mut changed = Vec::new();

    {
        let mut local = gossiper
            .states_map()
            .entry(endpoint)
            .or_insert_with(|| EndpointState::new(remote.heartbeat.generation, now));

        if remote.heartbeat.version > local.heartbeat.version {
            local.heartbeat.version = remote.heartbeat.version;
        }

        for entry in remote.entries.into_values() {
            let should_apply = local
                .get(entry.key)
                .map(|existing| entry.version > existing.version)
                .unwrap_or(true);
            if should_apply {
                bus.fire_before_change(endpoint, &entry);
                local.put_entry(entry.clone(), now);
                changed.push(entry);
            }
        }
    }

    for entry in &changed {
        bus.fire_on_change(endpoint, entry);
    }
}

/// Per-tick status check (§4.3.4).
pub(super) fn status_check(gossiper: &Gossiper) {
    let now = gossiper.clock().now_nanos();
    let fat_client_timeout_nanos = gossiper.config().gossip.fat_client_timeout().as_nanos() as u64;

    let endpoints: Vec<(Endpoint, EndpointState)> = gossiper
        .states_map()
        .iter()
        .filter(|entry| *entry.key() != gossiper.local_endpoint)
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();

    for (endpoint, state) in endpoints {
        if state.entries.is_empty() {
            continue;
        }

        if gossiper.failure_detector().interpret(endpoint).is_some() {
            gossiper.mark_dead(endpoint);
        }

        let is_fat_client = !gossiper.token_holder(&endpoint);
        if is_fat_client {
            if now.saturating_sub(state.updated_at_nanos) > fat_client_timeout_nanos {
                evict(gossiper, endpoint, now);
                continue;
            }
        }

        if state.is_dead_by_status() {
            gossiper.set_lifecycle(endpoint, LifecyclePhase::Leaving);
            if !gossiper.token_holder(&endpoint) {
                if let Some(expire_at) = dead_status_expire_time(&state) {
                    if now >= expire_at {
                        evict(gossiper, endpoint, now);
                    }
                }
            }
        }
    }

    let quarantine_delay_nanos = gossiper.config().gossip.quarantine_delay().as_nanos() as u64;
    gossiper.quarantine_set().purge(now, quarantine_delay_nanos);
}

fn dead_status_expire_time(state: &EndpointState) -> Option<u64> {
    let raw = &state.get(crate::endpoint::StateKey::Status)?.value;
    raw.rsplit_once(',').and_then(|(_, tail)| tail.parse().ok())
}

fn evict(gossiper: &Gossiper, endpoint: Endpoint, now: u64) {
    gossiper.set_lifecycle(endpoint, LifecyclePhase::Left);
    gossiper.remove_lifecycle(&endpoint);
    gossiper.states_map().remove(&endpoint);
    gossiper.live_set().lock().remove(&endpoint);
    gossiper.unreachable_map().lock().remove(&endpoint);
    gossiper.failure_detector().remove(&endpoint);
    gossiper.quarantine_set().quarantine(endpoint, now);
    gossiper.event_bus().read().fire_on_remove(endpoint);
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::clock::SharedClock;
    use crate::config::{FailureDetectorConfig, GossipConfig};
    use crate::endpoint::VersionGenerator;
    use crate::failure_detector::FailureDetector;
    use crate::transport::test_support::{InMemoryNetwork, InMemoryTransport};

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(format!("127.0.0.1:{port}").parse::<SocketAddr>().unwrap())
    }

    #[test]
    fn generation_gap_too_large_is_rejected() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let network = InMemoryNetwork::new();
        let local = ep(7000);
        let mut config = GossipConfig::new("test-cluster");
        config.gossip.max_generation_difference_secs = 10;
        let fd = Arc::new(FailureDetector::new(clock.clone(), FailureDetectorConfig::default(), 1_000_000_000));
        let transport = Arc::new(InMemoryTransport::new(network.clone(), local));
        let gossiper = Gossiper::new(local, "test-cluster", config, clock, transport, fd, VersionGenerator::new());
        network.register(local, &gossiper);

        let peer = ep(7001);
        gossiper.states_map().insert(peer, EndpointState::new(0, 0));

        let remote = EndpointState::new(1_000, 0);
        let result = apply_remote_state(&gossiper, peer, remote);
        assert!(matches!(result, Err(GossipError::GenerationGapTooLarge { .. })));
    }
}
