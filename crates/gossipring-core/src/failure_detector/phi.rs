//! Phi-accrual failure detector (C3, §2, §4.2).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::config::FailureDetectorConfig;
use crate::endpoint::Endpoint;

/// `1 / ln(10)`, the constant the original converts its natural-log phi
/// value by to land on a base-10 "order of magnitude unlikely" scale.
const PHI_FACTOR: f64 = 1.0 / std::f64::consts::LN_10;

/// Outcome of `interpret` for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suspicion {
    pub phi: f64,
}

/// Accrual failure detector over a population of endpoints (§2).
///
/// `report` is called on every heartbeat-bearing arrival (ack, ack2, or
/// any successfully applied remote state); `interpret` is polled by the
/// gossiper's periodic status check and returns a conviction once `phi`
/// crosses the configured threshold.
pub struct FailureDetector {
    clock: SharedClock,
    config: FailureDetectorConfig,
    windows: Mutex<HashMap<Endpoint, super::arrival_window::ArrivalWindow>>,
    /// Runtime-adjustable threshold (`set_phi_convict_threshold`, §6),
    /// separate from the static `config` it's seeded from.
    convict_threshold: parking_lot::RwLock<f64>,
}

impl FailureDetector {
    pub fn new(clock: SharedClock, config: FailureDetectorConfig, gossip_interval_nanos: u64) -> Self {
        let _ = gossip_interval_nanos;
        let convict_threshold = parking_lot::RwLock::new(config.phi_convict_threshold);
        Self {
            clock,
            config,
            windows: Mutex::new(HashMap::new()),
            convict_threshold,
        }
    }

    pub fn convict_threshold(&self) -> f64 {
        *self.convict_threshold.read()
    }

    /// `set_phi_convict_threshold` (§6 operational accessor).
    pub fn set_convict_threshold(&self, threshold: f64) {
        *self.convict_threshold.write() = threshold;
    }

    fn seed_interval_nanos(&self) -> u64 {
        self.config.initial_interval.as_nanos() as u64
    }

    fn max_interval_nanos(&self) -> u64 {
        self.config.max_interval.as_nanos() as u64
    }

    /// Record an arrival for `endpoint` at the current clock time.
    pub fn report(&self, endpoint: Endpoint) {
        let now = self.clock.now_nanos();
        let mut windows = self.windows.lock();
        let window = windows.entry(endpoint).or_insert_with(|| {
            super::arrival_window::ArrivalWindow::new(
                self.config.sample_size,
                self.max_interval_nanos(),
                self.seed_interval_nanos(),
            )
        });
        window.add(now);
    }

    /// Compute `phi` for `endpoint` and return a `Suspicion` if it has
    /// never been reported, or `None` if there's no window at all yet.
    pub fn phi(&self, endpoint: Endpoint) -> Option<f64> {
        let now = self.clock.now_nanos();
        let windows = self.windows.lock();
        let window = windows.get(&endpoint)?;
        let last_arrival = window.last_arrival_nanos()?;
        let mean = window.mean_nanos();
        if mean <= 0.0 {
            return Some(0.0);
        }
        let elapsed = now.saturating_sub(last_arrival) as f64;
        Some((elapsed / mean) * PHI_FACTOR)
    }

    /// Evaluate `endpoint` against `phi_convict_threshold`, returning a
    /// `Suspicion` iff it should be convicted right now.
    pub fn interpret(&self, endpoint: Endpoint) -> Option<Suspicion> {
        let phi = self.phi(endpoint)?;
        if phi > self.convict_threshold() {
            Some(Suspicion { phi })
        } else {
            None
        }
    }

    /// Drop all history for `endpoint` (§4.3.4: eviction, restart with a
    /// new generation).
    pub fn remove(&self, endpoint: &Endpoint) {
        self.windows.lock().remove(endpoint);
    }

    /// Force an immediate conviction regardless of the accrued `phi`
    /// (`assassinate`, §4.4).
    pub fn force_conviction(&self, endpoint: Endpoint) -> Suspicion {
        self.remove(&endpoint);
        Suspicion { phi: f64::INFINITY }
    }
}
