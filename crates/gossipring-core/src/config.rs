//! Configuration for the membership/placement core (§6).
//!
//! Mirrors the nested `*Config` + `Default` idiom of the teacher crate's
//! `config.rs`. This module only defines programmatic configuration
//! structs — parsing a config file is an explicit Non-goal (§1).

use std::time::Duration;

/// Top-level configuration wiring every sub-component's knobs together.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Cluster identifier; a `SYN` whose cluster id differs is a protocol
    /// violation (§7.4) and is dropped.
    pub cluster_id: String,

    /// Statically configured rendezvous points (§4.3.5).
    pub seeds: Vec<crate::endpoint::Endpoint>,

    pub gossip: GossipTimingConfig,
    pub failure_detector: FailureDetectorConfig,
    pub dynamic_snitch: DynamicSnitchConfig,
    pub replication: ReplicationConfig,
}

impl GossipConfig {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            seeds: Vec::new(),
            gossip: GossipTimingConfig::default(),
            failure_detector: FailureDetectorConfig::default(),
            dynamic_snitch: DynamicSnitchConfig::default(),
            replication: ReplicationConfig::default(),
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<crate::endpoint::Endpoint>) -> Self {
        self.seeds = seeds;
        self
    }
}

/// Gossip tick and derived ring timeouts (§4.3, §5).
#[derive(Debug, Clone)]
pub struct GossipTimingConfig {
    /// `GossipTask` period. Default 1s.
    pub gossip_interval: Duration,

    /// `ring.delay.ms`: upper bound on convergence after a topology change.
    pub ring_delay: Duration,

    /// Maximum allowed generation gap before an incoming generation is
    /// treated as corruption (≈ one year of seconds, configurable).
    pub max_generation_difference_secs: i64,

    /// Default expire-time horizon for left endpoints.
    pub very_long_time: Duration,
}

impl GossipTimingConfig {
    /// `quarantine_delay = 2 × ring_delay`.
    pub fn quarantine_delay(&self) -> Duration {
        self.ring_delay * 2
    }

    /// `fat_client_timeout = quarantine_delay / 2`.
    pub fn fat_client_timeout(&self) -> Duration {
        self.quarantine_delay() / 2
    }
}

impl Default for GossipTimingConfig {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_secs(1),
            ring_delay: Duration::from_secs(30),
            max_generation_difference_secs: 60 * 60 * 24 * 365,
            very_long_time: Duration::from_secs(3 * 24 * 60 * 60),
        }
    }
}

/// Phi-accrual failure detector configuration (§4.2, §6).
#[derive(Debug, Clone)]
pub struct FailureDetectorConfig {
    /// `phi_convict_threshold`, default 8.0.
    pub phi_convict_threshold: f64,

    /// `fd.initial.value.ms`: seed value for a brand-new arrival window.
    /// Defaults to `2 × gossip_period`.
    pub initial_interval: Duration,

    /// `fd.max.interval.ms`: intervals longer than this are discarded.
    /// Defaults to the initial seed value.
    pub max_interval: Duration,

    /// Bound on the arrival window (`SAMPLE_SIZE`).
    pub sample_size: usize,
}

impl Default for FailureDetectorConfig {
    fn default() -> Self {
        let initial_interval = Duration::from_secs(2);
        Self {
            phi_convict_threshold: 8.0,
            initial_interval,
            max_interval: initial_interval,
            sample_size: 1000,
        }
    }
}

/// Dynamic-snitch latency sampling and scoring configuration (§4.5, §6).
#[derive(Debug, Clone)]
pub struct DynamicSnitchConfig {
    /// Exponential-decay factor for the latency reservoir.
    pub alpha: f64,

    /// Sample window size per endpoint.
    pub window: usize,

    /// How often the score map is rebuilt. Default 100ms.
    pub update_interval: Duration,

    /// How often samples are wholly cleared. Default 10 minutes.
    pub reset_interval: Duration,

    /// `0` means pure score order; otherwise the multiplicative slack
    /// before falling back from topology order to score order.
    pub badness_threshold: f64,
}

impl Default for DynamicSnitchConfig {
    fn default() -> Self {
        Self {
            alpha: 0.75,
            window: 100,
            update_interval: Duration::from_millis(100),
            reset_interval: Duration::from_secs(10 * 60),
            badness_threshold: 0.0,
        }
    }
}

/// Replication strategy options (§4.6, §6).
#[derive(Debug, Clone)]
pub enum ReplicationConfig {
    /// Always replicate to the local endpoint only.
    Local,
    /// `{datacenter: replication_factor}`. The literal key
    /// `replication_factor` is rejected at construction (§7.3).
    NetworkTopology(Vec<(String, usize)>),
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig::Local
    }
}
