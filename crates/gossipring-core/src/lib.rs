//! Distributed cluster-membership and replica-placement core of a
//! peer-to-peer database: anti-entropy gossip, phi-accrual failure
//! detection, latency-adaptive snitching, and topology-aware replica
//! placement.
//!
//! [`coordinator::GossipRingCoordinator`] is the composition root — it
//! wires a [`gossip::Gossiper`], [`failure_detector::FailureDetector`],
//! [`topology::TopologyMetaData`], [`snitch::DynamicSnitch`] and a
//! [`replication::ReplicationStrategy`] together behind the §6
//! operational accessors. Nothing in this crate drives I/O directly;
//! callers supply a [`clock::Clock`] and a [`transport::GossipTransport`].

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod failure_detector;
pub mod gossip;
pub mod logging;
pub mod replication;
pub mod snitch;
pub mod topology;
pub mod transport;

pub use clock::{Clock, SharedClock, SystemClock};
pub use config::GossipConfig;
pub use coordinator::GossipRingCoordinator;
pub use endpoint::{Endpoint, EndpointState, StateKey};
pub use error::{GossipError, Result};
pub use events::Subscriber;
pub use failure_detector::FailureDetector;
pub use gossip::Gossiper;
pub use transport::GossipTransport;
