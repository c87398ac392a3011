//! Gossip-core error types (§7).

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Result type for gossip-core operations.
pub type Result<T> = std::result::Result<T, GossipError>;

/// Error taxonomy for the membership/placement core.
///
/// Categories 1 and 5 in §7 (transient transport failures, convict events)
/// never surface as `GossipError` — they are handled locally (retried next
/// tick, or routed through the event bus) and have no variant here.
#[derive(Debug, Error)]
pub enum GossipError {
    /// Category 2: generation/version outside the acceptable window.
    #[error("generation gap for {endpoint} exceeds max_generation_difference: local={local}, remote={remote}")]
    GenerationGapTooLarge {
        endpoint: Endpoint,
        local: i64,
        remote: i64,
    },

    /// Category 3: configuration rejected at startup.
    #[error("invalid cluster configuration: {0}")]
    InvalidConfiguration(String),

    /// Category 4: malformed or mismatched wire message.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Category 4: checksum mismatch while decoding a frame.
    #[error("checksum mismatch decoding gossip frame")]
    ChecksumMismatch,

    /// An endpoint referenced by an operation is not known locally.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(Endpoint),

    /// `assassinate` detected concurrent activity from the target after
    /// `ring_delay` and aborted (§7.6).
    #[error("concurrent activity detected for {0} during assassination, aborting")]
    ConcurrentActivityDuringAssassination(Endpoint),

    /// Serialization failure encoding/decoding a wire frame or persisted value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The configured transport failed to deliver a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation's deadline elapsed (e.g. waiting on an echo reply).
    #[error("timeout: {0}")]
    Timeout(String),
}

impl From<bincode::Error> for GossipError {
    fn from(err: bincode::Error) -> Self {
        GossipError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for GossipError {
    fn from(err: serde_json::Error) -> Self {
        GossipError::Serialization(err.to_string())
    }
}
