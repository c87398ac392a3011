//! Endpoint identity and per-endpoint state (C1, C2, §3, §4.1).

pub mod app_state;
pub mod heartbeat;
pub mod identity;
pub mod lifecycle;
pub mod state;

pub use app_state::{is_dead_status, StateEntry, StateKey, DEAD_STATUS_TOKENS};
pub use heartbeat::{HeartbeatState, VersionGenerator};
pub use identity::Endpoint;
pub use lifecycle::{LifecycleMachine, LifecyclePhase, LifecycleTransition};
pub use state::EndpointState;
