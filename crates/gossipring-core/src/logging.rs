//! Structured logging setup (grounded on the teacher's telemetry crate's
//! `tracing-subscriber` stack). This crate only emits `tracing` events;
//! it never installs a global subscriber itself — only binaries and
//! tests call [`init_tracing`].

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `tracing-subscriber` fmt layer driven by `RUST_LOG`
/// (defaulting to `info`). Intended for binaries and integration tests,
/// never for library code.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
