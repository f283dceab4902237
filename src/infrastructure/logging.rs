//! Logging initialization
//!
//! Console tracing with env-filter control (`RUST_LOG`). Job-scoped messages
//! are additionally mirrored to the queue's log endpoint by the job reporter,
//! which is the channel the dashboard actually watches.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber. Safe to call more than once; later
/// calls are no-ops, which keeps tests that share a process happy.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
