//! Tracing initialization.
//!
//! Filtering is controlled by the `RELAY_LOG` environment variable
//! (standard `tracing_subscriber` env-filter syntax), defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling log filtering.
pub const LOG_ENV_VAR: &str = "RELAY_LOG";

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Initialize with an explicit filter directive (used by tests and
/// embedders that manage their own environment).
pub fn init_with_filter(directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directive))
        .with_target(true)
        .try_init();
}
