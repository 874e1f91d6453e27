//! Logging initialization
//!
//! Components log through the `tracing` facade; this module installs the
//! process-wide subscriber once. Level is overridable with `RUST_LOG`.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize console logging. Safe to call more than once; subsequent
/// calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
