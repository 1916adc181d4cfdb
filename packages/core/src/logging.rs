//! Logging setup
//!
//! The crate logs through `tracing` macros only. Host binaries that want output
//! call [`init_tracing`] once at startup; libraries embedding the engine can
//! install their own subscriber instead.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once: later calls leave the first subscriber in place.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
