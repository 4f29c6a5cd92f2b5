//! Structured logging initialization (component C10).
//!
//! A thin wrapper around `tracing-subscriber`'s `EnvFilter`, the same pattern the rest
//! of the corpus uses: `RUST_LOG` wins if set, otherwise fall back to a caller-given
//! default directive.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber. Safe to call once per process; a second
/// call is a no-op (the underlying `try_init` failure is swallowed) so an embedding
/// application that has already configured its own subscriber is left alone.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
