//! Logging setup for provider processes
//!
//! A provider's stdout belongs to the host protocol, so logs go to stderr.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "info";

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber, honoring `RUST_LOG` (default `info`).
///
/// Does nothing if a subscriber is already installed.
pub fn init_logging() {
    let _ = try_init_logging(DEFAULT_DIRECTIVE);
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn try_init_logging(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(default_directive))
        .with_ansi(false)
        .try_init()
        .is_ok()
}
