//! Tracing subscriber setup.
//!
//! Levels: ERROR for failures that end a session or drop data, INFO for
//! contacts, deliveries and route changes, DEBUG for state transitions,
//! TRACE for individual TLVs.

use tracing_subscriber::EnvFilter;

/// Log to stderr; `RUST_LOG` selects the level, `info` by default.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Subscriber for tests; safe to call more than once.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
