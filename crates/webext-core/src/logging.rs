//! Tracing subscriber setup for hosts that do not install their own.

use crate::config::{defaults, env_vars};

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` controls the filter; without it `webext_core=info` is used.
/// Set `WEBEXT_LOG_JSON=true` for JSON lines. Calling this more than once,
/// or after the host installed a subscriber, is a no-op.
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(defaults::LOG_FILTER));

    let result = if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!("tracing subscriber installed");
    }
}

/// Subscriber for tests: captured by the test harness, ignores double init.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
