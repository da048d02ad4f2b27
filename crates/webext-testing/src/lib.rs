//! Testing utilities for webext-delegate
//!
//! This crate provides testing tools including:
//! - A recording observer with configurable prompt answers
//! - An in-memory tab host
//! - Extension and tab fixtures

pub mod fixtures;
pub mod recorder;
pub mod tab_host;

pub use recorder::{DecisionPolicy, Record, RecordingObserver};
pub use tab_host::InMemoryTabHost;

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    webext_core::logging::init_for_tests();
}
