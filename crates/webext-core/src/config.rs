//! Configuration defaults and environment overrides.
//!
//! All tunables live here so the controller, negotiator and event bus
//! agree on the same defaults.

/// Default values.
pub mod defaults {
    /// Maximum number of permission decisions pending at once.
    pub const MAX_PENDING_DECISIONS: usize = 64;
    /// Event bus buffer for slow subscribers.
    pub const EVENT_BUS_CAPACITY: usize = 256;
    /// Whether a freshly installed extension is reported ready right away.
    pub const READY_AFTER_INSTALL: bool = true;
    /// Log filter used when `RUST_LOG` is not set.
    pub const LOG_FILTER: &str = "webext_core=info";
}

/// Environment variable names.
pub mod env_vars {
    use super::defaults;

    pub const MAX_PENDING_DECISIONS: &str = "WEBEXT_MAX_PENDING_DECISIONS";
    pub const EVENT_BUS_CAPACITY: &str = "WEBEXT_EVENT_BUS_CAPACITY";
    pub const READY_AFTER_INSTALL: &str = "WEBEXT_READY_AFTER_INSTALL";
    pub const LOG_JSON: &str = "WEBEXT_LOG_JSON";

    /// Pending decision limit from the environment, or the default.
    pub fn max_pending_decisions() -> usize {
        std::env::var(MAX_PENDING_DECISIONS)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults::MAX_PENDING_DECISIONS)
    }

    /// Event bus capacity from the environment, or the default.
    pub fn event_bus_capacity() -> usize {
        std::env::var(EVENT_BUS_CAPACITY)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults::EVENT_BUS_CAPACITY)
    }

    /// Ready-after-install flag from the environment, or the default.
    pub fn ready_after_install() -> bool {
        std::env::var(READY_AFTER_INSTALL)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::READY_AFTER_INSTALL)
    }

    /// Whether logs should be emitted as JSON.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false)
    }
}

/// Permission negotiator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatorConfig {
    /// Upper bound on simultaneously pending decisions.
    pub max_pending: usize,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            max_pending: defaults::MAX_PENDING_DECISIONS,
        }
    }
}

impl NegotiatorConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            max_pending: env_vars::max_pending_decisions(),
        }
    }
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub negotiator: NegotiatorConfig,
    /// Capacity of the broadcast event bus.
    pub event_bus_capacity: usize,
    /// Deliver `ready` immediately after `installed` for new installs and
    /// enabled updates.
    pub ready_after_install: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            negotiator: NegotiatorConfig::default(),
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
            ready_after_install: defaults::READY_AFTER_INSTALL,
        }
    }
}

impl ControllerConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            negotiator: NegotiatorConfig::from_env(),
            event_bus_capacity: env_vars::event_bus_capacity(),
            ready_after_install: env_vars::ready_after_install(),
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.negotiator.max_pending = max_pending;
        self
    }

    pub fn with_event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = capacity;
        self
    }

    pub fn with_ready_after_install(mut self, ready: bool) -> Self {
        self.ready_after_install = ready;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.negotiator.max_pending, defaults::MAX_PENDING_DECISIONS);
        assert_eq!(config.event_bus_capacity, defaults::EVENT_BUS_CAPACITY);
        assert!(config.ready_after_install);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ControllerConfig::default()
            .with_max_pending(2)
            .with_ready_after_install(false);
        assert_eq!(config.negotiator.max_pending, 2);
        assert!(!config.ready_after_install);
    }
}
