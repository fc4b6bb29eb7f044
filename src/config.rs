//! Runtime configuration for the state core.
//!
//! All values are frozen at construction and shared read-only across
//! operations. There are no mutable globals.

use std::time::Duration;

/// Configuration for TTLs, throttles, and batch limits.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// TTL for cached user bundles.
    pub bundle_ttl: Duration,
    /// TTL for heartbeat summary keys; absence of the key means offline.
    pub heartbeat_ttl: Duration,
    /// Minimum interval between durable last-activity writes per user.
    pub activity_throttle: Duration,
    /// Maximum number of identifiers accepted by a batch operation.
    pub max_batch: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            bundle_ttl: Duration::from_secs(300),
            heartbeat_ttl: Duration::from_secs(300),
            activity_throttle: Duration::from_secs(60),
            max_batch: 500,
        }
    }
}

impl StateConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bundle TTL.
    pub fn with_bundle_ttl(mut self, ttl: Duration) -> Self {
        self.bundle_ttl = ttl;
        self
    }

    /// Set the heartbeat summary TTL.
    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    /// Set the last-activity write throttle window.
    pub fn with_activity_throttle(mut self, window: Duration) -> Self {
        self.activity_throttle = window;
        self
    }

    /// Set the maximum batch size.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StateConfig::default();
        assert_eq!(config.bundle_ttl, Duration::from_secs(300));
        assert_eq!(config.heartbeat_ttl, Duration::from_secs(300));
        assert_eq!(config.activity_throttle, Duration::from_secs(60));
        assert_eq!(config.max_batch, 500);
    }

    #[test]
    fn test_builder() {
        let config = StateConfig::new()
            .with_bundle_ttl(Duration::from_secs(60))
            .with_heartbeat_ttl(Duration::from_secs(30))
            .with_activity_throttle(Duration::from_secs(10))
            .with_max_batch(100);

        assert_eq!(config.bundle_ttl, Duration::from_secs(60));
        assert_eq!(config.heartbeat_ttl, Duration::from_secs(30));
        assert_eq!(config.activity_throttle, Duration::from_secs(10));
        assert_eq!(config.max_batch, 100);
    }
}
