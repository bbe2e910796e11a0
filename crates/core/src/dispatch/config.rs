//! Dispatch configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the dispatch router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on a single add or probe call (seconds).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Pause before the single retry of a timed-out add (milliseconds).
    #[serde(default = "default_timeout_backoff")]
    pub timeout_backoff_ms: u64,

    /// How long an accepted fingerprint is remembered (seconds).
    /// Should match the backend's own duplicate window.
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,

    /// How long a probe result is trusted (seconds).
    #[serde(default = "default_health_ttl")]
    pub health_ttl_secs: u64,
}

fn default_call_timeout() -> u64 {
    15
}

fn default_timeout_backoff() -> u64 {
    2000
}

fn default_dedup_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_health_ttl() -> u64 {
    30
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            timeout_backoff_ms: default_timeout_backoff(),
            dedup_ttl_secs: default_dedup_ttl(),
            health_ttl_secs: default_health_ttl(),
        }
    }
}

impl DispatchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn timeout_backoff(&self) -> Duration {
        Duration::from_millis(self.timeout_backoff_ms)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.call_timeout(), Duration::from_secs(15));
        assert_eq!(config.timeout_backoff(), Duration::from_secs(2));
        assert_eq!(config.dedup_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.health_ttl(), Duration::from_secs(30));
    }
}
