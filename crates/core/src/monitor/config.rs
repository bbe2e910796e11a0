//! Transfer supervision configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the monitor loop (state polling, stall recovery,
/// completion detection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Backend whose transfers are supervised. Defaults to the first backend
    /// in priority order.
    #[serde(default)]
    pub backend: Option<String>,

    /// Seconds between polls of the backend's transfer list.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Minimum no-progress window before a transfer counts as stalled.
    #[serde(default = "default_stall_window")]
    pub stall_window_secs: u64,

    /// A transfer is restarted at most once per cooldown.
    #[serde(default = "default_restart_cooldown")]
    pub restart_cooldown_secs: u64,

    /// Upper bound on one full monitor cycle.
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Upper bound on a single list or control call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Only supervise transfers in this category.
    #[serde(default)]
    pub category: Option<String>,

    /// Completion events kept for the status surface.
    #[serde(default = "default_recent_events")]
    pub recent_events_limit: usize,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_stall_window() -> u64 {
    600 // 10 minutes
}

fn default_restart_cooldown() -> u64 {
    1800
}

fn default_cycle_timeout() -> u64 {
    120
}

fn default_call_timeout() -> u64 {
    15
}

fn default_recent_events() -> usize {
    256
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backend: None,
            poll_interval_secs: default_poll_interval(),
            stall_window_secs: default_stall_window(),
            restart_cooldown_secs: default_restart_cooldown(),
            cycle_timeout_secs: default_cycle_timeout(),
            call_timeout_secs: default_call_timeout(),
            category: None,
            recent_events_limit: default_recent_events(),
        }
    }
}

impl MonitorConfig {
    /// Consecutive flat polls that make a transfer stalled: enough polls to
    /// cover the stall window, and never fewer than one.
    pub fn stall_polls(&self) -> u32 {
        let poll = self.poll_interval_secs.max(1);
        self.stall_window_secs.div_ceil(poll).max(1) as u32
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stall_window_is_ten_polls() {
        let config = MonitorConfig::default();
        assert_eq!(config.stall_polls(), 10);
    }

    #[test]
    fn test_stall_polls_rounds_up() {
        let config = MonitorConfig {
            poll_interval_secs: 60,
            stall_window_secs: 150,
            ..Default::default()
        };
        assert_eq!(config.stall_polls(), 3);
    }

    #[test]
    fn test_stall_polls_at_least_one() {
        let config = MonitorConfig {
            poll_interval_secs: 60,
            stall_window_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.stall_polls(), 1);
    }
}
