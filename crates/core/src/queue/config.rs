//! Offline queue configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the offline queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// JSON file holding queued records.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Records older than this are reported as stale (never deleted).
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// How often the supervisor replays the queue (seconds).
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from("offline_queue.json")
}

fn default_retention_hours() -> u64 {
    72
}

fn default_drain_interval() -> u64 {
    300 // 5 minutes
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            retention_hours: default_retention_hours(),
            drain_interval_secs: default_drain_interval(),
        }
    }
}
