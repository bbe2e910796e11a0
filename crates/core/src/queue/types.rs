//! Offline queue types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::dispatch::DispatchItem;

/// Errors from the offline queue file.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue serialization error: {0}")]
    Serialization(String),

    /// The queue file exists but cannot be parsed. It is left untouched.
    #[error("Queue file {path} is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

/// Why an item ended up in the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueReason {
    /// No backend was healthy (or reachable through the VPN).
    AllBackendsUnavailable,
    /// At least one healthy backend refused the item.
    AllBackendsRejected,
    /// Discretionary item held back while the ratio is in emergency.
    RatioEmergency,
    /// Dispatch was stopped before the item was attempted everywhere.
    DispatchCancelled,
}

impl QueueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueReason::AllBackendsUnavailable => "ALL_BACKENDS_UNAVAILABLE",
            QueueReason::AllBackendsRejected => "ALL_BACKENDS_REJECTED",
            QueueReason::RatioEmergency => "RATIO_EMERGENCY",
            QueueReason::DispatchCancelled => "DISPATCH_CANCELLED",
        }
    }
}

impl std::fmt::Display for QueueReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An undeliverable item as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub item: DispatchItem,
    pub reason: QueueReason,
    pub queued_at: DateTime<Utc>,
    /// Last failure detail, for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueRecord {
    pub fn new(item: DispatchItem, reason: QueueReason) -> Self {
        Self {
            item,
            reason,
            queued_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn fingerprint(&self) -> &str {
        &self.item.fingerprint
    }

    pub fn is_stale(&self, retention: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.queued_at > retention
    }
}

/// What happened to one record during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A backend accepted it; the record is removed.
    Accepted { backend: String },
    /// Still undeliverable; the record stays with an updated reason.
    Retained {
        reason: QueueReason,
        error: Option<String>,
    },
    /// Not attempted; the record stays unchanged.
    Skipped,
}

/// Summary of a drain pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    /// Fingerprints delivered and removed.
    pub delivered: Vec<String>,
    pub retained: usize,
    pub skipped: usize,
    /// Records past the retention horizon after the drain.
    pub stale: usize,
}
