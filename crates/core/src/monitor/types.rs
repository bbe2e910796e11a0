//! Transfer supervision types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::torrent_client::TorrentClientError;

/// Errors from polling or controlling a backend's transfers.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("Backend error: {0}")]
    Backend(#[from] TorrentClientError),

    #[error("Backend call timed out")]
    Timeout,

    #[error("No transfer snapshot available yet")]
    NoSnapshot,
}

/// Lifecycle of a transfer as classified by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferLifecycle {
    Downloading,
    /// Actively downloading but without progress for the stall window.
    Stalled,
    Seeding,
    Paused,
    Errored,
    /// Payload complete and not seeding.
    Completed,
    Queued,
    Checking,
}

impl TransferLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferLifecycle::Downloading => "downloading",
            TransferLifecycle::Stalled => "stalled",
            TransferLifecycle::Seeding => "seeding",
            TransferLifecycle::Paused => "paused",
            TransferLifecycle::Errored => "errored",
            TransferLifecycle::Completed => "completed",
            TransferLifecycle::Queued => "queued",
            TransferLifecycle::Checking => "checking",
        }
    }
}

/// One transfer as seen in a single poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferState {
    /// Backend identifier (info hash).
    pub id: String,
    pub name: String,
    pub lifecycle: TransferLifecycle,
    /// Verified payload bytes.
    pub progress_bytes: u64,
    pub size_bytes: u64,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub last_progress_at: DateTime<Utc>,
    /// Consecutive polls without progress.
    pub flat_polls: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TransferState {
    /// Whole payload is present.
    pub fn is_finished(&self) -> bool {
        (self.size_bytes > 0 && self.progress_bytes >= self.size_bytes)
            || matches!(
                self.lifecycle,
                TransferLifecycle::Seeding | TransferLifecycle::Completed
            )
    }
}

/// The full transfer listing from one poll.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Increases by one per successful poll.
    pub seq: u64,
    pub taken_at: DateTime<Utc>,
    pub transfers: Vec<TransferState>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&TransferState> {
        self.transfers.iter().find(|t| t.id == id)
    }

    /// Aggregate (uploaded, downloaded) bytes.
    pub fn totals(&self) -> (u64, u64) {
        self.transfers.iter().fold((0, 0), |(up, down), t| {
            (
                up.saturating_add(t.uploaded_bytes),
                down.saturating_add(t.downloaded_bytes),
            )
        })
    }

    pub fn count(&self, lifecycle: TransferLifecycle) -> usize {
        self.transfers
            .iter()
            .filter(|t| t.lifecycle == lifecycle)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Completed,
    /// The transfer disappeared from the backend listing.
    Vanished,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::Completed => "completed",
            CompletionKind::Vanished => "vanished",
        }
    }
}

/// Raised once per transition into a finished payload, or once when a
/// transfer vanishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub transfer_id: String,
    pub name: String,
    pub kind: CompletionKind,
    pub detected_at: DateTime<Utc>,
    pub prior_state: Option<TransferLifecycle>,
    /// `None` for vanished transfers.
    pub new_state: Option<TransferLifecycle>,
}
