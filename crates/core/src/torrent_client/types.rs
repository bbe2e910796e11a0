//! Types for torrent client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during torrent client operations.
#[derive(Debug, Clone, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Backend at capacity: {0}")]
    CapacityExceeded(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TorrentClientError {
    /// Classify the error into the failure taxonomy used for routing decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            TorrentClientError::ConnectionFailed(_) => FailureKind::Unreachable,
            TorrentClientError::AuthenticationFailed(_) => FailureKind::AuthFailed,
            TorrentClientError::CapacityExceeded(_) => FailureKind::CapacityExceeded,
            TorrentClientError::InvalidTorrent(_) | TorrentClientError::ApiError(_) => {
                FailureKind::ProtocolError
            }
            TorrentClientError::Timeout => FailureKind::Timeout,
            TorrentClientError::Internal(_) => FailureKind::Unknown,
        }
    }
}

/// Failure taxonomy for remote backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    AuthFailed,
    ProtocolError,
    Timeout,
    CapacityExceeded,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::AuthFailed => "auth_failed",
            FailureKind::ProtocolError => "protocol_error",
            FailureKind::Timeout => "timeout",
            FailureKind::CapacityExceeded => "capacity_exceeded",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Whether the failure says something about the backend as a whole
    /// rather than about the single item that was being submitted.
    pub fn is_backend_wide(&self) -> bool {
        matches!(
            self,
            FailureKind::Unreachable | FailureKind::AuthFailed | FailureKind::Timeout
        )
    }
}

/// State of a torrent as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Downloading from peers.
    Downloading,
    /// Seeding to peers.
    Seeding,
    /// Download or upload is paused.
    Paused,
    /// Checking file integrity.
    Checking,
    /// Queued for download.
    Queued,
    /// Backend reports no peers / no transfer activity.
    Stalled,
    /// Error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl TorrentState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Checking => "checking",
            TorrentState::Queued => "queued",
            TorrentState::Stalled => "stalled",
            TorrentState::Error => "error",
            TorrentState::Unknown => "unknown",
        }
    }
}

/// Information about a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Current state.
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Bytes of the payload verified as complete.
    pub completed_bytes: u64,
    /// Downloaded bytes (session total, including waste).
    pub downloaded_bytes: u64,
    /// Uploaded bytes.
    pub uploaded_bytes: u64,
    /// Category/label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// When the torrent was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

/// Request to add a new torrent.
#[derive(Debug, Clone)]
pub struct AddTorrentRequest {
    /// Magnet URI or .torrent URL.
    pub uri: String,
    /// Optional download path override.
    pub download_path: Option<String>,
    /// Optional category/label.
    pub category: Option<String>,
    /// Start paused.
    pub paused: bool,
}

impl AddTorrentRequest {
    /// Create a request with default options.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            download_path: None,
            category: None,
            paused: false,
        }
    }

    /// Set the download path.
    pub fn with_download_path(mut self, path: impl Into<String>) -> Self {
        self.download_path = Some(path.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, cat: impl Into<String>) -> Self {
        self.category = Some(cat.into());
        self
    }

    /// Set whether to start paused.
    pub fn with_paused(mut self, p: bool) -> Self {
        self.paused = p;
        self
    }
}

/// Filters for listing torrents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentFilters {
    /// Filter by category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TorrentFilters {
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
        }
    }

    /// Check if any filters are set.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
    }
}

/// Result of adding a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTorrentResult {
    /// Info hash of the added torrent, when it can be derived from the request.
    pub hash: Option<String>,
}

/// Trait for torrent client backends.
///
/// Every call after [`TorrentClient::login`] carries the session identifier.
/// Implementations refresh the session transparently when it is missing,
/// expired or rejected.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging/audit.
    fn name(&self) -> &str;

    /// Authenticate with the backend, replacing any cached session.
    async fn login(&self) -> Result<(), TorrentClientError>;

    /// Lightweight authenticated capability call. Returns the API version.
    async fn api_version(&self) -> Result<String, TorrentClientError>;

    /// Add a new torrent.
    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError>;

    /// List all torrents, optionally filtered.
    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError>;

    /// Pause a torrent.
    async fn pause_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Resume a paused torrent.
    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Recheck/verify torrent files.
    async fn recheck_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_state_as_str() {
        assert_eq!(TorrentState::Downloading.as_str(), "downloading");
        assert_eq!(TorrentState::Seeding.as_str(), "seeding");
        assert_eq!(TorrentState::Paused.as_str(), "paused");
        assert_eq!(TorrentState::Stalled.as_str(), "stalled");
        assert_eq!(TorrentState::Error.as_str(), "error");
    }

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            TorrentClientError::ConnectionFailed("refused".into()).kind(),
            FailureKind::Unreachable
        );
        assert_eq!(
            TorrentClientError::AuthenticationFailed("bad".into()).kind(),
            FailureKind::AuthFailed
        );
        assert_eq!(TorrentClientError::Timeout.kind(), FailureKind::Timeout);
        assert_eq!(
            TorrentClientError::ApiError("HTTP 500".into()).kind(),
            FailureKind::ProtocolError
        );
        assert_eq!(
            TorrentClientError::CapacityExceeded("HTTP 507".into()).kind(),
            FailureKind::CapacityExceeded
        );
        assert_eq!(
            TorrentClientError::Internal("?".into()).kind(),
            FailureKind::Unknown
        );
    }

    #[test]
    fn test_backend_wide_failures() {
        assert!(FailureKind::Unreachable.is_backend_wide());
        assert!(FailureKind::AuthFailed.is_backend_wide());
        assert!(FailureKind::Timeout.is_backend_wide());
        assert!(!FailureKind::ProtocolError.is_backend_wide());
        assert!(!FailureKind::CapacityExceeded.is_backend_wide());
    }

    #[test]
    fn test_add_torrent_request_builder() {
        let req = AddTorrentRequest::new("magnet:?xt=urn:btih:abc123")
            .with_download_path("/downloads")
            .with_category("audiobooks")
            .with_paused(true);

        assert_eq!(req.uri, "magnet:?xt=urn:btih:abc123");
        assert_eq!(req.download_path, Some("/downloads".to_string()));
        assert_eq!(req.category, Some("audiobooks".to_string()));
        assert!(req.paused);
    }

    #[test]
    fn test_torrent_filters_is_empty() {
        assert!(TorrentFilters::default().is_empty());
        assert!(!TorrentFilters::category("audiobooks").is_empty());
    }

    #[test]
    fn test_torrent_state_serialization() {
        assert_eq!(
            serde_json::to_string(&TorrentState::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::CapacityExceeded).unwrap(),
            "\"capacity_exceeded\""
        );
    }
}
