//! Dispatch item and outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::queue::{QueueError, QueueReason};
use crate::torrent_client::extract_info_hash;

/// Errors surfaced by dispatch.
///
/// Backend failures never appear here: they end in fallback or the queue.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Offline queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Admission class of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPriority {
    /// Admitted even during a ratio emergency.
    Essential,
    #[default]
    Discretionary,
}

impl ItemPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemPriority::Essential => "essential",
            ItemPriority::Discretionary => "discretionary",
        }
    }
}

/// A candidate item to submit to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchItem {
    /// Content-addressed identity; unique per payload.
    pub fingerprint: String,
    /// Magnet URI or .torrent URL.
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: ItemPriority,
    /// Add attempts made so far across all dispatches.
    #[serde(default)]
    pub attempts: u32,
    pub first_seen: DateTime<Utc>,
}

impl DispatchItem {
    /// Item with an upstream-supplied fingerprint.
    pub fn new(fingerprint: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            payload: payload.into(),
            category: None,
            priority: ItemPriority::default(),
            attempts: 0,
            first_seen: Utc::now(),
        }
    }

    /// Item whose fingerprint is derived from the payload.
    pub fn from_payload(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self::new(fingerprint_for(&payload), payload)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: ItemPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn essential(self) -> Self {
        self.with_priority(ItemPriority::Essential)
    }
}

/// SHA-256 (hex) of the magnet info hash, or of the trimmed payload when it
/// carries none, so two magnets for the same torrent share a fingerprint.
pub fn fingerprint_for(payload: &str) -> String {
    let key = extract_info_hash(payload).unwrap_or_else(|| payload.trim().to_string());
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Final state of one item after routing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ItemResult {
    Added {
        backend: String,
        hash: Option<String>,
        deduplicated: bool,
    },
    Queued {
        reason: QueueReason,
        error: Option<String>,
    },
}

/// An item a backend accepted.
#[derive(Debug, Clone, Serialize)]
pub struct AddedItem {
    pub fingerprint: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Already accepted earlier; no add call was made.
    pub deduplicated: bool,
}

/// An item written to the offline queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedItem {
    pub fingerprint: String,
    pub reason: QueueReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a dispatch call. Every input item appears in exactly one list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchOutcome {
    pub added: Vec<AddedItem>,
    pub queued: Vec<QueuedItem>,
}

impl DispatchOutcome {
    pub(crate) fn push(&mut self, fingerprint: String, result: ItemResult) {
        match result {
            ItemResult::Added {
                backend,
                hash,
                deduplicated,
            } => self.added.push(AddedItem {
                fingerprint,
                backend,
                hash,
                deduplicated,
            }),
            ItemResult::Queued { reason, error } => self.queued.push(QueuedItem {
                fingerprint,
                reason,
                error,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnet_fingerprint_ignores_case_and_extra_params() {
        let a = fingerprint_for("magnet:?xt=urn:btih:ABCDEF0123&dn=One");
        let b = fingerprint_for("magnet:?dn=Two&xt=urn:btih:abcdef0123&tr=udp://x");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_non_magnet_fingerprint_uses_trimmed_payload() {
        assert_eq!(
            fingerprint_for("  https://tracker.example/file.torrent\n"),
            fingerprint_for("https://tracker.example/file.torrent")
        );
        assert_ne!(
            fingerprint_for("https://tracker.example/a.torrent"),
            fingerprint_for("https://tracker.example/b.torrent")
        );
    }

    #[test]
    fn test_item_defaults_to_discretionary() {
        let item = DispatchItem::from_payload("magnet:?xt=urn:btih:aa");
        assert_eq!(item.priority, ItemPriority::Discretionary);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.essential().priority, ItemPriority::Essential);
    }

    #[test]
    fn test_item_deserializes_without_optional_fields() {
        let json = r#"{"fingerprint":"fp","payload":"magnet:?xt=urn:btih:aa","first_seen":"2024-01-01T00:00:00Z"}"#;
        let item: DispatchItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.priority, ItemPriority::Discretionary);
        assert!(item.category.is_none());
    }

    #[test]
    fn test_outcome_push() {
        let mut outcome = DispatchOutcome::default();
        outcome.push(
            "a".into(),
            ItemResult::Queued {
                reason: QueueReason::RatioEmergency,
                error: None,
            },
        );
        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.queued[0].reason, QueueReason::RatioEmergency);
    }
}
