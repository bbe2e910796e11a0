use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Dispatch
    ItemDispatched {
        fingerprint: String,
        backend: String,
        /// Delivery attempts so far, including this one
        attempts: u32,
    },
    /// A backend failed for the whole batch and remaining items moved on.
    BackendFallback {
        backend: String,
        failure: String,
        detail: String,
        items_carried: usize,
    },
    ItemQueued {
        fingerprint: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_error: Option<String>,
    },
    /// A queued item was delivered by a later drain.
    ItemRedelivered {
        fingerprint: String,
        backend: String,
        /// Seconds since the item was first seen
        pending_secs: i64,
    },
    /// Credentials were rejected; this is a configuration problem.
    BackendAuthFailure {
        backend: String,
        detail: String,
    },

    // Ratio governance
    GovernorModeChanged {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ratio: Option<f64>,
    },

    // Transfer supervision
    TransferRestarted {
        transfer_id: String,
        name: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TransferCompleted {
        transfer_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prior_state: Option<String>,
    },
    TransferVanished {
        transfer_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prior_state: Option<String>,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ItemDispatched { .. } => "item_dispatched",
            Self::BackendFallback { .. } => "backend_fallback",
            Self::ItemQueued { .. } => "item_queued",
            Self::ItemRedelivered { .. } => "item_redelivered",
            Self::BackendAuthFailure { .. } => "backend_auth_failure",
            Self::GovernorModeChanged { .. } => "governor_mode_changed",
            Self::TransferRestarted { .. } => "transfer_restarted",
            Self::TransferCompleted { .. } => "transfer_completed",
            Self::TransferVanished { .. } => "transfer_vanished",
        }
    }

    /// The item or transfer the event is about, if any
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::ItemDispatched { fingerprint, .. }
            | Self::ItemQueued { fingerprint, .. }
            | Self::ItemRedelivered { fingerprint, .. } => Some(fingerprint),
            Self::TransferRestarted { transfer_id, .. }
            | Self::TransferCompleted { transfer_id, .. }
            | Self::TransferVanished { transfer_id, .. } => Some(transfer_id),
            _ => None,
        }
    }

    /// The backend endpoint involved, if any
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::ItemDispatched { backend, .. }
            | Self::BackendFallback { backend, .. }
            | Self::ItemRedelivered { backend, .. }
            | Self::BackendAuthFailure { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub subject: Option<String>,
    pub backend: Option<String>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.subject(), None);
        assert_eq!(event.backend(), None);
    }

    #[test]
    fn test_item_dispatched_carries_subject_and_backend() {
        let event = AuditEvent::ItemDispatched {
            fingerprint: "fp-1".to_string(),
            backend: "seedbox".to_string(),
            attempts: 1,
        };
        assert_eq!(event.event_type(), "item_dispatched");
        assert_eq!(event.subject(), Some("fp-1"));
        assert_eq!(event.backend(), Some("seedbox"));
    }

    #[test]
    fn test_fallback_has_backend_only() {
        let event = AuditEvent::BackendFallback {
            backend: "seedbox".to_string(),
            failure: "unreachable".to_string(),
            detail: "connection refused".to_string(),
            items_carried: 3,
        };
        assert_eq!(event.event_type(), "backend_fallback");
        assert_eq!(event.subject(), None);
        assert_eq!(event.backend(), Some("seedbox"));
    }

    #[test]
    fn test_transfer_events_use_transfer_id() {
        let event = AuditEvent::TransferVanished {
            transfer_id: "abc".to_string(),
            name: "Some Book".to_string(),
            prior_state: Some("downloading".to_string()),
        };
        assert_eq!(event.event_type(), "transfer_vanished");
        assert_eq!(event.subject(), Some("abc"));
    }

    #[test]
    fn test_serialize_deserialize_mode_change() {
        let event = AuditEvent::GovernorModeChanged {
            from: "normal".to_string(),
            to: "emergency".to_string(),
            ratio: Some(0.82),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"governor_mode_changed\""));
        assert!(json.contains("\"to\":\"emergency\""));

        let deserialized: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "governor_mode_changed");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let event = AuditEvent::ItemQueued {
            fingerprint: "fp".to_string(),
            reason: "RATIO_EMERGENCY".to_string(),
            last_error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("last_error"));
    }
}
