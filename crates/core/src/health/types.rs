//! Health probe result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    /// The endpoint could not be reached at all.
    Unreachable,
    /// The endpoint answered but rejected the credentials or the session.
    AuthFailed,
    /// The endpoint did not answer within the call timeout.
    Timeout,
    /// Login and the authenticated capability call both succeeded.
    Ok,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Unreachable => "unreachable",
            ProbeStatus::AuthFailed => "auth_failed",
            ProbeStatus::Timeout => "timeout",
            ProbeStatus::Ok => "ok",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeStatus::Ok)
    }
}

/// Last known health of a backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: ProbeStatus,
    pub checked_at: DateTime<Utc>,
    /// API version reported by the capability call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Error detail for unhealthy results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthRecord {
    pub fn healthy(api_version: String) -> Self {
        Self {
            status: ProbeStatus::Ok,
            checked_at: Utc::now(),
            api_version: Some(api_version),
            detail: None,
        }
    }

    pub fn unhealthy(status: ProbeStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            checked_at: Utc::now(),
            api_version: None,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ProbeStatus::AuthFailed).unwrap(),
            "\"AUTH_FAILED\""
        );
        assert_eq!(serde_json::to_string(&ProbeStatus::Ok).unwrap(), "\"OK\"");
    }

    #[test]
    fn test_only_ok_is_healthy() {
        assert!(ProbeStatus::Ok.is_healthy());
        assert!(!ProbeStatus::Unreachable.is_healthy());
        assert!(!ProbeStatus::AuthFailed.is_healthy());
        assert!(!ProbeStatus::Timeout.is_healthy());
    }
}
