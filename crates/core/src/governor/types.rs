//! Ratio governor types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Governor mode. Only `Emergency` changes admission; `Warning` is a label
/// for operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioMode {
    #[default]
    Normal,
    Warning,
    Emergency,
}

impl RatioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioMode::Normal => "normal",
            RatioMode::Warning => "warning",
            RatioMode::Emergency => "emergency",
        }
    }

    /// Value exported on the mode gauge.
    pub fn gauge_value(&self) -> i64 {
        match self {
            RatioMode::Normal => 0,
            RatioMode::Warning => 1,
            RatioMode::Emergency => 2,
        }
    }
}

impl std::fmt::Display for RatioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded mode change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: RatioMode,
    pub to: RatioMode,
    pub ratio: f64,
    pub at: DateTime<Utc>,
}

/// The outcome of one governor evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencySnapshot {
    pub id: Uuid,
    /// `None` when the ratio could not be computed.
    pub ratio: Option<f64>,
    pub mode: RatioMode,
    /// When the current emergency began, if in one.
    pub entered_at: Option<DateTime<Utc>>,
    pub evaluated_at: DateTime<Utc>,
    /// Transfers seeding after this evaluation's actions.
    pub seeding_allocation: usize,
    /// Transfers resumed or restarted by this evaluation.
    pub affected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&RatioMode::Emergency).unwrap(),
            "\"emergency\""
        );
        assert_eq!(RatioMode::default(), RatioMode::Normal);
        assert_eq!(RatioMode::Warning.gauge_value(), 1);
    }
}
