//! Ratio governor configuration.

use serde::{Deserialize, Serialize};

/// Thresholds for the upload/download ratio.
///
/// `ratio <= critical_threshold` is an emergency; leaving it requires the
/// ratio to climb above `warning_threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    #[serde(default = "default_critical")]
    pub critical_threshold: f64,

    #[serde(default = "default_warning")]
    pub warning_threshold: f64,

    /// Evaluations and transitions kept for the history endpoint.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_critical() -> f64 {
    1.0
}

fn default_warning() -> f64 {
    1.1
}

fn default_history_limit() -> usize {
    500
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            critical_threshold: default_critical(),
            warning_threshold: default_warning(),
            history_limit: default_history_limit(),
        }
    }
}
