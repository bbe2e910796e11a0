//! Ratio governor handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use seedwarden_core::{EmergencySnapshot, GovernorConfig, ModeTransition, RatioMode};
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GovernorResponse {
    pub mode: RatioMode,
    pub thresholds: GovernorConfig,
    pub last_evaluation: Option<EmergencySnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub evaluations: Vec<EmergencySnapshot>,
    pub transitions: Vec<ModeTransition>,
}

/// GET /api/v1/governor
pub async fn get_governor(State(state): State<Arc<AppState>>) -> Json<GovernorResponse> {
    let governor = state.governor();
    Json(GovernorResponse {
        mode: governor.mode(),
        thresholds: governor.config().clone(),
        last_evaluation: governor.last_evaluation(),
    })
}

/// GET /api/v1/governor/history
pub async fn get_history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let governor = state.governor();
    Json(HistoryResponse {
        evaluations: governor.history(),
        transitions: governor.transitions(),
    })
}

/// POST /api/v1/governor/recheck
///
/// Runs an evaluation now. Concurrent rechecks share one evaluation.
pub async fn recheck(State(state): State<Arc<AppState>>) -> Json<EmergencySnapshot> {
    Json(state.governor().evaluate().await)
}
