//! Dispatch entry point for the upstream feed.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use seedwarden_core::{DispatchItem, DispatchOutcome, ItemPriority};
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

/// Maximum items accepted in one request
const MAX_ITEMS: usize = 500;

/// One candidate item in a dispatch request
#[derive(Debug, Deserialize)]
pub struct DispatchItemBody {
    /// Upstream identity; derived from the payload when omitted
    pub fingerprint: Option<String>,
    /// Magnet URI or .torrent URL
    pub payload: String,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: ItemPriority,
}

#[derive(Debug, Deserialize)]
pub struct DispatchBody {
    pub items: Vec<DispatchItemBody>,
}

#[derive(Debug, Serialize)]
pub struct DispatchErrorResponse {
    pub error: String,
}

impl From<DispatchItemBody> for DispatchItem {
    fn from(body: DispatchItemBody) -> Self {
        let item = match body.fingerprint {
            Some(fingerprint) => DispatchItem::new(fingerprint, body.payload),
            None => DispatchItem::from_payload(body.payload),
        };
        let item = item.with_priority(body.priority);
        match body.category {
            Some(category) => item.with_category(category),
            None => item,
        }
    }
}

fn bad_request(error: impl Into<String>) -> (StatusCode, Json<DispatchErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(DispatchErrorResponse {
            error: error.into(),
        }),
    )
}

/// POST /api/v1/dispatch
///
/// Every item ends up either added to a backend or in the offline queue.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DispatchBody>,
) -> Result<Json<DispatchOutcome>, (StatusCode, Json<DispatchErrorResponse>)> {
    if body.items.is_empty() {
        return Err(bad_request("items must not be empty"));
    }
    if body.items.len() > MAX_ITEMS {
        return Err(bad_request(format!(
            "at most {} items per request",
            MAX_ITEMS
        )));
    }
    if let Some(index) = body.items.iter().position(|i| i.payload.trim().is_empty()) {
        return Err(bad_request(format!("items[{}].payload is empty", index)));
    }
    if let Some(index) = body
        .items
        .iter()
        .position(|i| matches!(i.fingerprint.as_deref(), Some(f) if f.trim().is_empty()))
    {
        return Err(bad_request(format!("items[{}].fingerprint is empty", index)));
    }

    let items: Vec<DispatchItem> = body.items.into_iter().map(DispatchItem::from).collect();
    let outcome = state.router().dispatch(items).await.map_err(|e| {
        error!(error = %e, "Dispatch failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DispatchErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    info!(
        added = outcome.added.len(),
        queued = outcome.queued.len(),
        "Dispatch request handled"
    );
    Ok(Json(outcome))
}
