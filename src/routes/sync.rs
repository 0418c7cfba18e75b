//! Sync API endpoints
//!
//! Triggers a sync pass for the calling coach and reports engine status.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::{owner_from, require_owner};
use crate::error::Result;
use crate::state::AppState;
use crate::sync::{SkipReason, SyncOutcome, SyncPhase, SyncStatus, SyncSummary};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(trigger_sync))
        .route("/status", get(get_status))
}

/// Failure details of a pass
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub phase: SyncPhase,
    pub message: String,
}

/// Result of a sync request
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        let success = outcome.is_success();
        match outcome {
            SyncOutcome::Completed(summary) => Self {
                success,
                skipped: None,
                error: None,
                summary: Some(summary),
            },
            SyncOutcome::Skipped(reason) => Self {
                success,
                skipped: Some(reason),
                error: None,
                summary: None,
            },
            SyncOutcome::Failed(failure) => Self {
                success,
                skipped: None,
                error: Some(FailureBody {
                    phase: failure.phase,
                    message: failure.error.to_string(),
                }),
                summary: None,
            },
        }
    }
}

/// The caller's sync status and queued deletions
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: SyncStatus,
    #[serde(rename = "pendingDeletions")]
    pub pending_deletions: i64,
}

/// Run a sync pass for the owner named in the request
async fn trigger_sync(State(state): State<AppState>, headers: HeaderMap) -> Json<SyncResponse> {
    let owner = owner_from(&headers);
    let outcome = state.engine().run_sync(owner.as_ref()).await;
    Json(outcome.into())
}

async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>> {
    let owner = require_owner(&headers)?;
    let pending_deletions = state.store().pending_deletions(&owner).await?;

    Ok(Json(StatusResponse {
        status: state.engine().status(&owner),
        pending_deletions,
    }))
}
