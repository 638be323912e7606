//! Session cleanup endpoint
//!
//! POST /sessions/cleanup - stop every session bound to a cluster hash.
//! Called by the app when the user removes a cluster or switches away.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};

/// Session cleanup request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionCleanupRequest {
    pub cluster_hash: String,
}

/// Session cleanup response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCleanupResponse {
    pub sessions_removed: usize,
    pub cluster_hash: String,
}

async fn cleanup(
    State(state): State<AppState>,
    Json(req): Json<SessionCleanupRequest>,
) -> Result<Json<SessionCleanupResponse>, ApiError> {
    if req.cluster_hash.is_empty() {
        return Err(ApiError::bad_request("clusterHash is required"));
    }

    info!(cluster_hash = %req.cluster_hash, "cleaning up sessions for cluster");

    let count = state.sessions.cleanup_by_cluster_hash(&req.cluster_hash).await;

    info!(count, cluster_hash = %req.cluster_hash, "cleaned up sessions");

    Ok(Json(SessionCleanupResponse {
        sessions_removed: count,
        cluster_hash: req.cluster_hash,
    }))
}

/// Create session cleanup routes
pub fn sessions_routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/cleanup", post(cleanup))
        .with_state(state)
}
