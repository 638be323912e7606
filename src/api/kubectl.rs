//! One-shot kubectl endpoint
//!
//! POST /kubectl - run a kubectl command and return its captured output

use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use kubegate_core::exec::run_kubectl;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, AppState};

const KUBECTL_DEADLINE: Duration = Duration::from_secs(30);

/// kubectl command request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KubectlRequest {
    pub args: Vec<String>,
    pub kubeconfig: String,
    pub context: String,
    pub cluster_hash: String,
}

/// kubectl command response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubectlResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

async fn run(
    State(state): State<AppState>,
    Json(req): Json<KubectlRequest>,
) -> Result<Json<KubectlResponse>, ApiError> {
    if req.args.is_empty() {
        return Err(ApiError::bad_request("No kubectl arguments provided"));
    }

    let cluster = state
        .clusters
        .resolve(&req.cluster_hash, &req.kubeconfig, &req.context)
        .await?;

    debug!(args = ?req.args, cluster_hash = %cluster.hash, "kubectl request");

    let result = run_kubectl(
        &req.args,
        &cluster.kubeconfig,
        &cluster.context,
        KUBECTL_DEADLINE,
    )
    .await?;

    Ok(Json(KubectlResponse {
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
    }))
}

/// Create kubectl routes
pub fn kubectl_routes(state: AppState) -> Router {
    Router::new()
        .route("/kubectl", post(run))
        .with_state(state)
}
