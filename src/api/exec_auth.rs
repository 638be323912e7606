//! Exec-credential helper endpoint
//!
//! POST /exec-auth - run an arbitrary credential helper (gke-gcloud-auth-plugin,
//! aws-iam-authenticator, ...) and return its captured output

use std::collections::HashMap;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use kubegate_core::exec::run_command;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiError;

const EXEC_AUTH_DEADLINE: Duration = Duration::from_secs(30);

/// exec-auth command request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExecAuthRequest {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// exec-auth command response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecAuthResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

async fn run(Json(req): Json<ExecAuthRequest>) -> Result<Json<ExecAuthResponse>, ApiError> {
    if req.command.is_empty() {
        return Err(ApiError::bad_request("No command provided"));
    }

    debug!(command = %req.command, args = ?req.args, "exec-auth request");

    let result = run_command(&req.command, &req.args, &req.env, EXEC_AUTH_DEADLINE).await?;

    Ok(Json(ExecAuthResponse {
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
    }))
}

/// Create exec-auth routes
pub fn exec_auth_routes() -> Router {
    Router::new().route("/exec-auth", post(run))
}
