//! Shell session endpoints
//!
//! POST   /shell/start        - run a bash command as a session
//! GET    /shell/output/{id}  - poll accumulated output
//! DELETE /shell/stop/{id}    - stop a session
//! GET    /shell/list         - list shell sessions
//!
//! When a kubectl context is supplied, every `kubectl` invocation inside the
//! command string gets `--context=<ctx>` injected so chained and piped
//! commands all talk to the intended cluster.

use std::sync::OnceLock;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use kubegate_core::{launch, LaunchSpec, SessionBinding, SessionKind, SessionStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{ApiError, AppState, ClusterHashQuery};

/// Shell start request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShellStartRequest {
    /// Full shell command string
    pub command: String,
    pub kubeconfig: String,
    pub context: String,
    pub cluster_hash: String,
}

/// Shell start response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellStartResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
}

/// Shell output response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellOutputResponse {
    pub output: String,
    pub timestamp: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Shell session information
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSessionInfo {
    pub session_id: Uuid,
    pub command: String,
    pub status: SessionStatus,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ShellListResponse {
    pub sessions: Vec<ShellSessionInfo>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<ShellStartRequest>,
) -> Result<Json<ShellStartResponse>, ApiError> {
    if req.command.is_empty() {
        return Err(ApiError::bad_request("No command provided"));
    }

    let cluster = state
        .clusters
        .resolve(&req.cluster_hash, &req.kubeconfig, &req.context)
        .await?;

    let session = state
        .sessions
        .create(
            SessionKind::Shell,
            SessionBinding {
                cluster_hash: cluster.hash.clone(),
                context: cluster.context.clone(),
                kubeconfig: cluster.kubeconfig.clone(),
                shell_command: req.command.clone(),
                ..Default::default()
            },
        )
        .await;

    let mut command = req.command.clone();
    if !cluster.context.is_empty() {
        command = inject_kubectl_context(&command, &cluster.context);
        if command != req.command {
            info!(
                session_id = %session.id,
                context = %cluster.context,
                "injected context into shell command"
            );
        }
    }

    info!(
        session_id = %session.id,
        command = %command,
        cluster_hash = %cluster.hash,
        "starting shell session"
    );

    let spec = LaunchSpec {
        program: "/bin/bash".to_string(),
        args: vec!["-c".to_string(), command],
        kubeconfig: cluster.kubeconfig,
        attach_stdin: false,
    };

    if let Err(err) = launch(&session, spec).await {
        state.sessions.stop(session.id).await;
        return Err(err.into());
    }

    Ok(Json(ShellStartResponse {
        session_id: session.id,
        status: SessionStatus::Running,
    }))
}

async fn output(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ClusterHashQuery>,
) -> Result<Json<ShellOutputResponse>, ApiError> {
    let session = super::lookup_session(&state, session_id, &query.cluster_hash).await?;

    Ok(Json(ShellOutputResponse {
        output: session.read_output().await,
        timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        status: session.status().await,
        exit_code: session.exit_code().await,
    }))
}

async fn stop(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ClusterHashQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !query.cluster_hash.is_empty() {
        super::lookup_session(&state, session_id, &query.cluster_hash).await?;
    }

    state.sessions.stop(session_id).await;
    Ok(Json(MessageResponse {
        message: "Session stopped",
    }))
}

async fn list(State(state): State<AppState>) -> Json<ShellListResponse> {
    let mut sessions = Vec::new();
    for sess in state.sessions.list(SessionKind::Shell).await {
        sessions.push(ShellSessionInfo {
            session_id: sess.id,
            command: sess.binding.shell_command.clone(),
            status: sess.status().await,
            started_at: sess.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            exit_code: sess.exit_code().await,
        });
    }

    Json(ShellListResponse { sessions })
}

/// Inject `--context=<ctx>` after every `kubectl` word in a command string.
///
/// Handles chained (`&&`, `;`, `||`) and piped commands in one pass. The
/// rewrite is deliberately coarse: it matches `kubectl` inside quoted
/// strings too, and skips the whole command if `--context` already appears
/// anywhere in it.
pub(crate) fn inject_kubectl_context(command: &str, context: &str) -> String {
    if context.is_empty() {
        return command.to_string();
    }

    if command.contains("--context") {
        return command.to_string();
    }

    static KUBECTL_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = KUBECTL_PATTERN
        .get_or_init(|| Regex::new(r"\bkubectl\b(\s+)").expect("kubectl pattern compiles"));

    pattern
        .replace_all(command, |caps: &regex::Captures<'_>| {
            format!("kubectl --context={}{}", context, &caps[1])
        })
        .into_owned()
}

/// Create shell routes
pub fn shell_routes(state: AppState) -> Router {
    Router::new()
        .route("/shell/start", post(start))
        .route("/shell/output/:session_id", get(output))
        .route("/shell/stop/:session_id", delete(stop))
        .route("/shell/list", get(list))
        .with_state(state)
}

#[cfg(test)]
mod tests;
