//! Pod exec endpoints
//!
//! POST   /exec                  - synchronous exec with a deadline (preferred)
//! POST   /exec/start            - legacy streaming exec session
//! POST   /exec/input/{id}       - send stdin to a streaming session
//! GET    /exec/output/{id}      - poll accumulated output
//! DELETE /exec/stop/{id}        - stop a streaming session

use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use kubegate_core::exec::run_captured;
use kubegate_core::{launch, LaunchSpec, ResolvedCluster, SessionBinding, SessionKind, SessionStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::{ApiError, AppState, ClusterHashQuery};

const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 300;

/// Synchronous exec request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecRequest {
    pub namespace: String,
    pub pod_name: String,
    pub container: String,
    pub command: Vec<String>,
    pub kubeconfig: String,
    pub context: String,
    pub cluster_hash: String,
    /// Max seconds to wait (default 300)
    pub timeout: u64,
}

/// Synchronous exec response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponse {
    pub output: String,
    pub exit_code: i32,
    /// Seconds
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Legacy streaming exec start request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecStartRequest {
    pub namespace: String,
    pub pod_name: String,
    pub container: String,
    pub command: Vec<String>,
    pub kubeconfig: String,
    pub context: String,
    pub cluster_hash: String,
}

/// Legacy streaming exec start response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecStartResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
}

/// Streaming exec input request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecInputRequest {
    pub input: String,
    pub cluster_hash: String,
}

/// Streaming exec output response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutputResponse {
    pub output: String,
    pub timestamp: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// Build the `kubectl exec` argument list shared by both exec flavors.
fn exec_args(namespace: &str, pod: &str, container: &str, command: &[String], context: &str) -> Vec<String> {
    let mut args = vec!["exec".to_string(), "-i".to_string()];
    if !context.is_empty() {
        args.push("--context".to_string());
        args.push(context.to_string());
    }
    args.push("-n".to_string());
    args.push(namespace.to_string());
    if !container.is_empty() {
        args.push("-c".to_string());
        args.push(container.to_string());
    }
    args.push(pod.to_string());
    args.push("--".to_string());
    args.extend_from_slice(command);
    args
}

/// POST /exec - run the command to completion under a deadline.
async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecRequest>,
) -> Result<(StatusCode, Json<ExecResponse>), ApiError> {
    let started = Instant::now();

    if req.namespace.is_empty() || req.pod_name.is_empty() || req.command.is_empty() {
        return Err(ApiError::bad_request(
            "Missing required fields: namespace, podName, command",
        ));
    }

    let timeout_secs = if req.timeout == 0 {
        DEFAULT_EXEC_TIMEOUT_SECS
    } else {
        req.timeout
    };

    let cluster = state
        .clusters
        .resolve(&req.cluster_hash, &req.kubeconfig, &req.context)
        .await?;

    let args = exec_args(
        &req.namespace,
        &req.pod_name,
        &req.container,
        &req.command,
        &cluster.context,
    );

    let run = run_captured(
        "kubectl",
        &args,
        &cluster.kubeconfig,
        Duration::from_secs(timeout_secs),
    )
    .await;

    let duration = started.elapsed().as_secs_f64();

    match run {
        Ok(run) if run.timed_out => {
            error!(
                pod = %req.pod_name,
                command = ?req.command,
                timeout = timeout_secs,
                duration,
                "exec timed out"
            );
            Ok((
                StatusCode::GATEWAY_TIMEOUT,
                Json(ExecResponse {
                    output: run.output,
                    exit_code: -1,
                    duration,
                    error: Some(format!("Command timed out after {timeout_secs} seconds")),
                }),
            ))
        }
        Ok(run) => {
            info!(
                pod = %req.pod_name,
                command = ?req.command,
                exit_code = run.exit_code,
                duration,
                output_length = run.output.len(),
                "exec completed"
            );
            Ok((
                StatusCode::OK,
                Json(ExecResponse {
                    output: run.output,
                    exit_code: run.exit_code,
                    duration,
                    error: None,
                }),
            ))
        }
        Err(err) => {
            error!(pod = %req.pod_name, command = ?req.command, %err, duration, "exec failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExecResponse {
                    output: String::new(),
                    exit_code: -1,
                    duration,
                    error: Some(err.to_string()),
                }),
            ))
        }
    }
}

/// POST /exec/start - legacy session-based exec.
async fn start(
    State(state): State<AppState>,
    Json(req): Json<ExecStartRequest>,
) -> Result<Json<ExecStartResponse>, ApiError> {
    if req.namespace.is_empty() || req.pod_name.is_empty() || req.command.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let cluster: ResolvedCluster = state
        .clusters
        .resolve(&req.cluster_hash, &req.kubeconfig, &req.context)
        .await?;

    let session = state
        .sessions
        .create(
            SessionKind::Exec,
            SessionBinding {
                cluster_hash: cluster.hash.clone(),
                context: cluster.context.clone(),
                kubeconfig: cluster.kubeconfig.clone(),
                namespace: req.namespace.clone(),
                pod_name: req.pod_name.clone(),
                container: req.container.clone(),
                command: req.command.clone(),
                ..Default::default()
            },
        )
        .await;

    let args = exec_args(
        &req.namespace,
        &req.pod_name,
        &req.container,
        &req.command,
        &cluster.context,
    );

    let spec = LaunchSpec {
        program: "kubectl".to_string(),
        args,
        kubeconfig: cluster.kubeconfig,
        attach_stdin: true,
    };

    if let Err(err) = launch(&session, spec).await {
        state.sessions.stop(session.id).await;
        return Err(err.into());
    }

    info!(session_id = %session.id, pod = %req.pod_name, command = ?req.command, "exec started");

    Ok(Json(ExecStartResponse {
        session_id: session.id,
        status: session.status().await,
    }))
}

/// POST /exec/input/{id}
async fn input(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ExecInputRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = super::lookup_session(&state, session_id, &req.cluster_hash).await?;
    session.write_input(&req.input).await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

/// GET /exec/output/{id}
async fn output(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ClusterHashQuery>,
) -> Result<Json<ExecOutputResponse>, ApiError> {
    let session = super::lookup_session(&state, session_id, &query.cluster_hash).await?;

    Ok(Json(ExecOutputResponse {
        output: session.read_output().await,
        timestamp: session.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        status: session.status().await,
        exit_code: session.exit_code().await,
    }))
}

/// DELETE /exec/stop/{id}
async fn stop(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ClusterHashQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !query.cluster_hash.is_empty() {
        super::lookup_session(&state, session_id, &query.cluster_hash).await?;
    }

    state.sessions.stop(session_id).await;
    Ok(Json(StatusResponse { status: "stopped" }))
}

/// Create exec routes
pub fn exec_routes(state: AppState) -> Router {
    Router::new()
        .route("/exec", post(execute))
        .route("/exec/start", post(start))
        .route("/exec/input/:session_id", post(input))
        .route("/exec/output/:session_id", get(output))
        .route("/exec/stop/:session_id", delete(stop))
        .with_state(state)
}
