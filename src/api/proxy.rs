//! Proxy supervision endpoints
//!
//! POST   /proxy/start          - start (or reuse) a kubectl proxy for a cluster
//! DELETE /proxy/stop/{id}      - stop one (optional ?clusterHash=)
//! GET    /proxy/list           - list proxy sessions
//! GET    /proxy/verify/{hash}  - canonical proxy record for a cluster hash
//!
//! At most one running proxy exists per cluster hash, each on the
//! deterministic port for its hash. A foreign cluster squatting on the
//! assigned port is preempted before the new proxy starts.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use kubegate_core::{
    assign_port, launch, LaunchSpec, Session, SessionBinding, SessionKind, SessionManager,
    SessionStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{ApiError, AppState, ClusterHashQuery};

/// Readiness probe: 30 iterations of 100 ms each (3 s budget).
const READINESS_ATTEMPTS: u32 = 30;
const READINESS_INTERVAL: Duration = Duration::from_millis(100);
const READINESS_DIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Proxy start request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyStartRequest {
    /// Ignored: the port is always derived from the cluster hash to keep
    /// routing content-addressed. Logged when it disagrees.
    pub port: u16,
    pub kubeconfig: String,
    pub context: String,
    pub cluster_hash: String,
}

/// Proxy start response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStartResponse {
    pub session_id: Uuid,
    pub port: u16,
    /// Route subsequent requests via /proxy/{clusterHash}/*
    pub cluster_hash: String,
    pub status: SessionStatus,
}

/// Proxy session information
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySessionInfo {
    pub session_id: Uuid,
    pub port: u16,
    pub context: String,
    pub status: SessionStatus,
    pub started_at: String,
}

#[derive(Debug, Serialize)]
pub struct ProxyListResponse {
    pub sessions: Vec<ProxySessionInfo>,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    status: &'static str,
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<ProxyStartRequest>,
) -> Result<Json<ProxyStartResponse>, ApiError> {
    let cluster = state
        .clusters
        .resolve(&req.cluster_hash, &req.kubeconfig, &req.context)
        .await?;

    // Reuse a running proxy for this cluster if its context matches too;
    // the hash collapses (kubeconfig, context) to 64 bits, so the context
    // check rules out the unlikely collision case.
    if let Some(existing) = find_reusable(&state.sessions, &cluster.hash, &cluster.context).await {
        info!(
            session_id = %existing.id,
            cluster_hash = %cluster.hash,
            context = %cluster.context,
            port = existing.binding.port,
            "reusing existing proxy for cluster"
        );
        return Ok(Json(ProxyStartResponse {
            session_id: existing.id,
            port: existing.binding.port,
            cluster_hash: cluster.hash,
            status: existing.status().await,
        }));
    }

    let assigned_port = assign_port(&cluster.hash);
    if req.port != 0 && req.port != assigned_port {
        warn!(
            requested_port = req.port,
            assigned_port,
            cluster_hash = %cluster.hash,
            "ignoring app-provided proxy port in favor of the deterministic one"
        );
    }

    info!(
        cluster_hash = %cluster.hash,
        port = assigned_port,
        context = %cluster.context,
        "assigned deterministic port for cluster"
    );

    preempt_conflicting(&state.sessions, &cluster.hash, assigned_port).await;

    let session = state
        .sessions
        .create(
            SessionKind::Proxy,
            SessionBinding {
                cluster_hash: cluster.hash.clone(),
                context: cluster.context.clone(),
                kubeconfig: cluster.kubeconfig.clone(),
                port: assigned_port,
                ..Default::default()
            },
        )
        .await;

    let mut args = vec!["proxy".to_string()];
    if !cluster.context.is_empty() {
        args.push("--context".to_string());
        args.push(cluster.context.clone());
    }
    args.push("--port".to_string());
    args.push(assigned_port.to_string());

    info!(
        session_id = %session.id,
        cluster_hash = %cluster.hash,
        context = %cluster.context,
        port = assigned_port,
        "starting new proxy session"
    );

    let spec = LaunchSpec {
        program: "kubectl".to_string(),
        args,
        kubeconfig: cluster.kubeconfig,
        attach_stdin: false,
    };

    if let Err(err) = launch(&session, spec).await {
        state.sessions.stop(session.id).await;
        return Err(err.into());
    }

    if let Err(err) = wait_until_listening(&session, assigned_port).await {
        state.sessions.stop(session.id).await;
        error!(
            port = assigned_port,
            context = %cluster.context,
            "kubectl proxy did not become ready"
        );
        return Err(err);
    }

    info!(
        session_id = %session.id,
        port = assigned_port,
        context = %cluster.context,
        "proxy started and verified"
    );

    Ok(Json(ProxyStartResponse {
        session_id: session.id,
        port: assigned_port,
        cluster_hash: cluster.hash,
        status: session.status().await,
    }))
}

/// Find a running proxy session for the cluster hash whose context also
/// matches. Same hash with a different context is never reused.
pub(crate) async fn find_reusable(
    sessions: &SessionManager,
    cluster_hash: &str,
    context: &str,
) -> Option<Arc<Session>> {
    for sess in sessions.find_by_cluster_hash(cluster_hash).await {
        if sess.kind != SessionKind::Proxy || sess.status().await != SessionStatus::Running {
            continue;
        }
        if sess.binding.context != context {
            warn!(
                session_id = %sess.id,
                existing_context = %sess.binding.context,
                requested_context = %context,
                cluster_hash = %cluster_hash,
                "found proxy with same hash but different context, not reusing"
            );
            continue;
        }
        return Some(sess);
    }
    None
}

/// Stop every proxy session squatting on `port` for a different cluster.
/// This is the only path by which a running proxy is preempted.
pub(crate) async fn preempt_conflicting(
    sessions: &SessionManager,
    cluster_hash: &str,
    port: u16,
) -> usize {
    let mut stopped = 0;
    for sess in sessions.list(SessionKind::Proxy).await {
        if sess.binding.port == port && sess.binding.cluster_hash != cluster_hash {
            warn!(
                session_id = %sess.id,
                evicted_cluster_hash = %sess.binding.cluster_hash,
                evicted_context = %sess.binding.context,
                new_cluster_hash = %cluster_hash,
                port,
                "stopping proxy from different cluster on assigned port"
            );
            sessions.stop(sess.id).await;
            stopped += 1;
        }
    }
    stopped
}

/// Poll until the proxy accepts TCP connections or the budget runs out.
async fn wait_until_listening(session: &Arc<Session>, port: u16) -> Result<(), ApiError> {
    for _ in 0..READINESS_ATTEMPTS {
        tokio::time::sleep(READINESS_INTERVAL).await;

        // kubectl proxy can start and then die immediately (auth errors,
        // port already bound by a non-session process).
        if session.status().await != SessionStatus::Running {
            return Err(ApiError::internal(
                "kubectl proxy failed to start (process exited)",
            ));
        }

        let dial = TcpStream::connect(("127.0.0.1", port));
        if let Ok(Ok(_)) = tokio::time::timeout(READINESS_DIAL_TIMEOUT, dial).await {
            return Ok(());
        }
    }

    Err(ApiError::internal(
        "kubectl proxy failed to start listening on port",
    ))
}

async fn stop(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ClusterHashQuery>,
) -> Result<Json<StopResponse>, ApiError> {
    if !query.cluster_hash.is_empty() {
        super::lookup_session(&state, session_id, &query.cluster_hash).await?;
    }

    state.sessions.stop(session_id).await;
    Ok(Json(StopResponse { status: "stopped" }))
}

async fn list(State(state): State<AppState>) -> Json<ProxyListResponse> {
    let mut sessions = Vec::new();
    for sess in state.sessions.list(SessionKind::Proxy).await {
        sessions.push(ProxySessionInfo {
            session_id: sess.id,
            port: sess.binding.port,
            context: sess.binding.context.clone(),
            status: sess.status().await,
            started_at: sess.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }

    Json(ProxyListResponse { sessions })
}

/// GET /proxy/verify/{clusterHash} - the canonical proxy record for a hash,
/// so the app can sanity-check its routing before issuing traffic.
async fn verify(State(state): State<AppState>, Path(cluster_hash): Path<String>) -> Response {
    let mut proxy_session = None;
    for sess in state.sessions.find_by_cluster_hash(&cluster_hash).await {
        if sess.kind == SessionKind::Proxy
            && sess.status().await == SessionStatus::Running
            && sess.binding.cluster_hash == cluster_hash
        {
            proxy_session = Some(sess);
            break;
        }
    }

    let Some(sess) = proxy_session else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "found": false,
                "clusterHash": cluster_hash,
                "error": "No running proxy found for this cluster hash",
            })),
        )
            .into_response();
    };

    let status = sess.status().await;
    Json(json!({
        "found": true,
        "clusterHash": sess.binding.cluster_hash,
        "context": sess.binding.context,
        "port": sess.binding.port,
        "sessionId": sess.id,
        "status": status,
        "startedAt": sess.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
    .into_response()
}

/// Create proxy supervision routes
pub fn proxy_routes(state: AppState) -> Router {
    Router::new()
        .route("/proxy/start", post(start))
        .route("/proxy/stop/:session_id", delete(stop))
        .route("/proxy/list", get(list))
        .route("/proxy/verify/:cluster_hash", get(verify))
        .with_state(state)
}
