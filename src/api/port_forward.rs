//! Port-forward session endpoints
//!
//! POST   /port-forward/start         - start a kubectl port-forward
//! DELETE /port-forward/stop/{id}     - stop one (optional ?clusterHash=)
//! GET    /port-forward/list          - list active port-forwards

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::SecondsFormat;
use kubegate_core::{launch, LaunchSpec, SessionBinding, SessionKind, SessionStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{ApiError, AppState, ClusterHashQuery};

/// Port-forward start request
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortForwardStartRequest {
    pub namespace: String,
    /// "service" or "pod"; anything else falls back to "pod"
    pub resource_type: String,
    pub resource_name: String,
    pub service_port: String,
    pub local_port: String,
    pub kubeconfig: String,
    pub context: String,
    pub cluster_hash: String,
}

/// Port-forward start response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardStartResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
}

/// Port-forward session information
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardSessionInfo {
    pub session_id: Uuid,
    pub namespace: String,
    pub resource_type: String,
    pub resource_name: String,
    pub service_port: String,
    pub local_port: String,
    pub status: SessionStatus,
    pub started_at: String,
}

#[derive(Debug, Serialize)]
pub struct PortForwardListResponse {
    pub sessions: Vec<PortForwardSessionInfo>,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    status: &'static str,
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<PortForwardStartRequest>,
) -> Result<Json<PortForwardStartResponse>, ApiError> {
    info!(
        namespace = %req.namespace,
        resource_type = %req.resource_type,
        resource_name = %req.resource_name,
        cluster_hash = %req.cluster_hash,
        has_kubeconfig = !req.kubeconfig.is_empty(),
        has_context = !req.context.is_empty(),
        "port-forward request received"
    );

    if req.namespace.is_empty()
        || req.resource_name.is_empty()
        || req.service_port.is_empty()
        || req.local_port.is_empty()
    {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let resource_type = match req.resource_type.as_str() {
        "service" | "pod" => req.resource_type.clone(),
        _ => "pod".to_string(),
    };

    let cluster = state
        .clusters
        .resolve(&req.cluster_hash, &req.kubeconfig, &req.context)
        .await?;

    let session = state
        .sessions
        .create(
            SessionKind::PortForward,
            SessionBinding {
                cluster_hash: cluster.hash.clone(),
                context: cluster.context.clone(),
                kubeconfig: cluster.kubeconfig.clone(),
                namespace: req.namespace.clone(),
                resource_type: resource_type.clone(),
                resource_name: req.resource_name.clone(),
                service_port: req.service_port.clone(),
                local_port: req.local_port.clone(),
                ..Default::default()
            },
        )
        .await;

    let resource = format!("{}/{}", resource_type, req.resource_name);
    let mut args = vec!["port-forward".to_string()];
    if !cluster.context.is_empty() {
        args.push("--context".to_string());
        args.push(cluster.context.clone());
    }
    args.push("-n".to_string());
    args.push(req.namespace.clone());
    args.push(resource.clone());
    args.push(format!("{}:{}", req.local_port, req.service_port));

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

    info!(
        session_id = %session.id,
        resource = %resource,
        ports = %format!("{}:{}", req.local_port, req.service_port),
        "port-forward started"
    );

    Ok(Json(PortForwardStartResponse {
        session_id: session.id,
        status: session.status().await,
    }))
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

async fn list(State(state): State<AppState>) -> Json<PortForwardListResponse> {
    let mut sessions = Vec::new();
    for sess in state.sessions.list(SessionKind::PortForward).await {
        sessions.push(PortForwardSessionInfo {
            session_id: sess.id,
            namespace: sess.binding.namespace.clone(),
            resource_type: sess.binding.resource_type.clone(),
            resource_name: sess.binding.resource_name.clone(),
            service_port: sess.binding.service_port.clone(),
            local_port: sess.binding.local_port.clone(),
            status: sess.status().await,
            started_at: sess.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }

    Json(PortForwardListResponse { sessions })
}

/// Create port-forward routes
pub fn port_forward_routes(state: AppState) -> Router {
    Router::new()
        .route("/port-forward/start", post(start))
        .route("/port-forward/stop/:session_id", delete(stop))
        .route("/port-forward/list", get(list))
        .with_state(state)
}
