//! HTTP API for the KubeGate helper
//!
//! Endpoint areas:
//! - `/health` — liveness
//! - `/kubectl`, `/exec-auth` — one-shot pass-throughs
//! - `/port-forward/*` — port-forward sessions
//! - `/exec`, `/exec/*` — synchronous and streaming pod exec
//! - `/shell/*` — bash sessions with kubectl context injection
//! - `/proxy/start|stop|list|verify` — proxy supervision
//! - `/proxy/{clusterHash}/*` — content-addressed reverse proxy
//! - `/sessions/cleanup` — mass teardown by cluster

pub mod exec;
pub mod exec_auth;
pub mod health;
pub mod kubectl;
pub mod port_forward;
pub mod proxy;
pub mod proxy_router;
pub mod sessions;
pub mod shell;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use kubegate_core::{ClusterRegistry, Error as CoreError, Session, SessionManager, SessionTimeouts};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared daemon state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub clusters: Arc<ClusterRegistry>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(timeouts: SessionTimeouts) -> Self {
        Self {
            sessions: SessionManager::with_timeouts(timeouts),
            clusters: Arc::new(ClusterRegistry::new()),
            http: reqwest::Client::new(),
        }
    }
}

/// Create the API router with all endpoints.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(health::health_routes())
        .merge(kubectl::kubectl_routes(state.clone()))
        .merge(exec_auth::exec_auth_routes())
        .merge(port_forward::port_forward_routes(state.clone()))
        .merge(exec::exec_routes(state.clone()))
        .merge(shell::shell_routes(state.clone()))
        .merge(sessions::sessions_routes(state.clone()))
        .merge(proxy::proxy_routes(state.clone()))
        .merge(proxy_router::proxy_router_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Error surface for handlers: an HTTP status plus a plain-text body.
///
/// The proxy router's 503/403 responses are the only structured errors; they
/// are built in place so the app can act on them programmatically.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::HashMismatch { .. }
            | CoreError::UnknownClusterHash { .. }
            | CoreError::InputNotSupported => StatusCode::BAD_REQUEST,
            CoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::BinaryNotFound(_) | CoreError::SpawnFailed { .. } | CoreError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Look up a session, enforcing the cluster hash when the caller sent one.
/// A hash mismatch reads as "not found" so callers cannot probe sessions
/// belonging to other clusters.
pub(crate) async fn lookup_session(
    state: &AppState,
    id: Uuid,
    cluster_hash: &str,
) -> Result<Arc<Session>, ApiError> {
    if cluster_hash.is_empty() {
        state
            .sessions
            .get(id)
            .await
            .ok_or_else(|| ApiError::not_found("Session not found"))
    } else {
        state
            .sessions
            .get_with_cluster_validation(id, cluster_hash)
            .await
            .ok_or_else(|| ApiError::not_found("Session not found or cluster mismatch"))
    }
}

/// Optional `?clusterHash=` query used by stop/output endpoints.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ClusterHashQuery {
    pub cluster_hash: String,
}
