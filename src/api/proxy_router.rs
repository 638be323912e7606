//! Content-addressed reverse proxy
//!
//! ANY /proxy/{clusterHash}/* - forward arbitrary Kubernetes API traffic to
//! the kubectl proxy owned by that cluster hash.
//!
//! The invariant enforced here is absolute: a response never comes from a
//! cluster other than the one the client asked for. The hash is validated
//! when the session is selected and re-checked immediately before the
//! request leaves the daemon; a mismatch at the second gate means a bug
//! elsewhere, and the request is refused rather than forwarded.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use kubegate_core::{Session, SessionKind, SessionStatus};
use serde_json::json;
use tracing::{debug, error, info};

use super::AppState;

async fn route_root(
    State(state): State<AppState>,
    Path(cluster_hash): Path<String>,
    req: Request,
) -> Response {
    route(state, cluster_hash, String::new(), req).await
}

async fn route_rest(
    State(state): State<AppState>,
    Path((cluster_hash, rest)): Path<(String, String)>,
    req: Request,
) -> Response {
    route(state, cluster_hash, rest, req).await
}

async fn route(state: AppState, cluster_hash: String, rest: String, req: Request) -> Response {
    let target_path = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{rest}")
    };

    debug!(
        cluster_hash = %cluster_hash,
        path = %target_path,
        method = %req.method(),
        "routing proxy request"
    );

    let Some(session) = select_proxy_session(&state, &cluster_hash).await else {
        error!(
            cluster_hash = %cluster_hash,
            path = %target_path,
            method = %req.method(),
            "no running proxy for cluster hash, helper may have restarted"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "No proxy running for this cluster",
                "clusterHash": cluster_hash,
                "action": "Call POST /proxy/start with kubeconfig and context to start a new proxy",
                "reason": "Helper may have restarted and lost session state",
            })),
        )
            .into_response();
    };

    forward_to_session(&state, session, &cluster_hash, &target_path, req).await
}

/// Select the running proxy session for a cluster hash.
///
/// The stored hash is re-asserted on every candidate; a session that came
/// back from the lookup with a different hash is never used.
pub(crate) async fn select_proxy_session(
    state: &AppState,
    cluster_hash: &str,
) -> Option<Arc<Session>> {
    for sess in state.sessions.find_by_cluster_hash(cluster_hash).await {
        if sess.kind != SessionKind::Proxy || sess.status().await != SessionStatus::Running {
            continue;
        }
        if sess.binding.cluster_hash != cluster_hash {
            error!(
                requested_hash = %cluster_hash,
                session_hash = %sess.binding.cluster_hash,
                session_id = %sess.id,
                "lookup returned proxy with mismatched cluster hash"
            );
            continue;
        }
        return Some(sess);
    }
    None
}

/// Forward a request to the selected proxy session.
///
/// Refuses with 403 if the session's hash does not equal the requested one;
/// no upstream connection is opened in that case.
pub(crate) async fn forward_to_session(
    state: &AppState,
    session: Arc<Session>,
    requested_hash: &str,
    target_path: &str,
    req: Request,
) -> Response {
    if session.binding.cluster_hash != requested_hash {
        error!(
            requested_hash = %requested_hash,
            session_hash = %session.binding.cluster_hash,
            session_id = %session.id,
            context = %session.binding.context,
            port = session.binding.port,
            path = %target_path,
            "cluster hash mismatch before forwarding, refusing request"
        );
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Cluster hash mismatch - refusing to forward request",
                "requestedHash": requested_hash,
                "sessionHash": session.binding.cluster_hash,
                "reason": "Safety check failed - this would return data from the wrong cluster",
            })),
        )
            .into_response();
    }

    let mut target_url = format!("http://127.0.0.1:{}{}", session.binding.port, target_path);
    if let Some(query) = req.uri().query() {
        target_url.push('?');
        target_url.push_str(query);
    }

    info!(
        cluster_hash = %requested_hash,
        context = %session.binding.context,
        port = session.binding.port,
        path = %target_path,
        method = %req.method(),
        session_id = %session.id,
        "forwarding request to kubectl proxy"
    );

    let (parts, body) = req.into_parts();
    let mut headers = parts.headers;
    // The upstream client sets its own Host for the proxy port.
    headers.remove(header::HOST);

    let upstream = state
        .http
        .request(parts.method, &target_url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(err) => {
            error!(
                %err,
                cluster_hash = %requested_hash,
                port = session.binding.port,
                "failed to forward request to kubectl proxy"
            );
            return (
                StatusCode::BAD_GATEWAY,
                format!("Failed to connect to kubectl proxy: {err}"),
            )
                .into_response();
        }
    };

    // Relay status, headers, and body verbatim; the body is streamed so
    // watch-style chunked responses pass through without buffering.
    let mut builder = HttpResponse::builder().status(upstream.status());
    if let Some(header_map) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            header_map.append(name.clone(), value.clone());
        }
    }

    match builder.body(Body::from_stream(upstream.bytes_stream())) {
        Ok(response) => response,
        Err(err) => {
            error!(%err, "failed to assemble proxied response");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Create reverse proxy routes
pub fn proxy_router_routes(state: AppState) -> Router {
    Router::new()
        .route("/proxy/:cluster_hash", any(route_root))
        .route("/proxy/:cluster_hash/*rest", any(route_rest))
        .with_state(state)
}
