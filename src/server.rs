//! Server module for the KubeGate helper
//!
//! Contains configuration loading, the listener, and graceful shutdown.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use kubegate_core::SessionTimeouts;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::api::{self, AppState};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    47823
}

/// Session eviction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Force-stop running sessions with no reads for this many seconds.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    /// Keep stopped sessions visible for this many seconds.
    #[serde(default = "default_completed_timeout")]
    pub completed_timeout_secs: u64,
    /// Evictor wake-up period in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout(),
            completed_timeout_secs: default_completed_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl SessionConfig {
    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            inactivity: Duration::from_secs(self.inactivity_timeout_secs),
            completed: Duration::from_secs(self.completed_timeout_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
        }
    }
}

fn default_inactivity_timeout() -> u64 {
    30 * 60
}

fn default_completed_timeout() -> u64 {
    5 * 60
}

fn default_cleanup_interval() -> u64 {
    60
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // Load default configuration (optional)
        .add_source(File::with_name("config/default").required(false))
        // Override with environment variables (KUBEGATE_ prefix)
        .add_source(
            Environment::with_prefix("KUBEGATE")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Run the daemon until a shutdown signal arrives.
///
/// Shutdown order matters: the evictor is stopped first so no eviction kill
/// races the shutdown path, then every session is stopped, then the HTTP
/// server gets up to 10 seconds to drain in-flight requests.
pub async fn run(config: AppConfig) -> Result<()> {
    let state = AppState::new(config.session.timeouts());
    let app = api::api_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Server listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutting down server...");

    state.sessions.shutdown().await;
    state.sessions.stop_all().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(Duration::from_secs(10), server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(err))) => error!(%err, "Server error during shutdown"),
        Ok(Err(err)) => error!(%err, "Server task failed"),
        Err(_) => warn!("Server forced to shut down after 10s"),
    }

    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
