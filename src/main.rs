//! KubeGate helper - privileged loopback daemon for the KubeGate desktop app
//!
//! The sandboxed app cannot launch long-lived processes or bind sockets, so
//! it delegates kubectl sessions, credential helpers, and cluster traffic to
//! this daemon over 127.0.0.1:47823.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    init_tracing();

    info!("Starting KubeGate helper v{}", env!("CARGO_PKG_VERSION"));

    let config = server::load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    server::run(config).await
}

/// Initialize tracing. `LOG_LEVEL` (debug|info|warn) picks the default
/// level for the daemon's own crates; `RUST_LOG` overrides everything.
fn init_tracing() {
    let level = match std::env::var("LOG_LEVEL").as_deref() {
        Ok("debug") => "debug",
        Ok("warn") => "warn",
        _ => "info",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("kubegate={level},kubegate_core={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
