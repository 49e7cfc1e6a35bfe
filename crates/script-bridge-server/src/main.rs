//! Script bridge server.
//!
//! Run with: cargo run -p script-bridge-server
//!
//! Clients connect to ws://localhost:3000/ws, send `{"scriptId": 2, "params": []}`
//! and receive the script's output until `SCRIPT_FINISHED`.

mod config;

use std::sync::Arc;

use anyhow::Context;
use script_bridge_executor::ProcessSpawner;
use script_bridge_session::SessionManager;
use script_bridge_transport::create_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let registry = config.load_registry().context("failed to load task catalog")?;

    let spawner = ProcessSpawner::with_working_dir(config.scripts_dir.clone());
    let manager = Arc::new(SessionManager::new(registry, spawner));
    let app = create_router(Arc::clone(&manager));

    // Start server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server running at http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    manager.close_all().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }

    tracing::info!("Shutdown signal received");
}
