//! Proofset Uploader Server
//!
//! Serves serialized two-phase uploads over HTTP, backed by the in-process
//! sandbox storage network.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proofset_uploader::config::Config;
use proofset_uploader::events::NoopSink;
use proofset_uploader::network::SandboxNetwork;
use proofset_uploader::routes;
use proofset_uploader::state::AppState;
use proofset_uploader::upload::{UploadLock, UploadOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "proofset_uploader=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Proofset Uploader v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Sandbox providers: {}", config.sandbox.providers.join(", "));
    tracing::info!("Sandbox allowance: {} bytes", config.sandbox.allowance);

    // Storage network and upload core
    let network = Arc::new(SandboxNetwork::new(config.sandbox.clone()));
    let events = Arc::new(NoopSink);
    let orchestrator = UploadOrchestrator::new(
        network,
        UploadLock::new(events.clone()),
        events,
        config.upload.clone(),
    );

    // Drop finished upload records
    orchestrator
        .tracker()
        .clone()
        .start_cleanup_task(config.upload.record_retention_hours);

    let app_state = AppState::new(config.clone(), orchestrator);
    let app = routes::app(app_state.clone());

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Proofset Uploader listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state.clone()))
        .await
        .context("server error")?;

    // Answered uploads may still be waiting for confirmation
    let grace = config.upload.shutdown_grace();
    match tokio::time::timeout(grace, app_state.drain()).await {
        Ok(count) => tracing::info!("Drained {} upload run(s)", count),
        Err(_) => tracing::warn!(
            "Upload runs still unconfirmed after {}s, exiting anyway",
            grace.as_secs()
        ),
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
///
/// Stops admitting uploads as soon as a signal arrives.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }

    state.shutdown();
}
