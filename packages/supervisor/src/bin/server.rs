//! Flotilla Supervisor server.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flotilla_supervisor::{
    http, LoggingEvents, Orchestrator, SupervisorConfig, TaskDispatcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SupervisorConfig::from_env();
    let orchestrator = Arc::new(Orchestrator::new(config));
    orchestrator.add_observer(Arc::new(LoggingEvents));
    orchestrator.add_observer(Arc::new(TaskDispatcher::new()));
    Arc::clone(&orchestrator).start();

    let app = http::router(orchestrator.clone());

    let port = std::env::var("PORT").unwrap_or_else(|_| "7070".to_string());
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control-plane port {addr}"))?;

    tracing::info!(addr = %addr, "Supervisor control plane listening");

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Control-plane server error")?;

    orchestrator.stop();
    Ok(())
}
