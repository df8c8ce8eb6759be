use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use payflow_server::api::{router, ApiState};
use payflow_server::config::Config;
use payflow_server::{SqliteRepository, WorkflowService};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting payflow {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let db_path = config.db_path();
    info!("Using state database: {}", db_path.display());
    let repo = SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?;

    let service = WorkflowService::new(Arc::new(repo), config.page_limits());
    let app = router(Arc::new(ApiState { service }));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
