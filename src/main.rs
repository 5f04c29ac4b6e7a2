use anyhow::{Context, Result};
use cabtrack::config;
use cabtrack::ingest::IngestionMultiplexer;
use cabtrack::CabTrackService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cabtrack=info,tower_http=info".into()),
        )
        .init();

    info!("Cabtrack starting...");

    let config_path = std::env::var("CABTRACK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("cabtrack.toml"));
    let config = config::load(&config_path)?;

    let bind_addr = format!("{}:{}", config.server.bind_addr, config.server.port);

    let service = CabTrackService::start(config).await?;
    info!(cabs = service.store().len(), "Cab store ready");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "HTTP server listening");

    let app = service
        .router()
        .into_make_service_with_connect_info::<SocketAddr>();

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service.multiplexer()))
        .await
    {
        error!(error = %e, "HTTP server error");
    }

    info!("HTTP server stopped, draining pipeline");
    service.shutdown().await?;
    info!("Cabtrack stopped");

    Ok(())
}

/// Resolve on Ctrl-C and close every ingestion stream
async fn shutdown_signal(mux: Arc<IngestionMultiplexer>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    mux.shutdown();
}
