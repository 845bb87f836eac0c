use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use storefront_tenancy::app::app;
use storefront_tenancy::config;
use storefront_tenancy::services::TenantService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL and TENANCY_* overrides
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    tracing::info!("Starting storefront tenancy in {:?} mode", config.environment);

    let service = Arc::new(
        TenantService::connect(config)
            .await
            .context("failed to connect tenancy backends")?,
    );

    // Allow tests or deployments to override port via env
    let port = std::env::var("STOREFRONT_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Storefront tenancy listening on http://{}", bind_addr);

    axum::serve(listener, app(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.shutdown().await;
    tracing::info!("All tenant connections closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
