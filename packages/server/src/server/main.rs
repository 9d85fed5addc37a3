// Main entry point for the email extraction API server

use anyhow::{Context, Result};
use server_core::{
    kernel::{build_job_manager, create_storage},
    server::{build_app, AppState},
    Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,server_core=debug,email_extraction=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Email Extraction API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        workers = config.pipeline.worker_pool_size,
        sufficiency_threshold = config.pipeline.sufficiency_threshold,
        "Configuration loaded"
    );

    // Connect storage (runs migrations for Postgres)
    let storage = create_storage(config.database_url.as_deref()).await?;
    tracing::info!(backend = storage.backend, "Storage ready");

    let jobs = build_job_manager(&config.pipeline, &storage)?;
    let state = AppState {
        jobs: jobs.clone(),
        storage_backend: storage.backend,
    };
    let app = build_app(state, &config.allowed_origins);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Fail in-flight results as cancelled rather than leaving them running
    jobs.shutdown();
    jobs.wait_idle(std::time::Duration::from_secs(10)).await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
