//! Private Media Server - Main Entry Point
//!
//! Serves private uploads through an authorization-checked endpoint.

use anyhow::{Context, Result};
use tracing::info;

use pm_server::{api, config, db, hooks::HookChain};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pm_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        prefix = %config.private_prefix,
        "Starting Private Media Server"
    );

    // Initialize metadata store
    let store = db::open_store(&config).await?;

    // Build application state
    let state = api::AppState::load(config.clone(), store, HookChain::new()).await;

    // Nothing can be served without the private root
    state
        .media
        .maybe_setup_directories()
        .await
        .with_context(|| {
            format!(
                "could not set up the private uploads directory {}; check the parent directory is writable",
                config.private_dir.display()
            )
        })?;

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
