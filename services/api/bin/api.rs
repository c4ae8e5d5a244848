//! Main Entrypoint for the VoxBridge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the provider client when an API key is configured.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use voxbridge_api::{
    config::Config,
    router::create_router,
    signer::{ElevenLabsSigner, UrlSigner},
    state::AppState,
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Provider Client ---
    let signer: Option<Arc<dyn UrlSigner>> = match &config.elevenlabs_api_key {
        Some(api_key) => Some(Arc::new(ElevenLabsSigner::new(
            &config.provider_api_base,
            api_key,
        ))),
        None => {
            warn!("ELEVENLABS_API_KEY is not set; clients will receive fallback URLs only.");
            None
        }
    };
    if config.agent_id.is_none() {
        warn!("AGENT_ID is not set; clients will report the agent as missing.");
    }

    let bind_address = config.bind_address;
    info!(
        agent_id = config.agent_id.as_deref().unwrap_or("<unset>"),
        api_key_configured = signer.is_some(),
        static_dir = %config.static_dir.display(),
        %bind_address,
        "Service configured. Starting server..."
    );
    let app_state = Arc::new(AppState::new(config, signer));

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
