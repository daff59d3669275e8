//! Server initialization and main run loop
//!
//! Contains the main `run()` function that starts the VNC proxy server.

use super::config::AppConfig;
use super::loader::load_config;
use super::validation::validate_production_config;
use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use vmrelay_core::{shutdown_signal_with_controller, ShutdownController};
use vmrelay_mgmt::{HttpManagementClient, ManagementApi};
use vmrelay_vnc::VncProxy;

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting vmrelay v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    validate_production_config(&config);

    let shutdown_controller = ShutdownController::new();
    let app = build_router(&config, shutdown_controller.clone())?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_controller(shutdown_controller))
        .await
        .context("HTTP server error")?;

    info!("vmrelay shutdown complete");
    Ok(())
}

/// Build the application router: health, metrics and the VNC proxy
pub fn build_router(config: &AppConfig, shutdown: Arc<ShutdownController>) -> Result<Router> {
    let client = HttpManagementClient::new(config.management.client_config())
        .context("Failed to create management API client")?;
    let api: Arc<dyn ManagementApi> = Arc::new(client);
    info!(base_url = %config.management.base_url, "Management API client initialized");

    let proxy = VncProxy::new(api, config.vnc.proxy_config()).with_shutdown(shutdown);
    info!(
        display_host = %config.vnc.display_host,
        monitor_vm_state = config.vnc.monitor_vm_state,
        "VNC proxy initialized"
    );

    Ok(Router::new()
        .merge(crate::api::health_routes(config.metrics.enabled))
        .merge(proxy.router())
        .route("/", get(|| async { "vmrelay" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}
