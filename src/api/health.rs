//! Health check and metrics endpoints.
//!
//! Provides:
//! - `/health`: simple "healthy" + version (for load balancers)
//! - `/metrics`: Prometheus text export of the process-wide registry

use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Simple health check (for load balancers)
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus metrics endpoint
async fn metrics_endpoint() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        vmrelay_core::metrics_global::export_prometheus(),
    )
}

/// Create health routes, with `/metrics` only when enabled
pub fn health_routes(metrics_enabled: bool) -> Router {
    let router = Router::new().route("/health", get(health_check));
    if metrics_enabled {
        router.route("/metrics", get(metrics_endpoint))
    } else {
        router
    }
}
