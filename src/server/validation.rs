//! Production configuration validation
//!
//! Exposure checks for production deployments.

use super::config::AppConfig;
use tracing::warn;

/// Warn about settings that expose consoles in production
pub fn validate_production_config(config: &AppConfig) {
    let is_production = std::env::var("VMRELAY_ENV")
        .map(|v| v.to_lowercase() == "production")
        .unwrap_or(false);

    if !is_production {
        return;
    }

    if config.server.host == "0.0.0.0" {
        warn!(
            "SECURITY WARNING: Server is binding to all interfaces (0.0.0.0) in production. \
             Consoles are unauthenticated; bind to 127.0.0.1 behind an authenticating proxy."
        );
    }

    if config.management.base_url.starts_with("http://")
        && !config.management.base_url.contains("127.0.0.1")
        && !config.management.base_url.contains("localhost")
    {
        warn!(
            "SECURITY WARNING: Management API is reached over plain HTTP in production. \
             Consider an https:// base_url."
        );
    }
}
