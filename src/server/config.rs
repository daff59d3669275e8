//! Server configuration types
//!
//! Contains the configuration sections for the proxy server and the console.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default)]
    pub vnc: VncSettings,
    #[serde(default)]
    pub console: ConsoleSettings,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Check every section, collecting all problems
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors: Vec<String> = [
            ConfigValidator::validate_port(self.server.port),
            ConfigValidator::validate_url("management.base_url", &self.management.base_url),
            ConfigValidator::validate_host("vnc.display_host", &self.vnc.display_host),
            ConfigValidator::validate_interval("vnc.poll_interval_ms", self.vnc.poll_interval_ms),
            ConfigValidator::validate_interval(
                "console.poll_interval_ms",
                self.console.poll_interval_ms,
            ),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6080,
        }
    }
}

/// Management API connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ManagementConfig {
    pub fn client_config(&self) -> vmrelay_mgmt::ClientConfig {
        vmrelay_mgmt::ClientConfig::new(&self.base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            base_url: vmrelay_mgmt::DEFAULT_BASE_URL.to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

/// Graphical console proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VncSettings {
    pub display_host: String,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub monitor_vm_state: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl VncSettings {
    pub fn proxy_config(&self) -> vmrelay_vnc::VncConfig {
        vmrelay_vnc::VncConfig {
            display_host: self.display_host.clone(),
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            monitor_vm_state: self.monitor_vm_state,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

impl Default for VncSettings {
    fn default() -> Self {
        Self {
            display_host: "127.0.0.1".to_string(),
            dial_timeout_secs: default_dial_timeout_secs(),
            monitor_vm_state: true,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_dial_timeout_secs() -> u64 {
    5
}

/// Serial console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ConsoleSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Prometheus endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Shared validation logic for the server and the console
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_port(p: u16) -> Result<(), String> {
        if p == 0 {
            Err("Port cannot be 0".to_string())
        } else {
            Ok(())
        }
    }

    pub fn validate_url(key: &str, url: &str) -> Result<(), String> {
        let url = url.trim();
        if url.is_empty() {
            return Err(format!("{} cannot be empty", key));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!(
                "Invalid {} '{}'. Expected an http:// or https:// URL",
                key, url
            ));
        }
        Ok(())
    }

    pub fn validate_host(key: &str, host: &str) -> Result<(), String> {
        if host.trim().is_empty() {
            Err(format!("{} cannot be empty", key))
        } else {
            Ok(())
        }
    }

    pub fn validate_interval(key: &str, ms: u64) -> Result<(), String> {
        if ms == 0 {
            Err(format!("{} must be greater than 0", key))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port() {
        assert!(ConfigValidator::validate_port(0).is_err());
        assert!(ConfigValidator::validate_port(6080).is_ok());
    }

    #[test]
    fn test_validate_url() {
        assert!(ConfigValidator::validate_url("management.base_url", "").is_err());
        assert!(ConfigValidator::validate_url("management.base_url", "   ").is_err());
        assert!(ConfigValidator::validate_url("management.base_url", "ftp://host").is_err());
        assert!(ConfigValidator::validate_url("management.base_url", "https://pve:8006").is_ok());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vnc.proxy_config().poll_interval, Duration::from_secs(1));
        assert!(config.vnc.monitor_vm_state);
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        config.management.base_url = String::new();
        config.console.poll_interval_ms = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("Port"));
        assert!(errors[1].contains("management.base_url"));
    }
}
