//! HTTP/JSON management API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::api::{ManagementApi, SerialStream};
use crate::error::{Error, Result};
use crate::serial::WsSerialStream;
use crate::types::{ComPort, StatusRecord, VmRecord, VmRef, VmStatus};

/// Default management API URL
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8006";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Management client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the management API
    pub base_url: String,
    /// Timeout applied to HTTP requests and the serial WebSocket handshake
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Management API client
#[derive(Debug, Clone)]
pub struct HttpManagementClient {
    config: ClientConfig,
    base: Url,
    client: Client,
}

impl HttpManagementClient {
    /// Create a client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("management URL '{}': {}", config.base_url, e)))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "management URL '{}' must be http(s)",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            base,
            client,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_connect() {
            Error::Network(format!(
                "failed to connect to management API at {}",
                self.config.base_url
            ))
        } else if e.is_timeout() {
            Error::Timeout(self.config.timeout.as_millis() as u64)
        } else {
            Error::Network(e.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, subject: &str) -> Result<T> {
        debug!(url = %url, "Management API request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            let detail: String = body.chars().take(200).collect();
            return Err(Error::Api(format!("status {}: {}", status, detail)));
        }

        serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(format!("{}: {}", e, body)))
    }

    fn serial_url(&self, port: ComPort) -> Url {
        let mut url = self.endpoint(&["serial", &port.to_string()]);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always an allowed scheme change
        let _ = url.set_scheme(scheme);
        url
    }
}

#[async_trait]
impl ManagementApi for HttpManagementClient {
    #[instrument(skip(self))]
    async fn resolve_vm(&self, name_or_id: &str) -> Result<VmRef> {
        let record: VmRecord = self
            .get_json(self.endpoint(&["vms", name_or_id]), name_or_id)
            .await?;
        Ok(VmRef {
            id: record.id,
            name: record.name,
        })
    }

    #[instrument(skip(self))]
    async fn vm_status(&self, vm_id: &str) -> Result<VmStatus> {
        let record: StatusRecord = self
            .get_json(self.endpoint(&["vms", vm_id, "status"]), vm_id)
            .await?;
        Ok(record.into())
    }

    #[instrument(skip(self, port), fields(port = %port))]
    async fn open_serial(&self, port: ComPort) -> Result<Box<dyn SerialStream>> {
        let url = self.serial_url(port);
        debug!(url = %url, "Opening serial stream");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (ws, _response) = tokio::time::timeout(self.config.timeout, connect)
            .await
            .map_err(|_| Error::Timeout(self.config.timeout.as_millis() as u64))?
            .map_err(|e| Error::Handshake(e.to_string()))?;

        Ok(Box::new(WsSerialStream::new(ws)))
    }
}
