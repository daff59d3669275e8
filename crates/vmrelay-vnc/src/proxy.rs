//! VNC access proxy
//!
//! Each viewer connection walks `Accepted → Resolving → Dialing → Relaying →
//! Closed`. Nothing is dialled until the VM reference is valid and the VM has a
//! display; a failed dial is reported to the viewer as one text frame.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use vmrelay_core::{
    metric_names as names, metrics_global, Counter, Gauge, InteractivePolicy, LivenessMonitor,
    MetricsRegistry, RelayMetrics, Session, ShutdownController, DEFAULT_POLL_INTERVAL,
};
use vmrelay_mgmt::{ApiStateQuery, ManagementApi, VmRef, VmStatus};

use crate::display::{display_endpoint, DisplayDialer, TcpDialer};
use crate::error::{Error, Result};
use crate::validate::validate_vm_ref;
use crate::viewer::viewer_endpoint;

/// Default display dial timeout in seconds
const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 5;

/// Proxy settings
#[derive(Debug, Clone)]
pub struct VncConfig {
    /// Host serving VM displays
    pub display_host: String,
    /// TCP connect timeout for the display leg
    pub dial_timeout: Duration,
    /// End sessions when the VM leaves a display-capable state
    pub monitor_vm_state: bool,
    /// State poll interval for the monitor
    pub poll_interval: Duration,
}

impl Default for VncConfig {
    fn default() -> Self {
        Self {
            display_host: "127.0.0.1".to_string(),
            dial_timeout: Duration::from_secs(DEFAULT_DIAL_TIMEOUT_SECS),
            monitor_vm_state: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Connection lifecycle, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// WebSocket upgraded
    Accepted,
    /// Looking up the VM and its display
    Resolving,
    /// Connecting to the display
    Dialing,
    /// Bytes flowing
    Relaying,
    /// Socket closed
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Resolving => write!(f, "resolving"),
            Self::Dialing => write!(f, "dialing"),
            Self::Relaying => write!(f, "relaying"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

fn enter(phase: Phase) {
    debug!(phase = %phase, "VNC connection phase");
}

/// Metric handles used by the proxy
#[derive(Debug, Clone)]
pub struct ProxyMetrics {
    /// Open viewer sockets
    pub websockets: Gauge,
    /// Open display connections
    pub tcp: Gauge,
    /// Display re-dials after a failed write
    pub redials: Counter,
    /// Relay engine metrics
    pub relay: RelayMetrics,
}

impl ProxyMetrics {
    /// Metrics registered in the global registry
    #[must_use]
    pub fn global() -> Self {
        Self::from_registry(metrics_global::registry())
    }

    /// Metrics registered in `registry`
    #[must_use]
    pub fn from_registry(registry: &MetricsRegistry) -> Self {
        Self {
            websockets: registry.gauge(names::ACTIVE_WEBSOCKETS, names::ACTIVE_WEBSOCKETS_HELP),
            tcp: registry.gauge(names::ACTIVE_TCP, names::ACTIVE_TCP_HELP),
            redials: registry.counter(names::DISPLAY_REDIALS, names::DISPLAY_REDIALS_HELP),
            relay: RelayMetrics::from_registry(registry),
        }
    }
}

struct ProxyInner {
    api: Arc<dyn ManagementApi>,
    config: VncConfig,
    metrics: ProxyMetrics,
    shutdown: Option<Arc<ShutdownController>>,
}

/// WebSocket to display proxy
#[derive(Clone)]
pub struct VncProxy {
    inner: Arc<ProxyInner>,
}

impl VncProxy {
    /// Create a proxy resolving VMs through `api`
    pub fn new(api: Arc<dyn ManagementApi>, config: VncConfig) -> Self {
        Self::build(api, config, ProxyMetrics::global(), None)
    }

    fn build(
        api: Arc<dyn ManagementApi>,
        config: VncConfig,
        metrics: ProxyMetrics,
        shutdown: Option<Arc<ShutdownController>>,
    ) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                api,
                config,
                metrics,
                shutdown,
            }),
        }
    }

    /// End every relay when `controller` shuts down, and hold shutdown until
    /// they have closed
    #[must_use]
    pub fn with_shutdown(self, controller: Arc<ShutdownController>) -> Self {
        let inner = &self.inner;
        Self::build(
            inner.api.clone(),
            inner.config.clone(),
            inner.metrics.clone(),
            Some(controller),
        )
    }

    /// Record into `metrics` instead of the global registry
    #[must_use]
    pub fn with_metrics(self, metrics: ProxyMetrics) -> Self {
        let inner = &self.inner;
        Self::build(
            inner.api.clone(),
            inner.config.clone(),
            metrics,
            inner.shutdown.clone(),
        )
    }

    /// Metric handles in use
    #[must_use]
    pub fn metrics(&self) -> &ProxyMetrics {
        &self.inner.metrics
    }

    /// Routes: `GET /ws/:vm` (WebSocket upgrade)
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws/:vm", get(ws_handler))
            .with_state(self.clone())
    }

    /// Drive one upgraded viewer connection to completion
    pub async fn serve_connection(&self, vm: String, socket: WebSocket) {
        let conn_id = Uuid::new_v4();
        let span = info_span!("vnc_connection", conn_id = %conn_id, vm = %vm);
        self.serve_inner(vm, socket).instrument(span).await;
    }

    async fn serve_inner(&self, vm: String, mut socket: WebSocket) {
        let _ws_active = self.inner.metrics.websockets.guard();
        enter(Phase::Accepted);

        if let Err(e) = validate_vm_ref(&vm) {
            warn!(error = %e, "Rejecting VNC connection");
            close_socket(socket, close_code::POLICY, e.viewer_message()).await;
            enter(Phase::Closed);
            return;
        }

        enter(Phase::Resolving);
        let (vm_ref, status) = match self.resolve(&vm).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "VM display lookup failed");
                close_socket(socket, close_code::POLICY, e.viewer_message()).await;
                enter(Phase::Closed);
                return;
            }
        };

        enter(Phase::Dialing);
        let dialer: Arc<dyn DisplayDialer> = Arc::new(TcpDialer::new(
            &self.inner.config.display_host,
            status.display_port,
            self.inner.config.dial_timeout,
        ));
        let conn = match dialer.dial().await {
            Ok(conn) => conn,
            Err(source) => {
                let e = Error::Dial {
                    addr: dialer.addr().to_string(),
                    source,
                };
                warn!(error = %e, "Display dial failed");
                let _ = socket
                    .send(Message::Text(format!("error: {}", e.viewer_message())))
                    .await;
                close_socket(socket, close_code::ERROR, e.viewer_message()).await;
                enter(Phase::Closed);
                return;
            }
        };

        enter(Phase::Relaying);
        let _tcp_active = self.inner.metrics.tcp.guard();
        let _task = self.inner.shutdown.as_ref().map(|s| s.register_task());
        info!(vm_id = %vm_ref.id, addr = dialer.addr(), "Relaying VNC session");

        let viewer = viewer_endpoint(socket);
        let display = display_endpoint(conn, dialer, self.inner.metrics.redials.clone());
        let mut session = match &self.inner.shutdown {
            Some(controller) => Session::with_parent(viewer, display, &controller.token()),
            None => Session::new(viewer, display),
        };
        session = session.with_metrics(self.inner.metrics.relay.clone());
        if self.inner.config.monitor_vm_state {
            let query = Arc::new(ApiStateQuery::new(self.inner.api.clone()));
            session = session.with_monitor(
                LivenessMonitor::new(vm_ref.id.clone(), query, InteractivePolicy::Display)
                    .with_poll_interval(self.inner.config.poll_interval),
            );
        }

        let report = session.run().await;
        enter(Phase::Closed);
        debug!(
            session_id = %report.id,
            cause = %report.cause,
            "VNC connection finished"
        );
    }

    async fn resolve(&self, vm: &str) -> Result<(VmRef, VmStatus)> {
        let vm_ref = self.inner.api.resolve_vm(vm).await?;
        let status = self.inner.api.vm_status(&vm_ref.id).await?;
        if !status.display_available() {
            return Err(Error::DisplayUnavailable {
                vm: vm_ref.id,
                state: status.state,
                port: status.display_port,
            });
        }
        Ok((vm_ref, status))
    }
}

impl fmt::Debug for VncProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VncProxy")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

async fn ws_handler(
    Path(vm): Path<String>,
    State(proxy): State<VncProxy>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move { proxy.serve_connection(vm, socket).await })
}

async fn close_socket(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Viewer went away before close");
    }
}
