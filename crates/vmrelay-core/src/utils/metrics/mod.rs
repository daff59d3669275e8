//! Metrics collection for observability
//!
//! Lightweight atomic counters and gauges shared by every relay session in the
//! process, exported in Prometheus text format by the `/metrics` route.

pub mod registry;
pub mod types;

pub use registry::MetricsRegistry;
pub use types::{Counter, Gauge, GaugeGuard, Histogram, Timer};

/// Metric names and help strings used across the workspace
pub mod names {
    /// Viewer WebSocket connections currently open
    pub const ACTIVE_WEBSOCKETS: &str = "vmrelay_active_websocket_connections";
    /// Help text for [`ACTIVE_WEBSOCKETS`]
    pub const ACTIVE_WEBSOCKETS_HELP: &str = "Open viewer WebSocket connections";

    /// Display TCP connections currently open
    pub const ACTIVE_TCP: &str = "vmrelay_active_tcp_connections";
    /// Help text for [`ACTIVE_TCP`]
    pub const ACTIVE_TCP_HELP: &str = "Open TCP connections to VM display services";

    /// Relay sessions currently running
    pub const ACTIVE_SESSIONS: &str = "vmrelay_active_relay_sessions";
    /// Help text for [`ACTIVE_SESSIONS`]
    pub const ACTIVE_SESSIONS_HELP: &str = "Running relay sessions";

    /// Bytes relayed from the operator side (A) to the VM side (B)
    pub const BYTES_TRANSMITTED: &str = "vmrelay_bytes_transmitted_total";
    /// Help text for [`BYTES_TRANSMITTED`]
    pub const BYTES_TRANSMITTED_HELP: &str = "Bytes relayed from operator to VM";

    /// Bytes relayed from the VM side (B) to the operator side (A)
    pub const BYTES_RECEIVED: &str = "vmrelay_bytes_received_total";
    /// Help text for [`BYTES_RECEIVED`]
    pub const BYTES_RECEIVED_HELP: &str = "Bytes relayed from VM to operator";

    /// Relay session lifetimes
    pub const SESSION_DURATION: &str = "vmrelay_session_duration_seconds";
    /// Help text for [`SESSION_DURATION`]
    pub const SESSION_DURATION_HELP: &str = "Relay session duration in seconds";

    /// Display leg re-dials after a failed write
    pub const DISPLAY_REDIALS: &str = "vmrelay_display_redials_total";
    /// Help text for [`DISPLAY_REDIALS`]
    pub const DISPLAY_REDIALS_HELP: &str = "Display TCP re-dials after a failed write";
}

/// Global metrics for the application
pub mod global {
    use super::*;
    use std::sync::OnceLock;

    static REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

    /// Get the global metrics registry
    pub fn registry() -> &'static MetricsRegistry {
        REGISTRY.get_or_init(MetricsRegistry::new)
    }

    /// Export all metrics in Prometheus format
    pub fn export_prometheus() -> String {
        registry().export_prometheus()
    }
}
