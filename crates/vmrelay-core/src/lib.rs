//! vmrelay Core - Duplex Relay Engine
//!
//! This crate provides the protocol-agnostic pieces shared by the graphical
//! (VNC) and serial consoles:
//! - Endpoint: the receive/send/close abstraction over sockets, terminals and streams
//! - Session: the relay engine pumping bytes between two endpoints
//! - Monitor: VM liveness polling that ends sessions when the VM stops
//! - Utils: process-wide metrics
//! - Shutdown: signal handling and session draining

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod session;
pub mod shutdown;
pub mod utils;
pub mod vm;

pub use endpoint::{Endpoint, EndpointReader, EndpointWriter, IoReader, IoWriter};
pub use error::{RelayError, Result};
pub use monitor::{LivenessMonitor, StateQuery, DEFAULT_POLL_INTERVAL};
pub use session::{
    Cause, RelayMetrics, Session, SessionControl, SessionReport, Side, CLOSE_TIMEOUT,
};
pub use shutdown::{
    shutdown_signal_with_controller, wait_for_shutdown_signal, wait_for_terminate_signal,
    ShutdownController, TaskGuard,
};
pub use utils::{
    metric_names, metrics_global, Counter, Gauge, GaugeGuard, Histogram, MetricsRegistry, Timer,
};
pub use vm::{InteractivePolicy, VmState};
