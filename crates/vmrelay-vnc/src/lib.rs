//! vmrelay VNC - Graphical console access proxy
//!
//! Bridges a browser WebSocket to a VM's VNC display over TCP. Bytes are
//! relayed opaquely; the RFB protocol is never interpreted.
//!
//! - Proxy: per-connection lifecycle and the `/ws/:vm` route
//! - Viewer: the WebSocket endpoint
//! - Display: the TCP endpoint with a single re-dial on write failure

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod display;
pub mod error;
pub mod proxy;
pub mod validate;
pub mod viewer;

pub use display::{display_endpoint, DisplayDialer, TcpDialer};
pub use error::{Error, Result};
pub use proxy::{Phase, ProxyMetrics, VncConfig, VncProxy};
pub use validate::validate_vm_ref;
