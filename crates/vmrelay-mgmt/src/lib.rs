//! vmrelay Management - Management API collaborator
//!
//! The consoles never talk to the hypervisor directly. Everything they need
//! comes through [`ManagementApi`]:
//! - VM name/ID resolution and status (HTTP/JSON)
//! - Serial port streams (WebSocket, JSON handshake then binary frames)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod client;
pub mod error;
pub mod serial;
pub mod types;

pub use api::{ApiStateQuery, ManagementApi, SerialStream};
pub use client::{ClientConfig, HttpManagementClient, DEFAULT_BASE_URL};
pub use error::{Error, Result};
pub use serial::WsSerialStream;
pub use types::{ComPort, VmRef, VmStatus};
