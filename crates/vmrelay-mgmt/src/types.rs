//! VM types exchanged with the management API

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vmrelay_core::{InteractivePolicy, VmState};

/// A resolved VM identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRef {
    /// Stable VM ID
    pub id: String,
    /// Human-readable name
    pub name: String,
}

/// Current VM status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmStatus {
    /// Run state
    pub state: VmState,
    /// Display (VNC) TCP port, 0 when the VM has no display
    pub display_port: u16,
}

impl VmStatus {
    /// Whether a viewer may attach: a display port is assigned and the
    /// framebuffer exists in the current state
    #[must_use]
    pub fn display_available(&self) -> bool {
        self.display_port != 0 && InteractivePolicy::Display.allows(self.state)
    }
}

/// Serial port number, COM1 to COM4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComPort(u8);

impl ComPort {
    /// Lowest port number
    pub const MIN: u8 = 1;
    /// Highest port number
    pub const MAX: u8 = 4;

    /// Port `n`, if within COM1..=COM4
    #[must_use]
    pub fn new(n: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&n).then_some(Self(n))
    }

    /// Port number
    #[must_use]
    pub fn number(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ComPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "com{}", self.0)
    }
}

impl FromStr for ComPort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let digits = lower.strip_prefix("com").unwrap_or(&lower);
        digits
            .parse::<u8>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("invalid serial port '{}', expected com1..com4", s))
    }
}

/// `GET /api/v1/vms/{name_or_id}` body
#[derive(Debug, Deserialize)]
pub(crate) struct VmRecord {
    pub id: String,
    pub name: String,
}

/// `GET /api/v1/vms/{id}/status` body
#[derive(Debug, Deserialize)]
pub(crate) struct StatusRecord {
    pub state: VmState,
    #[serde(default)]
    pub vnc_port: Option<u16>,
}

impl From<StatusRecord> for VmStatus {
    fn from(record: StatusRecord) -> Self {
        Self {
            state: record.state,
            display_port: record.vnc_port.unwrap_or(0),
        }
    }
}

/// First message on a serial stream
#[derive(Debug, Serialize)]
pub(crate) struct SerialHandshake<'a> {
    pub vm_id: &'a str,
}
