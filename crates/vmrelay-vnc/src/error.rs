//! Error types for vmrelay-vnc

use std::io;
use thiserror::Error;
use vmrelay_core::VmState;

/// VNC proxy error type
#[derive(Debug, Error)]
pub enum Error {
    /// The requested VM reference is malformed
    #[error("invalid VM reference '{0}'")]
    InvalidVmRef(String),

    /// Lookup through the management API failed
    #[error(transparent)]
    Management(#[from] vmrelay_mgmt::Error),

    /// The VM exists but has no display to attach to
    #[error("VM {vm} has no display available (state {state}, port {port})")]
    DisplayUnavailable {
        /// VM ID
        vm: String,
        /// Reported state
        state: VmState,
        /// Reported display port
        port: u16,
    },

    /// Connecting to the display service failed
    #[error("cannot reach display at {addr}: {source}")]
    Dial {
        /// Display address
        addr: String,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Short text sent to the viewer before the socket closes
    #[must_use]
    pub fn viewer_message(&self) -> &'static str {
        match self {
            Self::InvalidVmRef(_) => "invalid VM reference",
            Self::Management(vmrelay_mgmt::Error::NotFound(_)) => "VM not found",
            Self::Management(_) => "management API unavailable",
            Self::DisplayUnavailable { .. } => "VM display is not available",
            Self::Dial { .. } => "cannot connect to VM display",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
