//! Error types for vmrelay-core

use std::io;
use thiserror::Error;

/// Relay error type
///
/// Raised by endpoints, the relay pumps and the liveness monitor. The first
/// error seen by a session becomes its termination cause.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Socket, terminal or stream I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Framed transport failure (WebSocket protocol errors and the like)
    #[error("transport error: {0}")]
    Transport(String),

    /// VM state query failed
    #[error("state query failed: {0}")]
    StateQuery(String),

    /// Reconnecting a failed leg failed
    #[error("redial failed: {0}")]
    Redial(#[source] io::Error),

    /// Operator asked to disconnect
    #[error("disconnect requested")]
    Disconnected,

    /// A relay task panicked or was aborted
    #[error("relay task failed: {0}")]
    Task(String),
}

impl RelayError {
    /// Whether this error is an orderly stop rather than a failure
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
