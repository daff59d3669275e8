//! Error types for vmrelay-mgmt

use thiserror::Error;
use vmrelay_core::RelayError;

/// Management API error type
#[derive(Debug, Error)]
pub enum Error {
    /// No VM matches the given name or ID
    #[error("VM not found: {0}")]
    NotFound(String),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Connection-level failure reaching the API
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The API answered with an error status
    #[error("api error: {0}")]
    Api(String),

    /// The API answered with something we cannot parse
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The serial stream rejected or failed the handshake
    #[error("serial handshake failed: {0}")]
    Handshake(String),
}

/// Management failures seen by a running session are state query failures
impl From<Error> for RelayError {
    fn from(error: Error) -> Self {
        RelayError::StateQuery(error.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
