//! Error types for vmrelay-console
//!
//! Errors here are raised before the relay starts; once bytes flow, the
//! session's termination cause describes how it ended instead.

use std::io;
use thiserror::Error;
use vmrelay_core::VmState;

/// Serial console error type
#[derive(Debug, Error)]
pub enum Error {
    /// VM lookup through the management API failed
    #[error("management api error: {0}")]
    Management(#[from] vmrelay_mgmt::Error),

    /// Serial consoles only attach to running VMs
    #[error("VM {vm} is {state}, not running")]
    VmNotRunning {
        /// VM name as given
        vm: String,
        /// Reported state
        state: VmState,
    },

    /// Opening or binding the serial stream failed
    #[error("serial handshake failed: {0}")]
    Handshake(vmrelay_mgmt::Error),

    /// Another session holds the terminal
    #[error("terminal is already captured by another session")]
    TerminalBusy,

    /// Switching the terminal mode failed
    #[error("terminal error: {0}")]
    Terminal(#[source] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Management(vmrelay_mgmt::Error::NotFound(vm)) => {
                format!("VM '{}' was not found.", vm)
            }
            Error::Management(e) => format!("Could not reach the management API: {}", e),
            Error::VmNotRunning { vm, state } => {
                format!("VM '{}' is {}; the serial console needs it running.", vm, state)
            }
            Error::Handshake(e) => format!("Could not open the serial port: {}", e),
            Error::TerminalBusy => "The terminal is already in use by a console.".to_string(),
            Error::Terminal(e) => format!("Could not switch the terminal to raw mode: {}", e),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::Management(
                vmrelay_mgmt::Error::Network(_) | vmrelay_mgmt::Error::Timeout(_),
            ) => Some(
                "Check the [management] base_url setting or VMRELAY_MANAGEMENT__BASE_URL."
                    .to_string(),
            ),
            Error::VmNotRunning { vm, .. } => {
                Some(format!("Start the VM first, then attach to '{}'.", vm))
            }
            Error::Terminal(_) => Some("Run the console from an interactive terminal.".to_string()),
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = Error::VmNotRunning {
            vm: "web-01".to_string(),
            state: VmState::Stopped,
        };
        assert_eq!(
            err.user_message(),
            "VM 'web-01' is stopped; the serial console needs it running."
        );
        assert!(format_error_for_cli(&err).contains("Start the VM first"));

        let err = Error::Management(vmrelay_mgmt::Error::NotFound("ghost".to_string()));
        assert_eq!(format_error_for_cli(&err), "VM 'ghost' was not found.");
    }
}
