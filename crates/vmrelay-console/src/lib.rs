//! vmrelay Console - Serial console relay
//!
//! Attaches the local terminal to a VM serial port:
//! - Relay: the console state machine from handshake to restore
//! - Terminal: raw mode capture with guaranteed restore
//! - Sentinel: the Ctrl+\ disconnect key

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod relay;
pub mod sentinel;
pub mod terminal;

pub use error::{format_error_for_cli, Error, Result, UserFriendlyError};
pub use relay::{status_line, ConsoleOutcome, ConsolePhase, ConsoleRelay};
pub use sentinel::{SentinelReader, DISCONNECT_BYTE, DISCONNECT_HINT};
pub use terminal::{CrosstermTerminal, RawModeGuard, Terminal, TerminalMode};
