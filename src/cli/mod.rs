//! CLI module for vmrelay
//!
//! Provides commands:
//! - `serve`: run the VNC proxy server
//! - `console`: attach the terminal to a VM serial port

use clap::{Parser, Subcommand};
use vmrelay_mgmt::ComPort;

pub mod console;

/// VM console relay
#[derive(Parser, Debug)]
#[command(name = "vmrelay")]
#[command(about = "Graphical and serial console relay for virtual machines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the VNC proxy server
    Serve,
    /// Attach to a VM serial console (Ctrl+\ to disconnect)
    Console {
        /// Serial port: com1, com2, com3 or com4
        port: ComPort,
        /// VM name or ID
        vm: String,
    },
}

impl Cli {
    /// Whether the terminal will be in raw mode, so logs must stay off stdout
    pub fn is_console(&self) -> bool {
        matches!(self.command, Some(Commands::Console { .. }))
    }
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Console { port, vm }) => console::run(&vm, port).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console() {
        let cli = Cli::try_parse_from(["vmrelay", "console", "com2", "web-01"]).unwrap();
        assert!(cli.is_console());
        match cli.command {
            Some(Commands::Console { port, vm }) => {
                assert_eq!(port.number(), 2);
                assert_eq!(vm, "web-01");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_port() {
        assert!(Cli::try_parse_from(["vmrelay", "console", "com5", "web-01"]).is_err());
        assert!(Cli::try_parse_from(["vmrelay", "console", "com1"]).is_err());
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["vmrelay", "serve"]).unwrap();
        assert!(!cli.is_console());
    }
}
