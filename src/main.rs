//! vmrelay - VM console relay
//!
//! CLI entry point for the VNC proxy server and the serial console.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod cli;
mod server;

/// Default log filter for the server
const DEFAULT_LOG_FILTER: &str = "vmrelay=info,tower_http=info";

/// Default log filter while a console holds the terminal
const CONSOLE_LOG_FILTER: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    init_tracing(cli.is_console());

    if matches!(cli.command, Some(cli::Commands::Serve))
        && !std::path::Path::new("config/default.toml").exists()
    {
        warn!("config/default.toml not found, using embedded defaults.");
    }

    cli::run(cli).await
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env("VMRELAY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default.into())
}

fn init_tracing(console: bool) {
    if console {
        // raw mode owns stdout; keep logs on stderr and quiet
        tracing_subscriber::registry()
            .with(env_filter(CONSOLE_LOG_FILTER))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter(DEFAULT_LOG_FILTER))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
