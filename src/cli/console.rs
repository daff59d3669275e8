//! `vmrelay console` - attach the local terminal to a VM serial port

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vmrelay_console::{format_error_for_cli, ConsoleRelay, Terminal};
use vmrelay_core::wait_for_terminate_signal;
use vmrelay_mgmt::{ComPort, HttpManagementClient, ManagementApi};

use crate::server::load_config;

/// Run one console session and exit the process
pub async fn run(vm: &str, port: ComPort) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let client = HttpManagementClient::new(config.management.client_config())
        .context("Failed to create management API client")?;
    let api: Arc<dyn ManagementApi> = Arc::new(client);

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        wait_for_terminate_signal().await;
        debug!("Terminate signal received, detaching console");
        signal_token.cancel();
    });

    let relay = ConsoleRelay::new(api, Terminal::process())
        .with_poll_interval(config.console.poll_interval())
        .with_parent(token);

    match relay.run(vm, port).await {
        Ok(outcome) => {
            println!("{}", outcome.status_line);
            // stdin is read on a blocking thread the runtime would wait on
            std::process::exit(if outcome.is_clean() { 0 } else { 1 });
        }
        Err(e) => {
            warn!(error = %e, "Serial console failed to attach");
            eprintln!("{}", format_error_for_cli(&e));
            std::process::exit(1);
        }
    }
}
