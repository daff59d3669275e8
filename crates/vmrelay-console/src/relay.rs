//! Serial console relay
//!
//! `Idle → Handshaking → RawMode → Relaying → Restoring → Closed`. The local
//! terminal is only touched once the remote stream is bound; from then on a
//! [`RawModeGuard`](crate::terminal::RawModeGuard) owns it until the relay ends.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use vmrelay_core::{
    Cause, Endpoint, InteractivePolicy, IoReader, IoWriter, LivenessMonitor, RelayMetrics,
    Session, VmState, DEFAULT_POLL_INTERVAL,
};
use vmrelay_mgmt::{ApiStateQuery, ComPort, ManagementApi, SerialStream, VmRef};

use crate::error::{Error, Result};
use crate::sentinel::{SentinelReader, DISCONNECT_HINT};
use crate::terminal::Terminal;

/// Label of the local terminal endpoint
pub const TERMINAL_LABEL: &str = "terminal";

/// Label the serial stream endpoint carries
pub const SERIAL_LABEL: &str = "serial";

type ConsoleInput = Box<dyn AsyncRead + Unpin + Send>;
type ConsoleOutput = Box<dyn AsyncWrite + Unpin + Send>;

/// Console lifecycle, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolePhase {
    /// Nothing started
    Idle,
    /// Opening and binding the serial stream
    Handshaking,
    /// Terminal switched to raw mode
    RawMode,
    /// Bytes flowing
    Relaying,
    /// Giving the terminal back
    Restoring,
    /// Done
    Closed,
}

impl fmt::Display for ConsolePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::RawMode => write!(f, "raw_mode"),
            Self::Relaying => write!(f, "relaying"),
            Self::Restoring => write!(f, "restoring"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

fn enter(phase: ConsolePhase) {
    debug!(phase = %phase, "Serial console phase");
}

/// How a console session ended
#[derive(Debug)]
pub struct ConsoleOutcome {
    /// Termination cause reported by the relay
    pub cause: Cause,
    /// Line shown to the operator once the terminal is restored
    pub status_line: String,
}

impl ConsoleOutcome {
    fn from_cause(cause: Cause) -> Self {
        Self {
            status_line: status_line(&cause),
            cause,
        }
    }

    /// Whether the session ended without a failure
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.cause.is_clean()
    }
}

/// Operator-facing summary of a termination cause
pub fn status_line(cause: &Cause) -> String {
    match cause {
        Cause::VmInactive { .. } => "VM shutdown".to_string(),
        Cause::EndOfStream { endpoint } if *endpoint == SERIAL_LABEL => {
            "connection closed by remote".to_string()
        }
        Cause::EndOfStream { .. } | Cause::Disconnected | Cause::Cancelled => {
            "disconnected".to_string()
        }
        Cause::Failed(e) => format!("connection lost: {}", e),
    }
}

/// Relays the local terminal to one VM serial port
pub struct ConsoleRelay {
    api: Arc<dyn ManagementApi>,
    terminal: Arc<Terminal>,
    input: Option<ConsoleInput>,
    output: Option<ConsoleOutput>,
    poll_interval: Duration,
    parent: Option<CancellationToken>,
    metrics: Option<RelayMetrics>,
}

impl ConsoleRelay {
    /// Console over process stdin/stdout, resolving VMs through `api`
    pub fn new(api: Arc<dyn ManagementApi>, terminal: Arc<Terminal>) -> Self {
        Self {
            api,
            terminal,
            input: None,
            output: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            parent: None,
            metrics: None,
        }
    }

    /// Read keystrokes from `input` and write VM output to `output`
    #[must_use]
    pub fn with_io<R, W>(mut self, input: R, output: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.input = Some(Box::new(input));
        self.output = Some(Box::new(output));
        self
    }

    /// VM state poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// End the relay (cause `Cancelled`) when `parent` is cancelled
    #[must_use]
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Record into `metrics` instead of the global registry
    #[must_use]
    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach to serial port `port` of `vm` and relay until the session ends.
    ///
    /// Errors are only returned before the terminal is captured; once raw mode
    /// is on, the outcome carries the termination cause instead.
    pub async fn run(self, vm: &str, port: ComPort) -> Result<ConsoleOutcome> {
        let span = info_span!("serial_console", vm = %vm, port = %port);
        self.run_inner(vm, port).instrument(span).await
    }

    async fn run_inner(self, vm: &str, port: ComPort) -> Result<ConsoleOutcome> {
        enter(ConsolePhase::Idle);
        let vm_ref = Self::check_running(&self.api, vm).await?;

        enter(ConsolePhase::Handshaking);
        let stream = Self::bind_serial(&self.api, &vm_ref, port).await?;

        let ConsoleRelay {
            api,
            terminal,
            input,
            output,
            poll_interval,
            parent,
            metrics,
        } = self;

        enter(ConsolePhase::RawMode);
        let guard = terminal.capture()?;
        guard.clear_screen();

        let input = input.unwrap_or_else(|| Box::new(tokio::io::stdin()));
        let mut output = output.unwrap_or_else(|| Box::new(tokio::io::stdout()));
        if let Err(e) = write_hint(&mut output).await {
            warn!(error = %e, "Failed to print console hint");
        }

        enter(ConsolePhase::Relaying);
        info!(vm_id = %vm_ref.id, "Serial console attached");
        let local = Endpoint::new(
            TERMINAL_LABEL,
            SentinelReader::new(IoReader::new(input)),
            IoWriter::new(output),
        );
        let remote = stream.into_endpoint();

        let mut session = match &parent {
            Some(token) => Session::with_parent(local, remote, token),
            None => Session::new(local, remote),
        };
        if let Some(metrics) = metrics {
            session = session.with_metrics(metrics);
        }
        let query = Arc::new(ApiStateQuery::new(api));
        session = session.with_monitor(
            LivenessMonitor::new(vm_ref.id.clone(), query, InteractivePolicy::SerialConsole)
                .with_poll_interval(poll_interval),
        );
        let report = session.run().await;

        enter(ConsolePhase::Restoring);
        guard.restore();

        enter(ConsolePhase::Closed);
        let outcome = ConsoleOutcome::from_cause(report.cause);
        info!(status = %outcome.status_line, "Serial console detached");
        Ok(outcome)
    }

    async fn check_running(api: &Arc<dyn ManagementApi>, vm: &str) -> Result<VmRef> {
        let vm_ref = api.resolve_vm(vm).await?;
        let status = api.vm_status(&vm_ref.id).await?;
        if status.state != VmState::Running {
            return Err(Error::VmNotRunning {
                vm: vm.to_string(),
                state: status.state,
            });
        }
        Ok(vm_ref)
    }

    async fn bind_serial(
        api: &Arc<dyn ManagementApi>,
        vm_ref: &VmRef,
        port: ComPort) -> Result<Box<dyn SerialStream>> {
        let mut stream = api.open_serial(port).await.map_err(Error::Handshake)?;
        stream
            .handshake(&vm_ref.id)
            .await
            .map_err(Error::Handshake)?;
        debug!(vm_id = %vm_ref.id, "Serial stream bound");
        Ok(stream)
    }
}

impl fmt::Debug for ConsoleRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleRelay")
            .field("terminal", &self.terminal)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

async fn write_hint(output: &mut ConsoleOutput) -> std::io::Result<()> {
    // raw mode: no newline translation
    output
        .write_all(format!("{}\r\n", DISCONNECT_HINT).as_bytes())
        .await?;
    output.flush().await
}
