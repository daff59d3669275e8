//! Duplex relay session
//!
//! A [`Session`] owns two endpoints and pumps bytes between them in two
//! independent tasks until one side ends, fails, or someone tears the session
//! down. Payload flows endpoint to endpoint; the tasks share only a
//! cancellation token and an atomic teardown guard.
//!
//! ## Usage
//!
//! ```ignore
//! let session = Session::new(viewer, display).with_monitor(monitor);
//! let control = session.control();
//! let report = session.run().await;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::endpoint::{Endpoint, EndpointReader, EndpointWriter};
use crate::error::RelayError;
use crate::monitor::LivenessMonitor;
use crate::utils::{
    metric_names as names, metrics_global, Counter, Gauge, Histogram, MetricsRegistry, Timer,
};
use crate::vm::VmState;

/// Upper bound on closing an endpoint whose peer has stopped reading
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint position within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Operator side (viewer socket, local terminal)
    A,
    /// VM side (display socket, serial stream)
    B,
}

/// Why a session ended. The first trigger wins.
#[derive(Debug)]
pub enum Cause {
    /// An endpoint reported end-of-stream
    EndOfStream {
        /// Label of the endpoint that ended
        endpoint: &'static str,
    },
    /// The operator pressed the disconnect key
    Disconnected,
    /// The liveness monitor saw the VM leave an interactive state
    VmInactive {
        /// State reported by the management API
        state: VmState,
    },
    /// Cancelled from outside (shutdown signal, caller)
    Cancelled,
    /// Transport, query or task failure
    Failed(RelayError),
}

impl Cause {
    /// Whether the session ended without a failure
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// The failure behind this cause, if any
    #[must_use]
    pub fn error(&self) -> Option<&RelayError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RelayError> for Cause {
    fn from(error: RelayError) -> Self {
        if error.is_clean() {
            Self::Disconnected
        } else {
            Self::Failed(error)
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream { endpoint } => write!(f, "{} closed the connection", endpoint),
            Self::Disconnected => write!(f, "disconnected"),
            Self::VmInactive { state } => write!(f, "VM is {}", state),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Shared state of a running session
///
/// Handed to the pumps, the liveness monitor and anyone else allowed to end
/// the session.
#[derive(Debug)]
pub struct SessionControl {
    token: CancellationToken,
    tearing_down: AtomicBool,
    cause: Mutex<Option<Cause>>,
    a_closed: AtomicBool,
    b_closed: AtomicBool,
    a_to_b: AtomicU64,
    b_to_a: AtomicU64,
}

impl SessionControl {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            token,
            tearing_down: AtomicBool::new(false),
            cause: Mutex::new(None),
            a_closed: AtomicBool::new(false),
            b_closed: AtomicBool::new(false),
            a_to_b: AtomicU64::new(0),
            b_to_a: AtomicU64::new(0),
        }
    }

    /// Begin teardown with `cause`.
    ///
    /// Only the first call records its cause and cancels the session; later
    /// calls return `false` and change nothing.
    pub fn teardown(&self, cause: Cause) -> bool {
        if self
            .tearing_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(ignored = %cause, "Teardown already in progress");
            return false;
        }

        debug!(cause = %cause, "Tearing down relay session");
        *self.cause.lock().unwrap_or_else(|e| e.into_inner()) = Some(cause);
        self.token.cancel();
        true
    }

    /// Whether teardown has begun
    #[must_use]
    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::SeqCst) || self.token.is_cancelled()
    }

    /// Cancellation token observed by every task of this session
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the endpoint on `side` has been closed
    #[must_use]
    pub fn is_closed(&self, side: Side) -> bool {
        self.closed_flag(side).load(Ordering::SeqCst)
    }

    /// Bytes delivered from A to B so far
    #[must_use]
    pub fn bytes_a_to_b(&self) -> u64 {
        self.a_to_b.load(Ordering::Relaxed)
    }

    /// Bytes delivered from B to A so far
    #[must_use]
    pub fn bytes_b_to_a(&self) -> u64 {
        self.b_to_a.load(Ordering::Relaxed)
    }

    fn closed_flag(&self, side: Side) -> &AtomicBool {
        match side {
            Side::A => &self.a_closed,
            Side::B => &self.b_closed,
        }
    }

    fn take_cause(&self) -> Option<Cause> {
        self.cause.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Handles to the process-wide relay metrics
#[derive(Debug, Clone)]
pub struct RelayMetrics {
    /// Running sessions
    pub active_sessions: Gauge,
    /// Bytes A to B
    pub bytes_transmitted: Counter,
    /// Bytes B to A
    pub bytes_received: Counter,
    /// Session lifetimes
    pub session_duration: Histogram,
}

impl RelayMetrics {
    /// Metrics registered in the global registry
    #[must_use]
    pub fn global() -> Self {
        Self::from_registry(metrics_global::registry())
    }

    /// Metrics registered in `registry`
    #[must_use]
    pub fn from_registry(registry: &MetricsRegistry) -> Self {
        Self {
            active_sessions: registry.gauge(names::ACTIVE_SESSIONS, names::ACTIVE_SESSIONS_HELP),
            bytes_transmitted: registry
                .counter(names::BYTES_TRANSMITTED, names::BYTES_TRANSMITTED_HELP),
            bytes_received: registry.counter(names::BYTES_RECEIVED, names::BYTES_RECEIVED_HELP),
            session_duration: registry
                .histogram(names::SESSION_DURATION, names::SESSION_DURATION_HELP),
        }
    }
}

/// Outcome of a finished session
#[derive(Debug)]
pub struct SessionReport {
    /// Session id
    pub id: Uuid,
    /// Why the session ended
    pub cause: Cause,
    /// Bytes delivered from A to B
    pub bytes_a_to_b: u64,
    /// Bytes delivered from B to A
    pub bytes_b_to_a: u64,
    /// Wall-clock lifetime
    pub duration: Duration,
}

impl SessionReport {
    /// Whether the session ended without a failure
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.cause.is_clean()
    }
}

/// One relay between exactly two endpoints
pub struct Session {
    id: Uuid,
    a: Endpoint,
    b: Endpoint,
    control: Arc<SessionControl>,
    monitor: Option<LivenessMonitor>,
    metrics: RelayMetrics,
}

impl Session {
    /// Pair endpoint A (operator side) with endpoint B (VM side)
    pub fn new(a: Endpoint, b: Endpoint) -> Self {
        Self::with_token(a, b, CancellationToken::new())
    }

    /// Like [`Session::new`], but cancelled whenever `parent` is
    pub fn with_parent(a: Endpoint, b: Endpoint, parent: &CancellationToken) -> Self {
        Self::with_token(a, b, parent.child_token())
    }

    fn with_token(a: Endpoint, b: Endpoint, token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            a,
            b,
            control: Arc::new(SessionControl::new(token)),
            monitor: None,
            metrics: RelayMetrics::global(),
        }
    }

    /// Watch VM liveness for the lifetime of the session
    #[must_use]
    pub fn with_monitor(mut self, monitor: LivenessMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Record into `metrics` instead of the global registry
    #[must_use]
    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Control handle for ending the session from outside
    #[must_use]
    pub fn control(&self) -> Arc<SessionControl> {
        self.control.clone()
    }

    /// Relay until the session is torn down, then join every task.
    pub async fn run(self) -> SessionReport {
        let span = info_span!(
            "relay_session",
            session_id = %self.id,
            a = self.a.label(),
            b = self.b.label()
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> SessionReport {
        let Session {
            id,
            a,
            b,
            control,
            monitor,
            metrics,
        } = self;

        let _active = metrics.active_sessions.guard();
        let timer = Timer::start();
        info!("Relay session started");

        let (a_label, a_reader, a_writer) = a.into_parts();
        let (b_label, b_reader, b_writer) = b.into_parts();

        let forward = tokio::spawn(
            pump(
                Pump {
                    source: a_label,
                    target: Side::B,
                    counter: metrics.bytes_transmitted.clone(),
                },
                a_reader,
                b_writer,
                control.clone(),
            )
            .in_current_span(),
        );
        let backward = tokio::spawn(
            pump(
                Pump {
                    source: b_label,
                    target: Side::A,
                    counter: metrics.bytes_received.clone(),
                },
                b_reader,
                a_writer,
                control.clone(),
            )
            .in_current_span(),
        );
        let watcher = monitor.map(|m| tokio::spawn(m.watch(control.clone()).in_current_span()));

        let join_pump = |handle: tokio::task::JoinHandle<()>, name: &'static str| {
            let control = control.clone();
            async move {
                if let Err(e) = handle.await {
                    warn!(pump = name, error = %e, "Relay pump task failed");
                    control.teardown(Cause::Failed(RelayError::Task(e.to_string())));
                }
            }
        };
        tokio::join!(join_pump(forward, "a_to_b"), join_pump(backward, "b_to_a"));

        if let Some(watcher) = watcher {
            // pumps only exit after the token is cancelled, so the monitor is on its way out
            if let Err(e) = watcher.await {
                warn!(error = %e, "Liveness monitor task failed");
            }
        }

        let cause = control.take_cause().unwrap_or(Cause::Cancelled);
        let duration = timer.elapsed();
        timer.observe_secs(&metrics.session_duration);

        let report = SessionReport {
            id,
            cause,
            bytes_a_to_b: control.bytes_a_to_b(),
            bytes_b_to_a: control.bytes_b_to_a(),
            duration,
        };

        if report.is_clean() {
            info!(
                cause = %report.cause,
                bytes_a_to_b = report.bytes_a_to_b,
                bytes_b_to_a = report.bytes_b_to_a,
                "Relay session ended"
            );
        } else {
            warn!(
                cause = %report.cause,
                bytes_a_to_b = report.bytes_a_to_b,
                bytes_b_to_a = report.bytes_b_to_a,
                "Relay session failed"
            );
        }

        report
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("a", &self.a)
            .field("b", &self.b)
            .finish_non_exhaustive()
    }
}

/// One direction of a session
struct Pump {
    source: &'static str,
    target: Side,
    counter: Counter,
}

async fn pump(
    dir: Pump,
    mut reader: Box<dyn EndpointReader>,
    mut writer: Box<dyn EndpointWriter>,
    control: Arc<SessionControl>,
) {
    let token = control.token().clone();

    loop {
        if token.is_cancelled() {
            break;
        }

        let received = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = reader.receive() => received,
        };

        match received {
            Ok(Some(data)) => {
                // nothing is forwarded once teardown has begun
                if token.is_cancelled() {
                    break;
                }
                let len = data.len() as u64;
                let sent = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = writer.send(data) => sent,
                };
                if let Err(e) = sent {
                    warn!(source = dir.source, error = %e, "Relay send failed");
                    control.teardown(Cause::Failed(e));
                    break;
                }
                match dir.target {
                    Side::B => control.a_to_b.fetch_add(len, Ordering::Relaxed),
                    Side::A => control.b_to_a.fetch_add(len, Ordering::Relaxed),
                };
                dir.counter.inc_by(len);
            }
            Ok(None) => {
                debug!(endpoint = dir.source, "End of stream");
                control.teardown(Cause::EndOfStream {
                    endpoint: dir.source,
                });
                break;
            }
            Err(e) => {
                if !e.is_clean() {
                    warn!(endpoint = dir.source, error = %e, "Relay receive failed");
                }
                control.teardown(Cause::from(e));
                break;
            }
        }
    }

    // a parent token can cancel without anyone calling teardown
    if !control.tearing_down.load(Ordering::SeqCst) {
        control.teardown(Cause::Cancelled);
    }
    drop(reader);

    if !control.closed_flag(dir.target).swap(true, Ordering::SeqCst) {
        match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(side = ?dir.target, error = %e, "Endpoint close reported an error");
            }
            Err(_) => {
                // dropping the writer below releases the transport
                warn!(side = ?dir.target, "Endpoint close timed out");
            }
        }
    }
    drop(writer);
}

#[cfg(test)]
mod tests;
