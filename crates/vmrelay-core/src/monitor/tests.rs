use super::*;
use crate::error::RelayError;
use crate::session::{RelayMetrics, Session};
use crate::utils::MetricsRegistry;
use crate::Endpoint;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Replays a scripted sequence of answers, repeating the last one
struct ScriptedQuery {
    answers: Mutex<VecDeque<Result<VmState>>>,
    last: VmState,
    calls: AtomicUsize,
}

impl ScriptedQuery {
    fn new(answers: Vec<Result<VmState>>, last: VmState) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            last,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateQuery for ScriptedQuery {
    async fn vm_state(&self, vm_id: &str) -> Result<VmState> {
        assert_eq!(vm_id, "vm-1");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.last))
    }
}

fn idle_endpoint(label: &'static str) -> (Endpoint, tokio::io::DuplexStream) {
    let (ours, theirs) = tokio::io::duplex(64);
    let (r, w) = tokio::io::split(ours);
    (Endpoint::from_io(label, r, w), theirs)
}

fn monitored_session(
    query: Arc<ScriptedQuery>,
    policy: InteractivePolicy,
) -> (Session, [tokio::io::DuplexStream; 2]) {
    let (a, a_peer) = idle_endpoint("terminal");
    let (b, b_peer) = idle_endpoint("serial");
    let monitor = LivenessMonitor::new("vm-1", query, policy);
    let session = Session::new(a, b)
        .with_monitor(monitor)
        .with_metrics(RelayMetrics::from_registry(&MetricsRegistry::new()));
    (session, [a_peer, b_peer])
}

#[tokio::test(start_paused = true)]
async fn test_stopped_vm_ends_session_cleanly() {
    let query = ScriptedQuery::new(
        vec![Ok(VmState::Running), Ok(VmState::Running)],
        VmState::Stopped,
    );
    let (session, _peers) = monitored_session(query.clone(), InteractivePolicy::SerialConsole);

    let started = tokio::time::Instant::now();
    let report = session.run().await;
    let elapsed = started.elapsed();

    // ends on the third poll, not a poll later
    assert!(elapsed >= DEFAULT_POLL_INTERVAL * 3);
    assert!(elapsed <= DEFAULT_POLL_INTERVAL * 3 + Duration::from_millis(10));
    assert!(report.is_clean());
    assert!(matches!(
        report.cause,
        Cause::VmInactive {
            state: VmState::Stopped
        }
    ));
    assert_eq!(query.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_serial_policy_rejects_stopping() {
    let query = ScriptedQuery::new(vec![Ok(VmState::Running)], VmState::Stopping);
    let (session, _peers) = monitored_session(query.clone(), InteractivePolicy::SerialConsole);

    let report = session.run().await;

    assert!(matches!(
        report.cause,
        Cause::VmInactive {
            state: VmState::Stopping
        }
    ));
    assert_eq!(query.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_display_policy_tolerates_transitions() {
    let query = ScriptedQuery::new(
        vec![
            Ok(VmState::Starting),
            Ok(VmState::Running),
            Ok(VmState::Stopping),
        ],
        VmState::Stopped,
    );
    let (session, _peers) = monitored_session(query.clone(), InteractivePolicy::Display);

    let report = session.run().await;

    assert!(matches!(
        report.cause,
        Cause::VmInactive {
            state: VmState::Stopped
        }
    ));
    assert_eq!(query.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_query_error_is_fatal_cause() {
    let query = ScriptedQuery::new(
        vec![Err(RelayError::StateQuery("api unreachable".to_string()))],
        VmState::Running,
    );
    let (session, _peers) = monitored_session(query.clone(), InteractivePolicy::SerialConsole);

    let report = session.run().await;

    assert!(!report.is_clean());
    assert!(matches!(
        report.cause,
        Cause::Failed(RelayError::StateQuery(_))
    ));
    assert_eq!(query.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_monitor_exits_without_querying() {
    let query = ScriptedQuery::new(vec![], VmState::Running);
    let monitor = LivenessMonitor::new("vm-1", query.clone(), InteractivePolicy::SerialConsole)
        .with_poll_interval(Duration::from_secs(5));
    let control = Arc::new(SessionControl::new(CancellationToken::new()));

    let watcher = tokio::spawn(monitor.watch(control.clone()));
    tokio::time::sleep(Duration::from_secs(2)).await;
    control.teardown(Cause::Cancelled);
    watcher.await.unwrap();

    assert_eq!(query.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_poll_interval() {
    let query = ScriptedQuery::new(vec![], VmState::Stopped);
    let monitor = LivenessMonitor::new("vm-1", query.clone(), InteractivePolicy::SerialConsole)
        .with_poll_interval(Duration::from_millis(250));
    let control = Arc::new(SessionControl::new(CancellationToken::new()));

    let start = tokio::time::Instant::now();
    monitor.watch(control.clone()).await;

    assert!(start.elapsed() >= Duration::from_millis(250));
    assert!(control.is_tearing_down());
    assert_eq!(query.calls(), 1);
}
