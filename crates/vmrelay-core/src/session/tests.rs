use super::*;
use crate::endpoint::{IoReader, IoWriter};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::atomic::AtomicUsize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn pipe(label: &'static str) -> (Endpoint, DuplexStream) {
    let (ours, theirs) = tokio::io::duplex(256);
    let (read_half, write_half) = tokio::io::split(ours);
    (Endpoint::from_io(label, read_half, write_half), theirs)
}

fn test_metrics() -> RelayMetrics {
    RelayMetrics::from_registry(&MetricsRegistry::new())
}

/// Counts how many times the session closes the wrapped writer
struct CountingWriter<W> {
    inner: W,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl<W: EndpointWriter> EndpointWriter for CountingWriter<W> {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        self.inner.send(data).await
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

fn counted_pipe(label: &'static str) -> (Endpoint, DuplexStream, Arc<AtomicUsize>) {
    let (ours, theirs) = tokio::io::duplex(256);
    let (read_half, write_half) = tokio::io::split(ours);
    let closes = Arc::new(AtomicUsize::new(0));
    let endpoint = Endpoint::new(
        label,
        IoReader::new(read_half),
        CountingWriter {
            inner: IoWriter::new(write_half),
            closes: closes.clone(),
        },
    );
    (endpoint, theirs, closes)
}

/// Writer whose peer has gone away
struct BrokenWriter;

#[async_trait]
impl EndpointWriter for BrokenWriter {
    async fn send(&mut self, _data: Bytes) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone").into())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reader that never yields
struct IdleReader;

#[async_trait]
impl EndpointReader for IdleReader {
    async fn receive(&mut self) -> Result<Option<Bytes>> {
        std::future::pending().await
    }
}

/// Writer whose peer stopped reading: close never completes
struct StalledWriter {
    dropped: Arc<AtomicUsize>,
}

#[async_trait]
impl EndpointWriter for StalledWriter {
    async fn send(&mut self, _data: Bytes) -> Result<()> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<()> {
        std::future::pending().await
    }
}

impl Drop for StalledWriter {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reader that asks for a disconnect on first use
struct DisconnectReader;

#[async_trait]
impl EndpointReader for DisconnectReader {
    async fn receive(&mut self) -> Result<Option<Bytes>> {
        Err(RelayError::Disconnected)
    }
}

#[tokio::test]
async fn test_bytes_arrive_in_order_both_ways() {
    let (a, a_peer) = pipe("viewer");
    let (b, b_peer) = pipe("display");
    let metrics = test_metrics();
    let session = Session::new(a, b).with_metrics(metrics.clone());
    let run = tokio::spawn(session.run());

    let (mut a_read, mut a_write) = tokio::io::split(a_peer);
    let (mut b_read, mut b_write) = tokio::io::split(b_peer);

    let upstream: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let downstream: Vec<u8> = (0..2000u32).map(|i| (i % 241) as u8).collect();

    let up = upstream.clone();
    let up_writer = tokio::spawn(async move {
        for chunk in up.chunks(37) {
            a_write.write_all(chunk).await.unwrap();
        }
        a_write
    });
    let down = downstream.clone();
    let down_writer = tokio::spawn(async move {
        for chunk in down.chunks(53) {
            b_write.write_all(chunk).await.unwrap();
        }
        b_write
    });

    let mut got_up = vec![0u8; upstream.len()];
    b_read.read_exact(&mut got_up).await.unwrap();
    let mut got_down = vec![0u8; downstream.len()];
    a_read.read_exact(&mut got_down).await.unwrap();

    assert_eq!(got_up, upstream);
    assert_eq!(got_down, downstream);

    // viewer hangs up
    let a_write = up_writer.await.unwrap();
    let _b_write = down_writer.await.unwrap();
    drop(a_write);
    drop(a_read);

    let report = run.await.unwrap();
    assert!(report.is_clean());
    assert!(matches!(
        report.cause,
        Cause::EndOfStream { endpoint: "viewer" }
    ));
    assert_eq!(report.bytes_a_to_b, 1000);
    assert_eq!(report.bytes_b_to_a, 2000);
    assert_eq!(metrics.bytes_transmitted.get(), 1000);
    assert_eq!(metrics.bytes_received.get(), 2000);
    assert_eq!(metrics.active_sessions.get(), 0);
    assert_eq!(metrics.session_duration.count(), 1);

    // the display side was closed too
    let mut rest = Vec::new();
    b_read.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_teardown_closes_each_endpoint_once() {
    let (a, _a_peer, a_closes) = counted_pipe("viewer");
    let (b, _b_peer, b_closes) = counted_pipe("display");
    let session = Session::new(a, b).with_metrics(test_metrics());
    let control = session.control();
    let run = tokio::spawn(session.run());

    let triggers: Vec<_> = (0..16)
        .map(|_| {
            let control = control.clone();
            tokio::spawn(async move { control.teardown(Cause::Disconnected) })
        })
        .collect();

    let mut winners = 0;
    for trigger in triggers {
        if trigger.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let report = run.await.unwrap();
    assert!(matches!(report.cause, Cause::Disconnected));
    assert_eq!(a_closes.load(Ordering::SeqCst), 1);
    assert_eq!(b_closes.load(Ordering::SeqCst), 1);
    assert!(control.is_closed(Side::A));
    assert!(control.is_closed(Side::B));
    assert!(!control.teardown(Cause::Cancelled));
}

#[tokio::test]
async fn test_send_failure_is_reported_as_cause() {
    let (a, a_peer) = pipe("viewer");
    let b = Endpoint::new("display", IdleReader, BrokenWriter);
    let session = Session::new(a, b).with_metrics(test_metrics());
    let run = tokio::spawn(session.run());

    let (_a_read, mut a_write) = tokio::io::split(a_peer);
    a_write.write_all(b"key").await.unwrap();

    let report = run.await.unwrap();
    assert!(!report.is_clean());
    match report.cause {
        Cause::Failed(RelayError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("unexpected cause: {other:?}"),
    }
    assert_eq!(report.bytes_a_to_b, 0);
}

#[tokio::test]
async fn test_disconnect_request_is_clean() {
    let (b, _b_peer) = pipe("serial");
    let a = Endpoint::new("terminal", DisconnectReader, BrokenWriter);
    let report = Session::new(a, b).with_metrics(test_metrics()).run().await;

    assert!(report.is_clean());
    assert!(matches!(report.cause, Cause::Disconnected));
}

#[tokio::test]
async fn test_parent_cancellation_ends_session() {
    let (a, _a_peer) = pipe("viewer");
    let (b, _b_peer) = pipe("display");
    let parent = CancellationToken::new();
    let session = Session::with_parent(a, b, &parent).with_metrics(test_metrics());
    let run = tokio::spawn(session.run());

    parent.cancel();

    let report = run.await.unwrap();
    assert!(matches!(report.cause, Cause::Cancelled));
}

#[tokio::test]
async fn test_nothing_forwarded_after_teardown() {
    let (a, a_peer) = pipe("viewer");
    let (b, b_peer) = pipe("display");
    let session = Session::new(a, b).with_metrics(test_metrics());
    let control = session.control();

    control.teardown(Cause::Cancelled);
    let report = session.run().await;
    assert_eq!(report.bytes_a_to_b, 0);

    let (_a_read, mut a_write) = tokio::io::split(a_peer);
    // the session is gone, so the write either fails or goes nowhere
    let _ = a_write.write_all(b"late").await;

    let (mut b_read, _b_write) = tokio::io::split(b_peer);
    let mut rest = Vec::new();
    b_read.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_close_does_not_hold_session_open() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let a = Endpoint::new(
        "viewer",
        IdleReader,
        StalledWriter {
            dropped: dropped.clone(),
        },
    );
    let (b, _b_peer) = pipe("display");
    let metrics = test_metrics();
    let session = Session::new(a, b).with_metrics(metrics.clone());
    let control = session.control();
    let run = tokio::spawn(session.run());
    tokio::task::yield_now().await;
    assert_eq!(metrics.active_sessions.get(), 1);

    let started = tokio::time::Instant::now();
    control.teardown(Cause::VmInactive {
        state: VmState::Stopped,
    });

    let report = tokio::time::timeout(CLOSE_TIMEOUT * 2, run)
        .await
        .expect("session joined")
        .unwrap();
    assert!(matches!(report.cause, Cause::VmInactive { .. }));
    assert!(started.elapsed() >= CLOSE_TIMEOUT);
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    assert!(control.is_closed(Side::A));
    assert_eq!(metrics.active_sessions.get(), 0);
}

#[test]
fn test_cause_display_and_conversion() {
    assert_eq!(Cause::Disconnected.to_string(), "disconnected");
    assert_eq!(
        Cause::VmInactive {
            state: VmState::Stopped
        }
        .to_string(),
        "VM is stopped"
    );
    assert!(matches!(
        Cause::from(RelayError::Disconnected),
        Cause::Disconnected
    ));
    let failed = Cause::from(RelayError::Transport("reset".to_string()));
    assert!(!failed.is_clean());
    assert!(failed.error().is_some());
}
