//! Graceful shutdown
//!
//! Hands out cancellation tokens to relay sessions and waits for them to drain
//! once a termination signal arrives.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new();
//!
//! let token = shutdown.token();
//! let _guard = shutdown.register_task();
//! Session::with_parent(a, b, &token).run().await;
//!
//! shutdown.shutdown().await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default drain timeout in seconds
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Coordinates shutdown of every session in the process
#[derive(Debug)]
pub struct ShutdownController {
    cancel_token: CancellationToken,
    shutdown_initiated: AtomicBool,
    active_tasks: AtomicU32,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the default drain timeout
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
    }

    /// Create a controller with a custom drain timeout
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            shutdown_initiated: AtomicBool::new(false),
            active_tasks: AtomicU32::new(0),
            timeout,
        })
    }

    /// Child token, cancelled when shutdown starts
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Check if shutdown has been initiated
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Count a running task until the guard is dropped
    pub fn register_task(self: &Arc<Self>) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: Arc::clone(self),
        }
    }

    /// Get the count of active tasks
    #[must_use]
    pub fn active_task_count(&self) -> u32 {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Cancel every token and wait (bounded by the timeout) for tasks to drain.
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        info!("Initiating graceful shutdown...");
        self.cancel_token.cancel();

        let drain_start = tokio::time::Instant::now();
        let check_interval = Duration::from_millis(50);

        loop {
            let active = self.active_task_count();
            if active == 0 {
                info!("All sessions closed");
                break;
            }

            let elapsed = drain_start.elapsed();
            if elapsed >= self.timeout {
                warn!(
                    active_tasks = active,
                    timeout_secs = self.timeout.as_secs(),
                    "Shutdown timeout exceeded, abandoning remaining sessions"
                );
                break;
            }

            debug!(active_tasks = active, "Waiting for sessions to close...");
            tokio::time::sleep(check_interval).await;
        }
    }
}

/// Keeps a task counted by its [`ShutdownController`] while alive
#[derive(Debug)]
pub struct TaskGuard {
    controller: Arc<ShutdownController>,
}

impl TaskGuard {
    /// Check if shutdown was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.controller.cancel_token.is_cancelled()
    }

    /// Get a cancellation token
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.controller.token()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = wait_for_terminate_signal() => {}
    }
}

/// Wait for SIGTERM or SIGHUP.
///
/// The serial console uses this instead of [`wait_for_shutdown_signal`]: in raw
/// mode Ctrl+C arrives as a byte on stdin, not as a signal.
pub async fn wait_for_terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let listen = |kind: SignalKind, name: &'static str| async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!(signal = name, "Received termination signal");
                }
                Err(e) => {
                    warn!(signal = name, error = %e, "Failed to install signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = listen(SignalKind::terminate(), "SIGTERM") => {}
            _ = listen(SignalKind::hangup(), "SIGHUP") => {}
        }
    }

    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

/// Wait for a shutdown signal, then drain `controller`
pub async fn shutdown_signal_with_controller(controller: Arc<ShutdownController>) {
    wait_for_shutdown_signal().await;
    controller.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_with_no_tasks() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutting_down());

        controller.shutdown().await;

        assert!(controller.is_shutting_down());
        assert!(controller.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_task_guard() {
        let controller = ShutdownController::new();
        assert_eq!(controller.active_task_count(), 0);

        {
            let _guard1 = controller.register_task();
            let _guard2 = controller.register_task();
            assert_eq!(controller.active_task_count(), 2);
        }

        assert_eq!(controller.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_propagation() {
        let controller = ShutdownController::new();
        let token = controller.token();
        let guard = controller.register_task();

        assert!(!token.is_cancelled());
        assert!(!guard.is_cancelled());

        let worker = tokio::spawn(async move {
            guard.token().cancelled().await;
            drop(guard);
        });

        controller.shutdown().await;
        worker.await.unwrap();

        assert!(token.is_cancelled());
        assert_eq!(controller.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let controller = ShutdownController::new();

        let c1 = controller.clone();
        let c2 = controller.clone();
        let _ = tokio::join!(
            tokio::spawn(async move { c1.shutdown().await }),
            tokio::spawn(async move { c2.shutdown().await })
        );

        assert!(controller.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_timeout() {
        let controller = ShutdownController::with_timeout(Duration::from_secs(2));
        let _stuck = controller.register_task();

        let start = tokio::time::Instant::now();
        controller.shutdown().await;

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(controller.active_task_count(), 1);
    }
}
