//! VM liveness monitor
//!
//! Polls the VM state while a session runs and tears the session down once the
//! VM leaves the states its policy treats as interactive-capable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::{Cause, SessionControl};
use crate::vm::{InteractivePolicy, VmState};

/// Default interval between state queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of VM state for the monitor
#[async_trait]
pub trait StateQuery: Send + Sync {
    /// Current state of `vm_id`
    async fn vm_state(&self, vm_id: &str) -> Result<VmState>;
}

/// Watches one VM for the lifetime of one session
pub struct LivenessMonitor {
    vm_id: String,
    query: Arc<dyn StateQuery>,
    policy: InteractivePolicy,
    interval: Duration,
}

impl LivenessMonitor {
    /// Monitor `vm_id` with the default poll interval
    pub fn new(
        vm_id: impl Into<String>,
        query: Arc<dyn StateQuery>,
        policy: InteractivePolicy,
    ) -> Self {
        Self {
            vm_id: vm_id.into(),
            query,
            policy,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll until the session is cancelled or the VM stops being interactive.
    pub async fn watch(self, control: Arc<SessionControl>) {
        let token = control.token().clone();
        debug!(
            vm_id = %self.vm_id,
            interval_ms = self.interval.as_millis() as u64,
            "Liveness monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let state = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                state = self.query.vm_state(&self.vm_id) => state,
            };

            match state {
                Ok(state) if self.policy.allows(state) => {}
                Ok(state) => {
                    info!(vm_id = %self.vm_id, state = %state, "VM left interactive state");
                    control.teardown(Cause::VmInactive { state });
                    return;
                }
                Err(e) => {
                    warn!(vm_id = %self.vm_id, error = %e, "VM state query failed");
                    control.teardown(Cause::Failed(e));
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("vm_id", &self.vm_id)
            .field("policy", &self.policy)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
