//! The management API as seen by the consoles

use std::sync::Arc;

use async_trait::async_trait;
use vmrelay_core::{Endpoint, StateQuery, VmState};

use crate::error::Result;
use crate::types::{ComPort, VmRef, VmStatus};

/// Management API operations the consoles depend on
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Resolve a VM name or ID to its identity
    async fn resolve_vm(&self, name_or_id: &str) -> Result<VmRef>;

    /// Current status of the VM with ID `vm_id`
    async fn vm_status(&self, vm_id: &str) -> Result<VmStatus>;

    /// Open the remote byte stream behind serial port `port`
    async fn open_serial(&self, port: ComPort) -> Result<Box<dyn SerialStream>>;
}

/// An opened, not yet bound, serial stream
#[async_trait]
pub trait SerialStream: Send {
    /// Bind the stream to `vm_id`. Must succeed before any byte flows.
    async fn handshake(&mut self, vm_id: &str) -> Result<()>;

    /// Turn the bound stream into a relay endpoint
    fn into_endpoint(self: Box<Self>) -> Endpoint;
}

/// Answers liveness queries from a [`ManagementApi`]
#[derive(Clone)]
pub struct ApiStateQuery {
    api: Arc<dyn ManagementApi>,
}

impl ApiStateQuery {
    /// Query VM state through `api`
    pub fn new(api: Arc<dyn ManagementApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StateQuery for ApiStateQuery {
    async fn vm_state(&self, vm_id: &str) -> vmrelay_core::Result<VmState> {
        Ok(self.api.vm_status(vm_id).await?.state)
    }
}
