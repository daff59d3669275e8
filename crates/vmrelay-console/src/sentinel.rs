//! Disconnect key handling
//!
//! The operator leaves a serial console by typing Ctrl+\ (0x1C). That byte is
//! never sent to the VM. Bytes typed before it in the same read still go out;
//! the next receive then asks the session to disconnect.

use async_trait::async_trait;
use bytes::Bytes;
use vmrelay_core::{EndpointReader, RelayError};

/// The disconnect byte (Ctrl+\)
pub const DISCONNECT_BYTE: u8 = 0x1C;

/// Shown once when the console attaches
pub const DISCONNECT_HINT: &str = "Press Ctrl+\\ to disconnect.";

/// Wraps terminal input and turns the disconnect byte into
/// [`RelayError::Disconnected`]
pub struct SentinelReader<R> {
    inner: R,
    tripped: bool,
}

impl<R> SentinelReader<R> {
    /// Watch `inner` for the disconnect byte
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            tripped: false,
        }
    }
}

#[async_trait]
impl<R: EndpointReader> EndpointReader for SentinelReader<R> {
    async fn receive(&mut self) -> vmrelay_core::Result<Option<Bytes>> {
        if self.tripped {
            return Err(RelayError::Disconnected);
        }

        let Some(data) = self.inner.receive().await? else {
            return Ok(None);
        };

        match data.iter().position(|&b| b == DISCONNECT_BYTE) {
            None => Ok(Some(data)),
            Some(0) => {
                self.tripped = true;
                Err(RelayError::Disconnected)
            }
            Some(at) => {
                self.tripped = true;
                Ok(Some(data.slice(..at)))
            }
        }
    }
}
