//! TCP link to a VM display service
//!
//! The link behaves like any byte-stream endpoint, with one addition: when a
//! write fails, the writer dials the display once more and retries that single
//! write on the fresh connection. The fresh read half is handed to the reader
//! so display output keeps flowing. A second failure is final.
//!
//! The reader does not wait for a replacement: end-of-stream or an error on
//! the current read half ends the session at once. A reset peer is usually
//! seen by the reader first, so the re-dial only comes into play when the
//! read side stays silent while a write fails.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vmrelay_core::{Counter, Endpoint, EndpointReader, EndpointWriter, IoReader, RelayError};

/// Read half of a display connection
pub type DisplayRead = Box<dyn AsyncRead + Unpin + Send>;
/// Write half of a display connection
pub type DisplayWrite = Box<dyn AsyncWrite + Unpin + Send>;

/// Opens connections to one display service
#[async_trait]
pub trait DisplayDialer: Send + Sync {
    /// Open a fresh connection
    async fn dial(&self) -> io::Result<(DisplayRead, DisplayWrite)>;

    /// Address for logs and diagnostics
    fn addr(&self) -> &str;
}

/// Dials a display over TCP
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
    timeout: Duration,
}

impl TcpDialer {
    /// Dial `host:port`, giving up after `timeout`
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let addr = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        Self { addr, timeout }
    }
}

#[async_trait]
impl DisplayDialer for TcpDialer {
    async fn dial(&self) -> io::Result<(DisplayRead, DisplayWrite)> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {}ms", self.timeout.as_millis()),
                )
            })??;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "Display connected");

        let (read, write) = stream.into_split();
        Ok((Box::new(read), Box::new(write)))
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

/// Build the display endpoint over an already dialled connection
pub fn display_endpoint(
    conn: (DisplayRead, DisplayWrite),
    dialer: Arc<dyn DisplayDialer>,
    redials: Counter,
) -> Endpoint {
    let (read, write) = conn;
    let (tx, rx) = mpsc::unbounded_channel();
    Endpoint::new(
        "display",
        DisplayReader {
            inner: IoReader::new(read),
            replacements: rx,
        },
        DisplayWriter {
            inner: write,
            dialer,
            replacements: tx,
            redials,
        },
    )
}

/// Receive half; switches to a re-dialled connection when one arrives
pub struct DisplayReader {
    inner: IoReader<DisplayRead>,
    replacements: mpsc::UnboundedReceiver<DisplayRead>,
}

#[async_trait]
impl EndpointReader for DisplayReader {
    async fn receive(&mut self) -> vmrelay_core::Result<Option<Bytes>> {
        loop {
            tokio::select! {
                biased;
                Some(read) = self.replacements.recv() => {
                    debug!("Display reader switched to re-dialled connection");
                    self.inner = IoReader::new(read);
                }
                received = self.inner.receive() => return received,
            }
        }
    }
}

/// Send half with a single re-dial on write failure
pub struct DisplayWriter {
    inner: DisplayWrite,
    dialer: Arc<dyn DisplayDialer>,
    replacements: mpsc::UnboundedSender<DisplayRead>,
    redials: Counter,
}

async fn write_unit(writer: &mut DisplayWrite, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

#[async_trait]
impl EndpointWriter for DisplayWriter {
    async fn send(&mut self, data: Bytes) -> vmrelay_core::Result<()> {
        let first = match write_unit(&mut self.inner, &data).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        warn!(addr = self.dialer.addr(), error = %first, "Display write failed, re-dialling");
        self.redials.inc();
        let (read, write) = self.dialer.dial().await.map_err(RelayError::Redial)?;
        self.inner = write;
        if self.replacements.send(read).is_err() {
            debug!("Display reader already gone");
        }

        write_unit(&mut self.inner, &data).await?;
        info!(addr = self.dialer.addr(), "Display write recovered after re-dial");
        Ok(())
    }

    async fn close(&mut self) -> vmrelay_core::Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
