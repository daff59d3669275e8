//! Duplex endpoints
//!
//! An [`Endpoint`] is one side of a relay: a socket, the local terminal or a
//! remote stream. It is split into a receive half and a send half up front so
//! the two pump directions of a session can each own the half they drive.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// Default read chunk for byte-stream endpoints
pub const DEFAULT_READ_CHUNK: usize = 32 * 1024;

/// Receive half of an endpoint
#[async_trait]
pub trait EndpointReader: Send {
    /// Receive the next unit of bytes.
    ///
    /// `Ok(None)` means the peer ended the stream. Implementations must be
    /// cancel safe: the relay drops an in-flight `receive` on teardown.
    async fn receive(&mut self) -> Result<Option<Bytes>>;
}

/// Send half of an endpoint
#[async_trait]
pub trait EndpointWriter: Send {
    /// Deliver one unit of bytes to the peer
    async fn send(&mut self, data: Bytes) -> Result<()>;

    /// Close the endpoint. The session calls this at most once.
    async fn close(&mut self) -> Result<()>;
}

/// A labelled duplex endpoint
pub struct Endpoint {
    label: &'static str,
    reader: Box<dyn EndpointReader>,
    writer: Box<dyn EndpointWriter>,
}

impl Endpoint {
    /// Build an endpoint from its two halves
    pub fn new(
        label: &'static str,
        reader: impl EndpointReader + 'static,
        writer: impl EndpointWriter + 'static,
    ) -> Self {
        Self {
            label,
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Build an endpoint over plain async byte streams (TCP halves, stdio, pipes)
    pub fn from_io<R, W>(label: &'static str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(label, IoReader::new(reader), IoWriter::new(writer))
    }

    /// Endpoint label used in logs and termination causes
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Take the endpoint apart
    pub fn into_parts(
        self,
    ) -> (
        &'static str,
        Box<dyn EndpointReader>,
        Box<dyn EndpointWriter>,
    ) {
        (self.label, self.reader, self.writer)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("label", &self.label).finish()
    }
}

/// Receive half over an [`AsyncRead`]
///
/// Yields whatever a single read returns, without re-framing.
pub struct IoReader<R> {
    inner: R,
    buf: BytesMut,
    chunk: usize,
}

impl<R> IoReader<R> {
    /// Wrap a reader with the default chunk size
    pub fn new(inner: R) -> Self {
        Self::with_chunk(inner, DEFAULT_READ_CHUNK)
    }

    /// Wrap a reader with a custom chunk size
    pub fn with_chunk(inner: R, chunk: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(chunk),
            chunk: chunk.max(1),
        }
    }
}

#[async_trait]
impl<R> EndpointReader for IoReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Option<Bytes>> {
        self.buf.reserve(self.chunk);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

/// Send half over an [`AsyncWrite`]
pub struct IoWriter<W> {
    inner: W,
}

impl<W> IoWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W> EndpointWriter for IoWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, data: Bytes) -> Result<()> {
        self.inner.write_all(&data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
