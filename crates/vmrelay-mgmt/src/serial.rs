//! Serial port streams over WebSocket
//!
//! The first client message is a JSON text frame `{"vm_id": "<id>"}`; after
//! that both directions carry raw serial bytes in binary frames.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use vmrelay_core::{Endpoint, EndpointReader, EndpointWriter, RelayError};

use crate::api::SerialStream;
use crate::error::{Error, Result};
use crate::types::SerialHandshake;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serial stream backed by a management API WebSocket
pub struct WsSerialStream {
    ws: Ws,
    label: &'static str,
}

impl WsSerialStream {
    pub(crate) fn new(ws: Ws) -> Self {
        Self { ws, label: "serial" }
    }
}

#[async_trait]
impl SerialStream for WsSerialStream {
    async fn handshake(&mut self, vm_id: &str) -> Result<()> {
        let payload = serde_json::to_string(&SerialHandshake { vm_id })
            .map_err(|e| Error::Handshake(e.to_string()))?;
        self.ws
            .send(Message::Text(payload))
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;
        debug!(vm_id, "Serial handshake sent");
        Ok(())
    }

    fn into_endpoint(self: Box<Self>) -> Endpoint {
        let label = self.label;
        let (sink, stream) = self.ws.split();
        Endpoint::new(label, WsSerialReader { stream }, WsSerialWriter { sink })
    }
}

/// Receive half of a serial WebSocket
pub struct WsSerialReader<S> {
    stream: SplitStream<S>,
}

#[async_trait]
impl<S> EndpointReader for WsSerialReader<S>
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send,
{
    async fn receive(&mut self) -> vmrelay_core::Result<Option<Bytes>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(RelayError::Transport(e.to_string())),
            }
        }
    }
}

/// Send half of a serial WebSocket
pub struct WsSerialWriter<S> {
    sink: SplitSink<S, Message>,
}

#[async_trait]
impl<S> EndpointWriter for WsSerialWriter<S>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send,
{
    async fn send(&mut self, data: Bytes) -> vmrelay_core::Result<()> {
        self.sink
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> vmrelay_core::Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}
