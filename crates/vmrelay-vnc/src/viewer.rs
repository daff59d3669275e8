//! Viewer side of the proxy: the browser's WebSocket

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use vmrelay_core::{Endpoint, EndpointReader, EndpointWriter, RelayError};

/// Wrap an upgraded viewer socket as a relay endpoint.
///
/// Every binary (or text) frame is one unit of display bytes; control frames
/// are handled by the WebSocket layer and never reach the relay.
pub fn viewer_endpoint(socket: WebSocket) -> Endpoint {
    let (sink, stream) = socket.split();
    Endpoint::new("viewer", ViewerReader { stream }, ViewerWriter { sink })
}

/// Receive half of a viewer socket
pub struct ViewerReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl EndpointReader for ViewerReader {
    async fn receive(&mut self) -> vmrelay_core::Result<Option<Bytes>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(e)) => return Err(RelayError::Transport(e.to_string())),
            }
        }
    }
}

/// Send half of a viewer socket
pub struct ViewerWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl EndpointWriter for ViewerWriter {
    async fn send(&mut self, data: Bytes) -> vmrelay_core::Result<()> {
        self.sink
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> vmrelay_core::Result<()> {
        // the viewer may already be gone; closing the sink is what matters
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}
