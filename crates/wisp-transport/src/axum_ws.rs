//! Adapter for WebSockets upgraded by axum.
//!
//! Lets an HTTP server own the upgrade (routing, extractors, middleware) and
//! hand the resulting socket to the Wisp core as a [`Connection`].

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::traits::{into_text, Connection, FrameReader, FrameWriter, TransportError};

/// A WebSocket upgraded through `axum::extract::ws::WebSocketUpgrade`.
pub struct AxumConnection {
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    max_message_size: usize,
}

impl AxumConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket, remote_addr: Option<SocketAddr>, max_message_size: usize) -> Self {
        Self {
            socket,
            remote_addr,
            max_message_size,
        }
    }
}

impl Connection for AxumConnection {
    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        let (sink, stream) = self.socket.split();
        let reader = AxumReader {
            stream,
            max_message_size: self.max_message_size,
        };
        (Box::new(reader), Box::new(AxumWriter { sink }))
    }
}

struct AxumReader {
    stream: SplitStream<WebSocket>,
    max_message_size: usize,
}

#[async_trait]
impl FrameReader for AxumReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            let data = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => Bytes::from(text),
                Some(Ok(Message::Binary(data))) => Bytes::from(data),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Ok(None),
            };

            if data.len() > self.max_message_size {
                warn!(
                    "Message too large: {} bytes (max: {}), dropping",
                    data.len(),
                    self.max_message_size
                );
                continue;
            }
            return Ok(Some(data));
        }
    }
}

struct AxumWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameWriter for AxumWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let message = match into_text(frame) {
            Ok(text) => Message::Text(text),
            Err(frame) => Message::Binary(frame.to_vec()),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }
}
