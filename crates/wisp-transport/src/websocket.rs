//! WebSocket transport implementation.
//!
//! This module provides a standalone WebSocket listener using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::traits::{into_text, Connection, FrameReader, FrameWriter, Transport, TransportError};

/// Default maximum inbound message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// WebSocket transport.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn new(config: WebSocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(TransportError::Io)?;

        info!("WebSocket transport listening on {}", config.bind_addr);

        Ok(Self { listener, config })
    }

    /// Create a new WebSocket transport with default config.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(WebSocketConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }

    /// Get the local address this transport is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = self.listener.accept().await.map_err(TransportError::Io)?;

        debug!("Accepted TCP connection from {}", addr);

        let ws_stream = accept_async(stream).await.map_err(|e| {
            error!("WebSocket handshake failed: {}", e);
            TransportError::Handshake(e.to_string())
        })?;

        debug!("WebSocket handshake completed with {}", addr);

        let conn = WebSocketConnection::new(ws_stream, addr, self.config.max_message_size);
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket connection accepted by [`WebSocketTransport`].
pub struct WebSocketConnection {
    stream: WebSocketStream<TcpStream>,
    remote_addr: SocketAddr,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(
        stream: WebSocketStream<TcpStream>,
        remote_addr: SocketAddr,
        max_message_size: usize,
    ) -> Self {
        Self {
            stream,
            remote_addr,
            max_message_size,
        }
    }
}

impl Connection for WebSocketConnection {
    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        let (sink, stream) = self.stream.split();
        let reader = WebSocketReader {
            stream,
            max_message_size: self.max_message_size,
        };
        (Box::new(reader), Box::new(WebSocketWriter { sink }))
    }
}

struct WebSocketReader {
    stream: SplitStream<WebSocketStream<TcpStream>>,
    max_message_size: usize,
}

impl WebSocketReader {
    fn accept_size(&self, len: usize) -> bool {
        if len > self.max_message_size {
            warn!(
                "Message too large: {} bytes (max: {}), dropping",
                len, self.max_message_size
            );
            return false;
        }
        true
    }
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if self.accept_size(text.len()) {
                        return Ok(Some(Bytes::from(text)));
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if self.accept_size(data.len()) {
                        return Ok(Some(Bytes::from(data)));
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Pongs are queued by tungstenite and flushed on the next write
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    debug!("Connection closed");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

struct WebSocketWriter {
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
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
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {}", e))),
        }
    }
}
