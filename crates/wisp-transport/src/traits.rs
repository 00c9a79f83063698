//! Transport abstraction traits for Wisp.
//!
//! The server core never performs a protocol upgrade itself. It receives a
//! [`Connection`] that has already been upgraded and splits it into a reader
//! half (owned by the client's read pump) and a writer half (owned by the
//! client's write pump).

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol upgrade failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A transport that can accept connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept a new connection.
    ///
    /// This method waits until a new connection is available or an error occurs.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An upgraded, bidirectional frame stream to a single client.
pub trait Connection: Send {
    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Split into independently owned read and write halves.
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>);
}

/// Read half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` if the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one frame.
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Convert an outbound frame into text when it is valid UTF-8.
///
/// Packets are JSON, so this is the common case; anything else is sent as a
/// binary frame.
pub(crate) fn into_text(frame: Bytes) -> Result<String, Bytes> {
    match std::str::from_utf8(&frame) {
        Ok(text) => Ok(text.to_owned()),
        Err(_) => Err(frame),
    }
}
