//! In-process transport.
//!
//! [`pair`] returns a [`MemoryConnection`] to hand to the server and a
//! [`MemoryPeer`] that plays the remote client. Used by tests and benches to
//! drive the full client lifecycle without sockets.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{Connection, FrameReader, FrameWriter, TransportError};

/// Create a connected in-memory pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let conn = MemoryConnection {
        inbound: inbound_rx,
        outbound: outbound_tx,
    };
    let peer = MemoryPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
    };
    (conn, peer)
}

/// Server side of an in-memory pair.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl Connection for MemoryConnection {
    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        let reader = MemoryReader {
            inbound: self.inbound,
        };
        let writer = MemoryWriter {
            outbound: Some(self.outbound),
        };
        (Box::new(reader), Box::new(writer))
    }
}

struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

struct MemoryWriter {
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::ConnectionClosed)?;
        outbound
            .send(frame)
            .map_err(|_| TransportError::SendFailed("peer dropped".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

/// Remote side of an in-memory pair.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Bytes, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryPeer {
    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer side was closed or the server dropped
    /// its reader.
    pub fn send(&self, frame: impl Into<Bytes>) -> Result<(), TransportError> {
        let inbound = self.inbound.as_ref().ok_or(TransportError::ConnectionClosed)?;
        inbound
            .send(Ok(frame.into()))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Make the server's next read fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(TransportError::ReceiveFailed(reason.into())));
        }
    }

    /// Close the peer's sending side; the server reads end-of-stream.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Receive the next frame written by the server.
    ///
    /// Returns `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Receive a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_exchange() {
        let (conn, mut peer) = pair();
        let (mut reader, mut writer) = Box::new(conn).split();

        peer.send("hello").unwrap();
        assert_eq!(reader.recv().await.unwrap().unwrap(), Bytes::from("hello"));

        writer.send(Bytes::from("world")).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from("world"));

        writer.close().await.unwrap();
        assert!(peer.recv().await.is_none());
        assert!(matches!(
            writer.send(Bytes::from("late")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_memory_peer_fail_and_close() {
        let (conn, mut peer) = pair();
        let (mut reader, _writer) = Box::new(conn).split();

        peer.fail("boom");
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::ReceiveFailed(reason)) if reason == "boom"
        ));

        peer.close();
        assert!(reader.recv().await.unwrap().is_none());
        assert!(peer.send("late").is_err());
    }
}
