//! Acknowledgement handles.

use crate::client::Client;
use crate::error::SendError;
use serde_json::Value;
use std::sync::Arc;
use wisp_protocol::Packet;

/// Reply slot for an inbound event that requested an acknowledgement.
///
/// Replies are not deduplicated; every call to [`Ack::send_data`] sends a
/// packet.
#[derive(Debug, Clone)]
pub struct Ack {
    id: i64,
    client: Arc<Client>,
    namespace: String,
}

impl Ack {
    pub(crate) fn new(id: i64, client: Arc<Client>, namespace: impl Into<String>) -> Self {
        Self {
            id,
            client,
            namespace: namespace.into(),
        }
    }

    /// The id the client attached to its event.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Namespace the event arrived on.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reply to the originating client.
    ///
    /// Replying to a client that already disconnected does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded or the client's
    /// outbound queue is full.
    pub fn send_data(&self, data: impl Into<Value>) -> Result<(), SendError> {
        self.client
            .send_packet(&Packet::ack(self.id, self.namespace.as_str(), data.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Server;
    use serde_json::json;
    use wisp_protocol::{decode, PacketType};
    use wisp_transport::memory::pair;

    #[tokio::test]
    async fn test_ack_send_data() {
        let server = Server::default();
        let (conn, mut peer) = pair();
        let client = server.accept(Box::new(conn)).unwrap();
        peer.recv().await.unwrap();

        let ack = Ack::new(7, Arc::clone(&client), "/");
        ack.send_data(json!({"ok": true})).unwrap();
        ack.send_data("again").unwrap();

        let first = decode(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(first.packet_type, PacketType::Ack);
        assert_eq!(first.id, Some(7));
        assert_eq!(first.endpoint, "/");
        assert_eq!(first.data, json!({"ok": true}));

        let second = decode(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(second.data, json!("again"));
    }

    #[tokio::test]
    async fn test_ack_on_closed_client_is_noop() {
        let server = Server::default();
        let (conn, _peer) = pair();
        let client = server.accept(Box::new(conn)).unwrap();
        let ack = Ack::new(1, Arc::clone(&client), "/");

        client.disconnect();
        assert!(ack.send_data("late").is_ok());
        assert_eq!(server.stats().packet_failures, 0);
    }
}
