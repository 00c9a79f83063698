//! Namespace-scoped view of a client.

use crate::ack::Ack;
use crate::client::Client;
use crate::error::{SendError, SocketError};
use crate::namespace::Namespace;
use crate::room::Room;
use crate::store::Store;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use wisp_protocol::ROOT_ENDPOINT;

/// A client as seen by the listeners of one namespace.
///
/// Outbound events are addressed to that namespace and room operations act
/// on its rooms. Event listeners receive an [`Ack`] when the inbound event
/// requested one.
#[derive(Debug, Clone)]
pub struct SocketClient {
    client: Arc<Client>,
    namespace: Namespace,
    ack: Option<Ack>,
}

impl SocketClient {
    pub(crate) fn new(client: Arc<Client>, namespace: Namespace, ack: Option<Ack>) -> Self {
        Self {
            client,
            namespace,
            ack,
        }
    }

    /// Session id of the underlying connection.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.client.id()
    }

    /// The underlying connection.
    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// The namespace this view is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Acknowledgement handle for the current event, if one was requested.
    #[must_use]
    pub fn ack(&self) -> Option<&Ack> {
        self.ack.as_ref()
    }

    /// Per-connection key/value storage.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.client.store()
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.client.is_open()
    }

    /// Send an event to this client on this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be encoded or the outbound queue
    /// is full.
    pub fn send_event(&self, name: &str, data: Value) -> Result<(), SendError> {
        self.client.send_event(self.namespace.name(), name, data)
    }

    /// Join a room of this namespace.
    ///
    /// Unknown rooms are created when the server allows it.
    ///
    /// # Errors
    ///
    /// Returns an error if the room does not exist and cannot be created, or
    /// the client left the namespace or disconnected.
    pub fn join_room(&self, name: &str) -> Result<Arc<Room>, SocketError> {
        let room = match self.namespace.room(name) {
            Ok(room) => room,
            Err(SocketError::RoomNotFound(_)) if self.namespace.auto_create_rooms() => {
                self.namespace.get_or_create_room(name)?
            }
            Err(e) => return Err(e),
        };
        self.client.join_room(&room)?;
        Ok(room)
    }

    /// Leave a room of this namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::RoomNotFound`] if the room does not exist.
    pub fn leave_room(&self, name: &str) -> Result<(), SocketError> {
        let room = self.namespace.room(name)?;
        self.client.leave_room(&room);
        Ok(())
    }

    /// Rooms of this namespace the client is in.
    #[must_use]
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.client.rooms_in(self.namespace.name())
    }

    /// Leave this namespace.
    ///
    /// The client receives a Disconnect packet for the namespace. Leaving the
    /// root namespace closes the whole connection.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::NotConnected`] if the client already left.
    pub fn disconnect(&self) -> Result<(), SocketError> {
        if self.namespace.name() == ROOT_ENDPOINT {
            self.client.disconnect();
            return Ok(());
        }
        self.namespace.remove_client(&self.client, true)
    }
}
