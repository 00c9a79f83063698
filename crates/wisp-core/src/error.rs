//! Error types for the Wisp core.

use thiserror::Error;
use wisp_protocol::ProtocolError;
use wisp_transport::TransportError;

/// Errors returned by server, namespace, room and client operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// No namespace is registered under this name.
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// A namespace with this name is already registered.
    #[error("Namespace already registered: {0}")]
    NamespaceExists(String),

    /// Invalid namespace name.
    #[error("Invalid namespace name: {0}")]
    InvalidNamespace(&'static str),

    /// No room with this name exists in the namespace.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// A room with this name already exists in the namespace.
    #[error("Room already exists: {0}")]
    RoomExists(String),

    /// The namespace reached its room limit.
    #[error("Maximum rooms reached")]
    MaxRoomsReached,

    /// The client already joined this namespace.
    #[error("Already connected to namespace: {0}")]
    AlreadyConnected(String),

    /// The client has not joined this namespace.
    #[error("Not connected to namespace: {0}")]
    NotConnected(String),

    /// The packet did not name a namespace.
    #[error("Packet missing endpoint")]
    MissingEndpoint,

    /// Namespaces can only be registered before the server runs.
    #[error("Server is already running")]
    ServerAlreadyRunning,

    /// The server reached its connection limit.
    #[error("Maximum connections reached")]
    MaxConnectionsReached,

    /// The client connection is closed.
    #[error("Client connection is closed")]
    ClientClosed,

    /// An inbound frame could not be decoded.
    #[error("Failed to decode packet: {0}")]
    PacketDecode(#[from] ProtocolError),

    /// Transport read or write failure.
    #[error("Connection failure: {0}")]
    ConnectionFailure(#[from] TransportError),
}

impl SocketError {
    /// Numeric code carried in Error packets.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            SocketError::MissingEndpoint => 1000,
            SocketError::PacketDecode(_) => 1001,
            SocketError::NamespaceNotFound(_) => 1004,
            SocketError::NotConnected(_) => 1005,
            SocketError::AlreadyConnected(_) => 1006,
            SocketError::RoomNotFound(_) => 1007,
            SocketError::RoomExists(_) => 1008,
            SocketError::MaxRoomsReached => 1009,
            SocketError::NamespaceExists(_) => 1010,
            SocketError::InvalidNamespace(_) => 1011,
            SocketError::ServerAlreadyRunning => 1012,
            SocketError::MaxConnectionsReached => 1013,
            SocketError::ClientClosed => 1014,
            SocketError::ConnectionFailure(_) => 1015,
        }
    }
}

/// Errors returned when queueing an outbound packet.
///
/// Sending to a closed client is not an error; the packet is dropped.
#[derive(Debug, Error)]
pub enum SendError {
    /// The client's outbound queue is full.
    #[error("Outbound queue full")]
    QueueFull,

    /// The packet could not be encoded.
    #[error("Failed to encode packet: {0}")]
    Encode(#[from] ProtocolError),
}
