//! Packet types for the Wisp protocol.
//!
//! A packet is the envelope for every message exchanged between a client
//! and the server. Each packet is serialized as one JSON object per frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Endpoint of the root namespace.
pub const ROOT_ENDPOINT: &str = "/";

/// Packet type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PacketType {
    /// Join a namespace (client → server) or confirm the join (server → client).
    Connect = 0,
    /// Leave a namespace.
    Disconnect = 1,
    /// Named event carrying a payload.
    Event = 2,
    /// Acknowledgement of an event that carried an id.
    Ack = 3,
    /// Error report.
    Error = 4,
}

impl From<PacketType> for u8 {
    fn from(pt: PacketType) -> u8 {
        pt as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(PacketType::Connect),
            1 => Ok(PacketType::Disconnect),
            2 => Ok(PacketType::Event),
            3 => Ok(PacketType::Ack),
            4 => Ok(PacketType::Error),
            _ => Err("Invalid packet type"),
        }
    }
}

/// Payload carried by [`PacketType::Error`] packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

/// A protocol packet.
///
/// `endpoint` addresses a namespace by name (`"/"` for the root namespace).
/// A present, non-zero `id` on an event signals that the sender expects an
/// acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet type.
    #[serde(rename = "type")]
    pub packet_type: PacketType,
    /// Target namespace.
    #[serde(default)]
    pub endpoint: String,
    /// Event name.
    #[serde(default)]
    pub name: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
    /// Acknowledgement id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Packet {
    /// Create an empty packet of the given type addressed to `endpoint`.
    #[must_use]
    pub fn new(packet_type: PacketType, endpoint: impl Into<String>) -> Self {
        Self {
            packet_type,
            endpoint: endpoint.into(),
            name: String::new(),
            data: Value::Null,
            id: None,
        }
    }

    /// Create a Connect packet.
    #[must_use]
    pub fn connect(endpoint: impl Into<String>) -> Self {
        Self::new(PacketType::Connect, endpoint)
    }

    /// Create a Disconnect packet.
    #[must_use]
    pub fn disconnect(endpoint: impl Into<String>) -> Self {
        Self::new(PacketType::Disconnect, endpoint)
    }

    /// Create an Event packet.
    #[must_use]
    pub fn event(endpoint: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            ..Self::new(PacketType::Event, endpoint)
        }
    }

    /// Create an Event packet that requests an acknowledgement.
    #[must_use]
    pub fn event_with_ack(
        id: i64,
        endpoint: impl Into<String>,
        name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: Some(id),
            ..Self::event(endpoint, name, data)
        }
    }

    /// Create an Ack packet.
    #[must_use]
    pub fn ack(id: i64, endpoint: impl Into<String>, data: Value) -> Self {
        Self {
            id: Some(id),
            data,
            ..Self::new(PacketType::Ack, endpoint)
        }
    }

    /// Create an Error packet.
    #[must_use]
    pub fn error(endpoint: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        let body = ErrorBody {
            code,
            message: message.into(),
        };
        Self {
            data: serde_json::to_value(body).unwrap_or(Value::Null),
            ..Self::new(PacketType::Error, endpoint)
        }
    }

    /// The acknowledgement id, if the packet requests one.
    ///
    /// An id of zero means "no acknowledgement expected".
    #[must_use]
    pub fn ack_id(&self) -> Option<i64> {
        self.id.filter(|id| *id != 0)
    }

    /// Decode the error body of an Error packet.
    #[must_use]
    pub fn error_body(&self) -> Option<ErrorBody> {
        if self.packet_type != PacketType::Error {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}
