//! # wisp-protocol
//!
//! Wire protocol definitions for the Wisp realtime server.
//!
//! Every message is a [`Packet`] encoded as a single JSON object per frame:
//!
//! ```text
//! { "type": 2, "endpoint": "/chat", "name": "message", "data": {...}, "id": 7 }
//! ```
//!
//! ## Packet Types
//!
//! - `Connect` / `Disconnect` - Namespace membership
//! - `Event` - Named event with an arbitrary JSON payload
//! - `Ack` - Reply to an event that carried an id
//! - `Error` - Error report
//!
//! ## Example
//!
//! ```rust
//! use wisp_protocol::{codec, Packet};
//!
//! let packet = Packet::event("/chat", "message", serde_json::json!("hello"));
//!
//! let encoded = codec::encode(&packet).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(packet, decoded);
//! ```

pub mod codec;
pub mod packet;

pub use codec::{decode, encode, ProtocolError};
pub use packet::{ErrorBody, Packet, PacketType, ROOT_ENDPOINT};
