//! Codec for encoding and decoding Wisp packets.
//!
//! Each packet travels as one JSON object per transport frame; framing is the
//! transport's job, so no length prefix is written.

use bytes::Bytes;
use thiserror::Error;

use crate::packet::Packet;

/// Maximum encoded packet size (1 MiB).
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Packet exceeds maximum size.
    #[error("Packet size {0} exceeds maximum {MAX_PACKET_SIZE}")]
    PacketTooLarge(usize),

    /// Frame contained no data.
    #[error("Empty frame")]
    Empty,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a packet to bytes.
///
/// # Errors
///
/// Returns an error if the packet is too large or encoding fails.
pub fn encode(packet: &Packet) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(packet)?;

    if payload.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a packet from bytes.
///
/// # Errors
///
/// Returns an error if the data is empty, too large, or not a valid packet.
pub fn decode(data: &[u8]) -> Result<Packet, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if data.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLarge(data.len()));
    }

    let packet = serde_json::from_slice(data)?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use serde_json::{json, Value};

    #[test]
    fn test_encode_decode_roundtrip() {
        let packets = vec![
            Packet::connect("/"),
            Packet::disconnect("/chat"),
            Packet::event("/chat", "tick", json!("1")),
            Packet::event_with_ack(42, "/chat", "message", json!({"text": "hi", "n": [1, 2]})),
            Packet::ack(42, "/chat", json!("ok")),
            Packet::error("/", 400, "Packet missing endpoint"),
            Packet::event("/", "position", json!({"x": 0.1, "y": -2.5e-308, "z": 1.8487941207808163})),
            Packet::event("/", "max", json!([f64::MAX, f64::MIN_POSITIVE, f64::EPSILON])),
        ];

        for packet in packets {
            let encoded = encode(&packet).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(packet, decoded);
        }
    }

    #[test]
    fn test_float_payloads_roundtrip_exactly() {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..20_000 {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let value = f64::from_bits(state);
            if !value.is_finite() {
                continue;
            }

            let packet = Packet::event("/", "sample", json!(value));
            let decoded = decode(&encode(&packet).unwrap()).unwrap();
            assert_eq!(
                decoded.data.as_f64().map(f64::to_bits),
                Some(value.to_bits()),
                "{value}"
            );
        }
    }

    #[test]
    fn test_decode_defaults() {
        let packet = decode(br#"{"type": 0}"#).unwrap();
        assert_eq!(packet.packet_type, PacketType::Connect);
        assert_eq!(packet.endpoint, "");
        assert_eq!(packet.name, "");
        assert_eq!(packet.data, Value::Null);
        assert_eq!(packet.id, None);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(decode(b""), Err(ProtocolError::Empty)));
        assert!(matches!(decode(b"not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode(br#"{"type": 9, "endpoint": "/"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode(br#"{"endpoint": "/"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_packet_too_large() {
        let large = "a".repeat(MAX_PACKET_SIZE + 1);
        let packet = Packet::event("/", "big", Value::String(large));

        match encode(&packet) {
            Err(ProtocolError::PacketTooLarge(_)) => {}
            other => panic!("Expected PacketTooLarge error, got {:?}", other),
        }
    }
}
