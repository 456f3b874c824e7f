//! Data carried between the reader and its consumers.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// A run of bytes as it came off the wire, stamped on arrival.
///
/// Produced only by the reader; order in the sync channel matches arrival
/// order from the port.
#[derive(Debug, Clone)]
pub struct ByteChunk {
    pub bytes: Vec<u8>,
    pub received_at: Instant,
}

impl ByteChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            received_at: Instant::now(),
        }
    }
}

/// A completed unsolicited message, delimited by an inter-byte idle gap.
///
/// Immutable once published; destroyed when drained through
/// `read_async_messages`.
#[derive(Debug, Clone)]
pub struct AsyncPacket {
    /// Raw wire bytes.
    pub raw: Vec<u8>,
    /// UTF-8 text, or hex rendering when the bytes are binary.
    pub text: String,
    /// True when `text` is a hex rendering.
    pub is_hex: bool,
    /// Wall-clock arrival time of the packet's last byte.
    pub received_at: DateTime<Utc>,
}

impl AsyncPacket {
    /// Build a packet from raw bytes, classifying them through the codec.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        let decoded = crate::codec::decode_bytes(&raw);
        Self {
            raw,
            text: decoded.text,
            is_hex: decoded.is_hex,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_classifies_text() {
        let packet = AsyncPacket::from_raw(b"+CMTI: \"SM\",5\r\n".to_vec());
        assert!(!packet.is_hex);
        assert!(packet.text.contains("+CMTI"));
    }

    #[test]
    fn packet_classifies_binary() {
        let packet = AsyncPacket::from_raw(vec![0xff, 0x01, 0xfe]);
        assert!(packet.is_hex);
        assert_eq!(packet.text, "ff 01 fe");
    }
}
