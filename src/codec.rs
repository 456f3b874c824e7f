//! Encoding adapter between tool-layer strings and wire bytes.
//!
//! Decoding is total: bytes that are not valid UTF-8 are classified as
//! binary and rendered as a lowercase space-separated hex string instead of
//! surfacing an error. Encoding accepts either literal UTF-8 text or a hex
//! literal. None of these conversions touch the port.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// How a tool-layer payload string maps to wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// The payload's literal UTF-8 bytes. Callers include `\r\n` themselves.
    Utf8,
    /// Whitespace-separated pairs of hex digits ("01 A0 ff").
    Hex,
}

impl std::str::FromStr for PayloadEncoding {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" => Ok(Self::Utf8),
            "hex" => Ok(Self::Hex),
            other => Err(EngineError::data(format!(
                "unsupported encoding '{other}', expected utf8 or hex"
            ))),
        }
    }
}

/// Result of classifying received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// UTF-8 text, or the hex rendering when the bytes are not valid UTF-8.
    pub text: String,
    /// True when `text` is a hex rendering.
    pub is_hex: bool,
}

/// Classify bytes as text or binary. Never fails.
pub fn decode_bytes(bytes: &[u8]) -> Decoded {
    match std::str::from_utf8(bytes) {
        Ok(text) => Decoded {
            text: text.to_string(),
            is_hex: false,
        },
        Err(_) => Decoded {
            text: format_hex(bytes),
            is_hex: true,
        },
    }
}

/// Lowercase space-separated hex rendering ("aa bb cc").
pub fn format_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Parse a hex literal into bytes.
///
/// Tokens are separated by any amount of whitespace; each token must be an
/// even-length run of hex digits. Anything else is a [`EngineError::Data`].
pub fn parse_hex(input: &str) -> EngineResult<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in input.split_whitespace() {
        if token.len() % 2 != 0 {
            return Err(EngineError::data(format!(
                "hex literal '{token}' has an odd number of digits"
            )));
        }
        for pair in token.as_bytes().chunks(2) {
            let high = hex_digit(pair[0], token)?;
            let low = hex_digit(pair[1], token)?;
            bytes.push((high << 4) | low);
        }
    }
    Ok(bytes)
}

fn hex_digit(ch: u8, token: &str) -> EngineResult<u8> {
    (ch as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| {
            EngineError::data(format!(
                "invalid hex character '{}' in '{token}'",
                ch as char
            ))
        })
}

/// Convert a tool-layer payload string to wire bytes.
pub fn encode_payload(payload: &str, encoding: PayloadEncoding) -> EngineResult<Vec<u8>> {
    match encoding {
        PayloadEncoding::Utf8 => Ok(payload.as_bytes().to_vec()),
        PayloadEncoding::Hex => parse_hex(payload),
    }
}
