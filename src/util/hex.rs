//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for meter capture dumps and for reading captured SML
//! traffic back in. Captures are accepted in the shapes they usually come in:
//! plain hex (`1b1b1b1b`), spaced hex (`1B 1B 1B 1B`) and the comma separated
//! `0x1B, 0x1B` listing the node prints after a complete message.
//!
//! ```rust
//! use sml_node::util::hex::{decode_hex, format_capture_listing};
//!
//! let data = decode_hex("0x1B, 0x1B, 0x1B, 0x1B").unwrap();
//! assert_eq!(data, vec![0x1B; 4]);
//! assert_eq!(format_capture_listing(&data, 15), "0x1B, 0x1B, 0x1B, 0x1B");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

impl From<HexError> for crate::error::NodeError {
    fn from(e: HexError) -> Self {
        crate::error::NodeError::InvalidHexString(e.to_string())
    }
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Encode bytes to uppercase hex string
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode a hex capture to bytes
///
/// Whitespace, commas and `0x` prefixes are ignored, so both plain hex and
/// the node's own capture listing decode.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Pretty-print hex data with offsets and an ASCII column
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    if data.is_empty() || bytes_per_line == 0 {
        return String::new();
    }

    data.chunks(bytes_per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let hex_part = format_hex_compact(chunk);
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:04x}: {:<width$} |{}|",
                i * bytes_per_line,
                hex_part,
                ascii,
                width = bytes_per_line * 3 - 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "1b 1b 1b 1b" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a captured message as `0x1B, 0x1B, ...` with a line break every
/// `per_line` bytes
pub fn format_capture_listing(data: &[u8], per_line: usize) -> String {
    let per_line = per_line.max(1);
    data.chunks(per_line)
        .map(|chunk| {
            chunk
                .iter()
                .map(|b| format!("0x{b:02X}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join(",\n")
}
