//! Trace Identifiers and the Materialized Trace Row
//!
//! A trace id is an opaque 16-byte value. Blocks sort their rows by the
//! id's 32-character lowercase hex rendering, and every comparison in
//! the lookup path happens on that rendering, so the hex form is a
//! first-class type here ([`HexTraceId`]) rather than a display detail.
//!
//! [`Trace`] is the row the finder materializes on a hit: the id, the
//! trace's time bounds, its root service/span names, and the encoded
//! span payload. The payload is opaque `Bytes`; reconstructing spans is
//! the caller's concern.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw length of a trace id in bytes.
pub const TRACE_ID_LEN: usize = 16;

/// Length of the lowercase hex rendering used as the block sort key.
pub const HEX_TRACE_ID_LEN: usize = 32;

/// The hex rendering of a trace id: 32 lowercase hex characters,
/// compared lexicographically as bytes.
pub type HexTraceId = [u8; HEX_TRACE_ID_LEN];

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// An opaque 16-byte trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceId([u8; TRACE_ID_LEN]);

impl TraceId {
    pub fn new(bytes: [u8; TRACE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TRACE_ID_LEN] {
        &self.0
    }

    /// Render the id as its 32-character lowercase hex sort key.
    pub fn hex(&self) -> HexTraceId {
        let mut out = [0u8; HEX_TRACE_ID_LEN];
        for (i, &byte) in self.0.iter().enumerate() {
            out[2 * i] = HEX_DIGITS[(byte >> 4) as usize];
            out[2 * i + 1] = HEX_DIGITS[(byte & 0x0F) as usize];
        }
        out
    }

    /// Parse a 32-character hex string (either case) back into an id.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != HEX_TRACE_ID_LEN {
            return Err(Error::InvalidInputSize {
                op: "parse",
                typ: "TraceID",
                len: bytes.len(),
            });
        }

        let mut out = [0u8; TRACE_ID_LEN];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = hex_nibble(pair[0]);
            let lo = hex_nibble(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
                _ => {
                    return Err(Error::InvalidInputSize {
                        op: "parse",
                        typ: "TraceID",
                        len: bytes.len(),
                    })
                }
            }
        }
        Ok(Self(out))
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.hex() {
            write!(f, "{}", byte as char)?;
        }
        Ok(())
    }
}

/// A fully materialized trace row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// The trace's identifier (also the block sort key).
    pub trace_id: TraceId,

    /// Start of the earliest span, unix nanoseconds.
    pub start_time_unix_nano: u64,

    /// End of the latest span, unix nanoseconds.
    pub end_time_unix_nano: u64,

    /// Total duration in nanoseconds.
    pub duration_nanos: u64,

    /// Service name of the root span.
    pub root_service_name: String,

    /// Operation name of the root span.
    pub root_span_name: String,

    /// Encoded span payload, opaque to the lookup engine.
    pub spans: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_rendering_is_lowercase() {
        let id = TraceId::new([
            0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E, 0x6F, 0x70, 0x81, 0x92, 0xA3, 0xB4, 0xC5, 0xD6,
            0xE7, 0xF8,
        ]);
        assert_eq!(id.to_string(), "001a2b3c4d5e6f708192a3b4c5d6e7f8");
    }

    #[test]
    fn test_from_hex_roundtrip() {
        let id = TraceId::new(*b"0123456789abcdef");
        let parsed = TraceId::from_hex(&id.to_string()).unwrap();
        assert_eq!(parsed, id);

        // Uppercase input parses, renders lowercase.
        let upper = TraceId::from_hex("001A2B3C4D5E6F708192A3B4C5D6E7F8").unwrap();
        assert_eq!(upper.to_string(), "001a2b3c4d5e6f708192a3b4c5d6e7f8");
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(TraceId::from_hex("abc").is_err());
        assert!(TraceId::from_hex("zz1a2b3c4d5e6f708192a3b4c5d6e7f8").is_err());
    }

    #[test]
    fn test_hex_order_matches_byte_order() {
        // Lexicographic order of the hex rendering equals the byte order
        // of the raw id, so either form can drive comparisons.
        let low = TraceId::new([0u8; 16]);
        let mid = TraceId::new([0x7F; 16]);
        let high = TraceId::new([0xFF; 16]);
        assert!(low.hex() < mid.hex() && mid.hex() < high.hex());
        assert!(low < mid && mid < high);
    }
}
