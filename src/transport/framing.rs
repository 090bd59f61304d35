//! Payload framing for FERRY transport layer.
//!
//! The wire carries raw payload bytes. The framing decides how the consumer
//! knows the payload is complete:
//!
//! | Framing | On the wire | Complete when |
//! |---|---|---|
//! | [`Framing::EndOfStream`] | payload, half-close | EOF |
//! | [`Framing::FixedSize`] | payload, half-close | `n` bytes read |
//! | [`Framing::LengthPrefixed`] | u64 BE length, payload, half-close | length bytes read |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::LENGTH_PREFIX_SIZE;

/// Completion signal agreed by both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Producer half-closes after the last byte; consumer reads to EOF.
    #[default]
    EndOfStream,
    /// Both sides agree on a byte count out of band.
    FixedSize(u64),
    /// Producer sends an 8-byte big-endian length before the payload.
    LengthPrefixed,
}

impl Framing {
    /// Check if a length header precedes the payload.
    pub fn has_header(self) -> bool {
        matches!(self, Self::LengthPrefixed)
    }

    /// Encode the length header for a payload of `len` bytes, if any.
    pub fn encode_header(self, len: u64) -> Option<[u8; LENGTH_PREFIX_SIZE]> {
        self.has_header().then(|| len.to_be_bytes())
    }

    /// Decode a length header.
    pub fn decode_header(header: [u8; LENGTH_PREFIX_SIZE]) -> u64 {
        u64::from_be_bytes(header)
    }

    /// Byte count known before any payload byte is read.
    pub fn fixed_len(self) -> Option<u64> {
        match self {
            Self::FixedSize(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("eof"),
            Self::FixedSize(n) => write!(f, "fixed:{n}"),
            Self::LengthPrefixed => f.write_str("length-prefixed"),
        }
    }
}

/// Error parsing a framing name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown framing {0:?} (expected eof, length-prefixed or fixed:<bytes>)")]
pub struct ParseFramingError(String);

impl FromStr for Framing {
    type Err = ParseFramingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "eof" | "end-of-stream" => Ok(Self::EndOfStream),
            "length-prefixed" | "prefixed" => Ok(Self::LengthPrefixed),
            other => other
                .strip_prefix("fixed:")
                .and_then(|n| n.parse().ok())
                .map(Self::FixedSize)
                .ok_or_else(|| ParseFramingError(s.to_string())),
        }
    }
}
