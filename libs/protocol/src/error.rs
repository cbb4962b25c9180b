//! Error types for handshake decoding.

use thiserror::Error;

/// Errors raised while decoding protocol primitives and the handshake packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A VarInt ran past five bytes without terminating.
    #[error("malformed VarInt: no terminating byte within {max} bytes")]
    MalformedVarInt { max: usize },

    /// The buffer ended in the middle of a VarInt.
    #[error("unexpected end of buffer while decoding VarInt")]
    UnexpectedEof,

    /// A string declared more bytes than the buffer holds.
    #[error("truncated string: declared {declared} bytes, {available} available")]
    TruncatedString { declared: i64, available: usize },

    /// String payload is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// The first packet on the connection is not a handshake.
    #[error("not a handshake: packet id {packet_id:#04x}")]
    NotAHandshake { packet_id: i32 },

    /// The buffer ended before every routed handshake field was decoded.
    #[error("incomplete handshake: buffer ended while reading {field}")]
    IncompleteHandshake { field: &'static str },
}

impl ProtocolError {
    /// Stable label for logs and counters.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ProtocolError::MalformedVarInt { .. } => "malformed_varint",
            ProtocolError::UnexpectedEof => "unexpected_eof",
            ProtocolError::TruncatedString { .. } => "truncated_string",
            ProtocolError::InvalidUtf8 => "invalid_utf8",
            ProtocolError::NotAHandshake { .. } => "not_a_handshake",
            ProtocolError::IncompleteHandshake { .. } => "incomplete_handshake",
        }
    }
}
