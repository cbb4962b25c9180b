//! # mcproxy-protocol
//!
//! Decoding of the Minecraft Java Edition handshake packet.
//!
//! The handshake is the first packet a client sends on a fresh connection and
//! it is never encrypted, which makes it usable as a routing key the same way
//! a TLS ClientHello's SNI is:
//!
//! ```text
//! VarInt packet_length
//! VarInt packet_id          (0x00)
//! VarInt protocol_version
//! String server_address     (VarInt byte length + UTF-8)
//! u16    server_port
//! VarInt next_state
//! ```
//!
//! Only the fields up to and including `server_address` are decoded. Every
//! decoder takes a byte slice and returns the decoded value together with the
//! number of bytes consumed, so callers can advance a cursor.

mod error;
mod handshake;
mod string;
mod varint;

pub use error::ProtocolError;
pub use handshake::{encode_handshake, parse_handshake, Handshake, HANDSHAKE_PACKET_ID};
pub use string::{decode_string, encode_string};
pub use varint::{decode_varint, encode_varint, varint_len, MAX_VARINT_LEN};
