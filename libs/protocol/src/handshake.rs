//! Handshake packet parsing.
//!
//! The parser works on the bytes of a single read. There is no reassembly
//! across reads: if the client's first segment stops before the server
//! address is complete, parsing fails with `IncompleteHandshake`.

use crate::error::ProtocolError;
use crate::string::{decode_string, encode_string};
use crate::varint::{decode_varint, encode_varint};

/// Packet id of the handshake packet.
pub const HANDSHAKE_PACKET_ID: i32 = 0x00;

/// The routed prefix of a handshake packet.
///
/// Port and next state follow `server_address` on the wire but play no part
/// in routing, so they are not decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Declared length of the packet (not used for framing).
    pub packet_length: i32,
    /// Packet id, always [`HANDSHAKE_PACKET_ID`] once parsed.
    pub packet_id: i32,
    /// Client protocol version. Informational only.
    pub protocol_version: i32,
    /// Virtual host the client connected to, exactly as sent.
    pub server_address: String,
}

/// Cursor over a single read buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn varint(&mut self, field: &'static str) -> Result<i32, ProtocolError> {
        let (value, consumed) =
            decode_varint(&self.buf[self.pos..]).map_err(|e| incomplete(e, field))?;
        self.pos += consumed;
        Ok(value)
    }

    fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let (value, consumed) =
            decode_string(&self.buf[self.pos..]).map_err(|e| incomplete(e, field))?;
        self.pos += consumed;
        Ok(value)
    }
}

/// Running out of buffer is reported as an incomplete handshake; other decode
/// errors keep their own kind.
fn incomplete(err: ProtocolError, field: &'static str) -> ProtocolError {
    match err {
        ProtocolError::UnexpectedEof | ProtocolError::TruncatedString { .. } => {
            ProtocolError::IncompleteHandshake { field }
        }
        other => other,
    }
}

/// Parse the routed fields of a handshake from the first bytes of a connection.
pub fn parse_handshake(buf: &[u8]) -> Result<Handshake, ProtocolError> {
    let mut reader = Reader::new(buf);

    let packet_length = reader.varint("packet_length")?;

    let packet_id = reader.varint("packet_id")?;
    if packet_id != HANDSHAKE_PACKET_ID {
        return Err(ProtocolError::NotAHandshake { packet_id });
    }

    let protocol_version = reader.varint("protocol_version")?;
    let server_address = reader.string("server_address")?;

    Ok(Handshake {
        packet_length,
        packet_id,
        protocol_version,
        server_address,
    })
}

/// Encode a complete handshake packet, length prefix included.
pub fn encode_handshake(
    protocol_version: i32,
    server_address: &str,
    server_port: u16,
    next_state: i32,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(server_address.len() + 16);
    encode_varint(HANDSHAKE_PACKET_ID, &mut body);
    encode_varint(protocol_version, &mut body);
    encode_string(server_address, &mut body);
    body.extend_from_slice(&server_port.to_be_bytes());
    encode_varint(next_state, &mut body);

    let mut packet = Vec::with_capacity(body.len() + 5);
    encode_varint(body.len() as i32, &mut packet);
    packet.extend_from_slice(&body);
    packet
}
