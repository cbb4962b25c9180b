//! Length-prefixed UTF-8 strings.

use crate::error::ProtocolError;
use crate::varint::{decode_varint, encode_varint};

/// Decode a VarInt-prefixed UTF-8 string from the start of `buf`.
///
/// The prefix counts bytes, not characters. Returns the string and the total
/// number of bytes consumed (prefix width plus payload length).
pub fn decode_string(buf: &[u8]) -> Result<(String, usize), ProtocolError> {
    let (declared, prefix_len) = decode_varint(buf)?;
    let available = buf.len() - prefix_len;

    let len = usize::try_from(declared)
        .ok()
        .filter(|&len| len <= available)
        .ok_or(ProtocolError::TruncatedString {
            declared: i64::from(declared),
            available,
        })?;

    let payload = &buf[prefix_len..prefix_len + len];
    let value = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;

    Ok((value.to_owned(), prefix_len + len))
}

/// Append `value` to `out` as a VarInt byte length followed by its UTF-8 bytes.
pub fn encode_string(value: &str, out: &mut Vec<u8>) {
    // Protocol strings are capped far below i32::MAX bytes.
    encode_varint(value.len() as i32, out);
    out.extend_from_slice(value.as_bytes());
}
