//! VarInt codec.
//!
//! Each byte carries seven value bits, least-significant group first. The top
//! bit of a byte is set when more bytes follow. A 32-bit value never needs more
//! than five bytes.

use crate::error::ProtocolError;

/// Longest valid encoding of a 32-bit VarInt.
pub const MAX_VARINT_LEN: usize = 5;

const SEGMENT_BITS: u8 = 0x7f;
const CONTINUE_BIT: u8 = 0x80;

/// Decode a VarInt from the start of `buf`.
///
/// Returns the value and the number of bytes it occupied.
pub fn decode_varint(buf: &[u8]) -> Result<(i32, usize), ProtocolError> {
    let mut result: u32 = 0;

    for (index, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= u32::from(byte & SEGMENT_BITS) << (7 * index);

        if byte & CONTINUE_BIT == 0 {
            return Ok((result as i32, index + 1));
        }
    }

    if buf.len() < MAX_VARINT_LEN {
        return Err(ProtocolError::UnexpectedEof);
    }

    Err(ProtocolError::MalformedVarInt {
        max: MAX_VARINT_LEN,
    })
}

/// Append the VarInt encoding of `value` to `out`.
///
/// Negative values are encoded as their two's complement and always take
/// five bytes.
pub fn encode_varint(value: i32, out: &mut Vec<u8>) {
    let mut remaining = value as u32;
    loop {
        let segment = (remaining & u32::from(SEGMENT_BITS)) as u8;
        remaining >>= 7;
        if remaining == 0 {
            out.push(segment);
            return;
        }
        out.push(segment | CONTINUE_BIT);
    }
}

/// Number of bytes `encode_varint` produces for `value`.
pub fn varint_len(value: i32) -> usize {
    let bits = 32 - (value as u32).leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}
