//! Self-describing big-endian base-128 integers.
//!
//! The blob format exchanged with server-side scripts frames every length
//! with this encoding: 1-8 digits of 7 bits each, most significant first,
//! the high bit set on every byte except the last. The largest encodable
//! value is 2^56 - 1.

use bytes::BufMut;

use crate::error::ProtocolError;

/// Largest value the eight-byte encoding can carry.
pub const MAX: u64 = (1 << 56) - 1;

/// Longest possible encoding in bytes.
pub const MAX_LEN: usize = 8;

/// Appends the varint encoding of `n` to `buf`.
///
/// Values above [`MAX`] are rejected.
pub fn write(buf: &mut impl BufMut, n: u64) -> Result<(), ProtocolError> {
    if n > MAX {
        return Err(ProtocolError::VarintRange(n));
    }
    let mut len = 1;
    while len < MAX_LEN && n >= 1u64 << (7 * len) {
        len += 1;
    }
    for i in (1..len).rev() {
        buf.put_u8(((n >> (7 * i)) & 0x7F) as u8 | 0x80);
    }
    buf.put_u8((n & 0x7F) as u8);
    Ok(())
}

/// Reads one varint from the front of `data`.
///
/// Returns the decoded value and the number of bytes consumed. Running out
/// of input before a terminating byte (high bit clear) is a corruption
/// error.
pub fn read(data: &[u8]) -> Result<(u64, usize), ProtocolError> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_LEN {
            return Err(ProtocolError::Corrupt {
                context: "varint longer than eight bytes",
            });
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ProtocolError::Corrupt {
        context: "varint missing terminator",
    })
}
