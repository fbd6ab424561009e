//! Request assembly primitives.
//!
//! Every request is fully assembled in memory and sent with a single write;
//! [`RequestBuffer`] is the append-only buffer backing that assembly. All
//! multi-byte integers are big-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Append-only byte buffer owned by a single in-flight request.
#[derive(Debug, Default)]
pub struct RequestBuffer {
    buf: BytesMut,
}

impl RequestBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finishes assembly; the result is handed to the socket in one send.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn put_u8(&mut self, n: u8) -> &mut Self {
        self.buf.put_u8(n);
        self
    }

    pub fn put_u16(&mut self, n: u16) -> &mut Self {
        self.buf.put_u16(n);
        self
    }

    pub fn put_u32(&mut self, n: u32) -> &mut Self {
        self.buf.put_u32(n);
        self
    }

    pub fn put_u64(&mut self, n: u64) -> &mut Self {
        self.buf.put_u64(n);
        self
    }

    pub fn put_i32(&mut self, n: i32) -> &mut Self {
        self.buf.put_i32(n);
        self
    }

    pub fn put_i64(&mut self, n: i64) -> &mut Self {
        self.buf.put_i64(n);
        self
    }

    pub fn put_slice(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// `u32 len` then the key bytes.
    pub fn write_key(&mut self, key: &[u8]) -> &mut Self {
        self.put_u32(key.len() as u32);
        self.put_slice(key)
    }

    /// `u32 count` then each key length-prefixed.
    pub fn write_key_list(&mut self, keys: &[Bytes]) -> &mut Self {
        self.put_u32(keys.len() as u32);
        for key in keys {
            self.write_key(key);
        }
        self
    }

    /// `u32 count` then `u16 db, u32 klen, key` per entry, one shared db.
    pub fn write_key_list_with_db(&mut self, keys: &[Bytes], db: u16) -> &mut Self {
        self.put_u32(keys.len() as u32);
        for key in keys {
            self.put_u16(db);
            self.write_key(key);
        }
        self
    }

    /// `u32 count` then `u16 db, u32 klen, key` per entry, per-entry db.
    pub fn write_db_key_list(&mut self, pairs: &[(u16, Bytes)]) -> &mut Self {
        self.put_u32(pairs.len() as u32);
        for (db, key) in pairs {
            self.put_u16(*db);
            self.write_key(key);
        }
        self
    }

    /// `u32 klen, u32 vlen, key, value`.
    pub fn write_kv(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.put_u32(key.len() as u32);
        self.put_u32(value.len() as u32);
        self.put_slice(key);
        self.put_slice(value)
    }

    /// `u32 count` then `u16 db, u32 klen, u32 vlen, i64 xt, key, value` per
    /// record, one shared db and expiration.
    pub fn write_records_with_db_expire(
        &mut self,
        records: &[(Bytes, Bytes)],
        db: u16,
        xt: i64,
    ) -> &mut Self {
        self.put_u32(records.len() as u32);
        for (key, value) in records {
            self.put_u16(db);
            self.put_u32(key.len() as u32);
            self.put_u32(value.len() as u32);
            self.put_i64(xt);
            self.put_slice(key);
            self.put_slice(value);
        }
        self
    }

    /// The on-wire double: `u64` integer part then `u64` fractional part
    /// scaled by 10^12, both truncated. Negative and non-finite inputs have
    /// no defined wire form and are rejected.
    pub fn write_f64_parts(&mut self, x: f64) -> Result<&mut Self, ProtocolError> {
        let (integ, fract) = f64_parts(x)?;
        self.put_u64(integ);
        Ok(self.put_u64(fract))
    }
}

/// Splits a double into its wire halves. See
/// [`RequestBuffer::write_f64_parts`].
pub fn f64_parts(x: f64) -> Result<(u64, u64), ProtocolError> {
    if !x.is_finite() || x.is_sign_negative() {
        return Err(ProtocolError::Unencodable(format!(
            "double {x} has no wire form (must be finite and non-negative)"
        )));
    }
    let integ = x.trunc();
    let fract = ((x - integ) * 1e12).trunc();
    Ok((integ as u64, fract as u64))
}

/// Reassembles a double from its wire halves.
pub fn f64_from_parts(integ: u64, fract: u64) -> f64 {
    integ as f64 + fract as f64 / 1e12
}
