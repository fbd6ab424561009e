//! Varint-framed map and list blobs.
//!
//! Server-side scripts exchange structured data through a flat byte blob:
//! the map form is `varint(klen) varint(vlen) key value` repeated until the
//! end of the buffer, the list form is `varint(len) bytes` repeated. Both
//! forms are self-delimiting; a truncated item is a corruption error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::varint;

/// Serializes key/value pairs into the map blob form.
pub fn write_map(pairs: &[(Bytes, Bytes)]) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    for (key, value) in pairs {
        varint::write(&mut buf, key.len() as u64)?;
        varint::write(&mut buf, value.len() as u64)?;
        buf.put_slice(key);
        buf.put_slice(value);
    }
    Ok(buf.freeze())
}

/// Parses a map blob back into key/value pairs.
pub fn read_map(data: &[u8]) -> Result<Vec<(Bytes, Bytes)>, ProtocolError> {
    let mut pairs = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (klen, n) = varint::read(&data[pos..])?;
        pos += n;
        let (vlen, n) = varint::read(&data[pos..])?;
        pos += n;
        let (klen, vlen) = (klen as usize, vlen as usize);
        if data.len() - pos < klen + vlen {
            return Err(ProtocolError::Corrupt {
                context: "blob map item truncated",
            });
        }
        let key = Bytes::copy_from_slice(&data[pos..pos + klen]);
        pos += klen;
        let value = Bytes::copy_from_slice(&data[pos..pos + vlen]);
        pos += vlen;
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// Serializes byte strings into the list blob form.
pub fn write_list(items: &[Bytes]) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    for item in items {
        varint::write(&mut buf, item.len() as u64)?;
        buf.put_slice(item);
    }
    Ok(buf.freeze())
}

/// Parses a list blob back into byte strings.
pub fn read_list(data: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (len, n) = varint::read(&data[pos..])?;
        pos += n;
        let len = len as usize;
        if data.len() - pos < len {
            return Err(ProtocolError::Corrupt {
                context: "blob list item truncated",
            });
        }
        items.push(Bytes::copy_from_slice(&data[pos..pos + len]));
        pos += len;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    #[test]
    fn test_map_roundtrip() {
        let pairs = vec![
            (b(b"k1"), b(b"v1")),
            (b(b""), b(b"empty key")),
            (b(b"empty value"), b(b"")),
            (b(b"binary\x00key"), Bytes::from(vec![0xFF; 200])),
        ];
        let blob = write_map(&pairs).unwrap();
        assert_eq!(read_map(&blob).unwrap(), pairs);
    }

    #[test]
    fn test_list_roundtrip() {
        let items = vec![b(b"alpha"), b(b""), Bytes::from(vec![0u8; 300])];
        let blob = write_list(&items).unwrap();
        assert_eq!(read_list(&blob).unwrap(), items);
    }

    #[test]
    fn test_empty_blob() {
        assert!(read_map(&[]).unwrap().is_empty());
        assert!(read_list(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_map_wire_layout() {
        let blob = write_map(&[(b(b"ab"), b(b"xyz"))]).unwrap();
        assert_eq!(&blob[..], b"\x02\x03abxyz");
    }

    #[test]
    fn test_truncated_map_item() {
        // Lengths promise more bytes than remain.
        let result = read_map(b"\x02\x03abxy");
        assert!(matches!(result, Err(ProtocolError::Corrupt { .. })));
    }

    #[test]
    fn test_truncated_list_item() {
        let result = read_list(b"\x05ab");
        assert!(matches!(result, Err(ProtocolError::Corrupt { .. })));
    }

    #[test]
    fn test_truncated_varint_in_map() {
        let result = read_map(&[0x80]);
        assert!(matches!(result, Err(ProtocolError::Corrupt { .. })));
    }
}
