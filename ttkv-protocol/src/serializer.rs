//! Pluggable value serializers.
//!
//! A codec is a pair of functions between raw wire bytes and the [`Value`]
//! domain. Engines hold one codec for their lifetime; every operation that
//! moves values also has a `_raw` variant that bypasses it.
//!
//! Encode-side domain violations are reported as [`ProtocolError::Unencodable`]
//! (a caller mistake); decode-side ones as corruption or unsupported-data
//! errors (the server handed back something outside the codec's domain).

use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::value::Value;
use crate::varint;

/// Translates between application values and wire bytes.
pub trait ValueCodec: Debug + Send + Sync {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError>;
    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError>;
}

/// Pass-through codec: values are raw byte strings on both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl ValueCodec for IdentityCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(ProtocolError::Unencodable(format!(
                "identity codec carries byte strings only, got {other:?}"
            ))),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError> {
        Ok(Value::Bytes(Bytes::copy_from_slice(raw)))
    }
}

/// UTF-8 text codec. Text is encoded as UTF-8, byte strings pass through;
/// decoding always yields text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl ValueCodec for TextCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError> {
        match value {
            Value::Str(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(ProtocolError::Unencodable(format!(
                "text codec carries text or bytes, got {other:?}"
            ))),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError> {
        let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8("text value"))?;
        Ok(Value::Str(text.to_owned()))
    }
}

/// Compact JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError> {
        let json = value_to_json(value)?;
        Ok(Bytes::from(serde_json::to_vec(&json)?))
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError> {
        let json: serde_json::Value = serde_json::from_slice(raw)?;
        Ok(json_to_value(json))
    }
}

fn value_to_json(value: &Value) -> Result<serde_json::Value, ProtocolError> {
    use serde_json::Value as Json;
    Ok(match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::Number((*n).into()),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(Json::Number)
            .ok_or_else(|| {
                ProtocolError::Unencodable(format!("non-finite float {x} has no JSON form"))
            })?,
        Value::Str(s) => Json::String(s.clone()),
        Value::Bytes(_) => {
            return Err(ProtocolError::Unencodable(
                "JSON has no byte-string form".to_owned(),
            ))
        }
        Value::List(items) => Json::Array(
            items
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Map(pairs) => {
            let mut object = serde_json::Map::with_capacity(pairs.len());
            for (key, value) in pairs {
                let Value::Str(key) = key else {
                    return Err(ProtocolError::Unencodable(
                        "JSON object keys must be text".to_owned(),
                    ));
                };
                object.insert(key.clone(), value_to_json(value)?);
            }
            Json::Object(object)
        }
    })
}

fn json_to_value(json: serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        Json::Object(object) => Value::Map(
            object
                .into_iter()
                .map(|(k, v)| (Value::Str(k), json_to_value(v)))
                .collect(),
        ),
    }
}

/// MessagePack codec, backed by `rmpv` value-level encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl ValueCodec for MsgPackCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value_to_rmpv(value))?;
        Ok(Bytes::from(buf))
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError> {
        let mut reader = raw;
        let decoded = rmpv::decode::read_value(&mut reader)?;
        rmpv_to_value(decoded)
    }
}

fn value_to_rmpv(value: &Value) -> rmpv::Value {
    match value {
        Value::Nil => rmpv::Value::Nil,
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::Int(n) => rmpv::Value::from(*n),
        Value::Float(x) => rmpv::Value::F64(*x),
        Value::Str(s) => rmpv::Value::from(s.as_str()),
        Value::Bytes(b) => rmpv::Value::Binary(b.to_vec()),
        Value::List(items) => rmpv::Value::Array(items.iter().map(value_to_rmpv).collect()),
        Value::Map(pairs) => rmpv::Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (value_to_rmpv(k), value_to_rmpv(v)))
                .collect(),
        ),
    }
}

fn rmpv_to_value(value: rmpv::Value) -> Result<Value, ProtocolError> {
    Ok(match value {
        rmpv::Value::Nil => Value::Nil,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => return Err(ProtocolError::Unsupported("msgpack integer beyond i64")),
        },
        rmpv::Value::F32(x) => Value::Float(x.into()),
        rmpv::Value::F64(x) => Value::Float(x),
        rmpv::Value::String(s) => match s.into_str() {
            Some(text) => Value::Str(text),
            None => return Err(ProtocolError::InvalidUtf8("msgpack string")),
        },
        rmpv::Value::Binary(b) => Value::Bytes(Bytes::from(b)),
        rmpv::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(rmpv_to_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        rmpv::Value::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((rmpv_to_value(k)?, rmpv_to_value(v)?)))
                .collect::<Result<Vec<_>, ProtocolError>>()?,
        ),
        rmpv::Value::Ext(..) => {
            return Err(ProtocolError::Unsupported("msgpack extension value"))
        }
    })
}

/// Self-describing tagged binary codec, total over the whole [`Value`]
/// domain: a one-byte tag, fixed-width scalars, varint-framed strings and
/// containers. Round-trips every value exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueCodec;

const TAG_NIL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

/// Nesting cap while decoding; deeper input is treated as corrupt.
const MAX_NESTING: usize = 64;

impl ValueCodec for OpaqueCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        write_opaque(&mut buf, value)?;
        Ok(buf.freeze())
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError> {
        let mut pos = 0;
        let value = read_opaque(raw, &mut pos, 0)?;
        if pos != raw.len() {
            return Err(ProtocolError::Corrupt {
                context: "opaque value has trailing bytes",
            });
        }
        Ok(value)
    }
}

fn write_opaque(buf: &mut BytesMut, value: &Value) -> Result<(), ProtocolError> {
    match value {
        Value::Nil => buf.put_u8(TAG_NIL),
        Value::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        Value::Int(n) => {
            buf.put_u8(TAG_INT);
            buf.put_i64(*n);
        }
        Value::Float(x) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_u64(x.to_bits());
        }
        Value::Str(s) => {
            buf.put_u8(TAG_STR);
            varint::write(buf, s.len() as u64)?;
            buf.put_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            varint::write(buf, b.len() as u64)?;
            buf.put_slice(b);
        }
        Value::List(items) => {
            buf.put_u8(TAG_LIST);
            varint::write(buf, items.len() as u64)?;
            for item in items {
                write_opaque(buf, item)?;
            }
        }
        Value::Map(pairs) => {
            buf.put_u8(TAG_MAP);
            varint::write(buf, pairs.len() as u64)?;
            for (key, value) in pairs {
                write_opaque(buf, key)?;
                write_opaque(buf, value)?;
            }
        }
    }
    Ok(())
}

fn read_opaque(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, ProtocolError> {
    if depth > MAX_NESTING {
        return Err(ProtocolError::Corrupt {
            context: "opaque value nested too deeply",
        });
    }
    let tag = take(data, pos, 1)?[0];
    Ok(match tag {
        TAG_NIL => Value::Nil,
        TAG_BOOL => match take(data, pos, 1)?[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            _ => {
                return Err(ProtocolError::Corrupt {
                    context: "opaque boolean byte",
                })
            }
        },
        TAG_INT => {
            let raw: [u8; 8] = take(data, pos, 8)?.try_into().map_err(|_| {
                ProtocolError::Corrupt {
                    context: "opaque integer",
                }
            })?;
            Value::Int(i64::from_be_bytes(raw))
        }
        TAG_FLOAT => {
            let raw: [u8; 8] = take(data, pos, 8)?.try_into().map_err(|_| {
                ProtocolError::Corrupt {
                    context: "opaque float",
                }
            })?;
            Value::Float(f64::from_bits(u64::from_be_bytes(raw)))
        }
        TAG_STR => {
            let raw = take_framed(data, pos)?;
            let text = std::str::from_utf8(raw)
                .map_err(|_| ProtocolError::InvalidUtf8("opaque text value"))?;
            Value::Str(text.to_owned())
        }
        TAG_BYTES => Value::Bytes(Bytes::copy_from_slice(take_framed(data, pos)?)),
        TAG_LIST => {
            let count = read_count(data, pos)?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_opaque(data, pos, depth + 1)?);
            }
            Value::List(items)
        }
        TAG_MAP => {
            let count = read_count(data, pos)?;
            let mut pairs = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let key = read_opaque(data, pos, depth + 1)?;
                let value = read_opaque(data, pos, depth + 1)?;
                pairs.push((key, value));
            }
            Value::Map(pairs)
        }
        _ => {
            return Err(ProtocolError::Corrupt {
                context: "opaque value tag",
            })
        }
    })
}

fn take<'a>(data: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], ProtocolError> {
    if data.len() - *pos < n {
        return Err(ProtocolError::Corrupt {
            context: "opaque value truncated",
        });
    }
    let slice = &data[*pos..*pos + n];
    *pos += n;
    Ok(slice)
}

fn take_framed<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8], ProtocolError> {
    let len = read_count(data, pos)?;
    take(data, pos, len)
}

fn read_count(data: &[u8], pos: &mut usize) -> Result<usize, ProtocolError> {
    let (count, consumed) = varint::read(&data[*pos..])?;
    *pos += consumed;
    Ok(count as usize)
}

/// NUL-separated column codec used by TT table databases: a map of text or
/// byte columns flattened to `key NUL value NUL key NUL value ...`.
///
/// Neither keys nor values may contain NUL. Columns decode back as text
/// when they are valid UTF-8, byte strings otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableCodec;

impl ValueCodec for TableCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, ProtocolError> {
        let Value::Map(pairs) = value else {
            return Err(ProtocolError::Unencodable(
                "table codec carries maps only".to_owned(),
            ));
        };
        let mut buf = BytesMut::new();
        for (key, value) in pairs {
            push_column(&mut buf, key)?;
            push_column(&mut buf, value)?;
        }
        if !buf.is_empty() {
            buf.truncate(buf.len() - 1);
        }
        Ok(buf.freeze())
    }

    fn decode(&self, raw: &[u8]) -> Result<Value, ProtocolError> {
        if raw.is_empty() {
            return Ok(Value::Map(Vec::new()));
        }
        let mut columns = raw.split(|&b| b == 0);
        let mut pairs = Vec::new();
        while let Some(key) = columns.next() {
            // A dangling trailing column (from a trailing NUL or an odd
            // column count) is dropped, matching the server convention.
            let Some(value) = columns.next() else { break };
            pairs.push((column_value(key), column_value(value)));
        }
        Ok(Value::Map(pairs))
    }
}

fn push_column(buf: &mut BytesMut, value: &Value) -> Result<(), ProtocolError> {
    let raw: &[u8] = match value {
        Value::Str(s) => s.as_bytes(),
        Value::Bytes(b) => b,
        other => {
            return Err(ProtocolError::Unencodable(format!(
                "table columns must be text or bytes, got {other:?}"
            )))
        }
    };
    if raw.contains(&0) {
        return Err(ProtocolError::Unencodable(
            "table columns cannot contain NUL".to_owned(),
        ));
    }
    buf.put_slice(raw);
    buf.put_u8(0);
    Ok(())
}

fn column_value(raw: &[u8]) -> Value {
    match std::str::from_utf8(raw) {
        Ok(text) => Value::Str(text.to_owned()),
        Err(_) => Value::Bytes(Bytes::copy_from_slice(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys kept in sorted order so the JSON round trip (which sorts map
    // keys) compares equal structurally.
    fn nested_value() -> Value {
        Value::Map(vec![
            (
                Value::Str("a".into()),
                Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ),
            (Value::Str("flag".into()), Value::Bool(true)),
            (Value::Str("none".into()), Value::Nil),
            (Value::Str("pi".into()), Value::Float(3.25)),
        ])
    }

    #[test]
    fn test_identity_roundtrip() {
        let codec = IdentityCodec;
        let value = Value::Bytes(Bytes::from_static(b"\x00\x01raw"));
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_identity_rejects_structures() {
        let result = IdentityCodec.encode(&Value::Int(1));
        assert!(matches!(result, Err(ProtocolError::Unencodable(_))));
    }

    #[test]
    fn test_text_roundtrip() {
        let codec = TextCodec;
        let encoded = codec.encode(&Value::Str("héllo".into())).unwrap();
        assert_eq!(encoded, Bytes::from_static("héllo".as_bytes()));
        assert_eq!(codec.decode(&encoded).unwrap(), Value::Str("héllo".into()));
    }

    #[test]
    fn test_text_bytes_pass_through_on_encode() {
        let encoded = TextCodec.encode(&Value::Bytes(Bytes::from_static(b"abc"))).unwrap();
        assert_eq!(&encoded[..], b"abc");
    }

    #[test]
    fn test_text_rejects_invalid_utf8_on_decode() {
        let result = TextCodec.decode(&[0xFF, 0xFE]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonCodec;
        let value = nested_value();
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_json_is_compact() {
        let encoded = JsonCodec
            .encode(&Value::Map(vec![(
                Value::Str("a".into()),
                Value::List(vec![Value::Int(1), Value::Int(2)]),
            )]))
            .unwrap();
        assert_eq!(&encoded[..], br#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_json_rejects_bytes() {
        let result = JsonCodec.encode(&Value::Bytes(Bytes::from_static(b"x")));
        assert!(matches!(result, Err(ProtocolError::Unencodable(_))));
    }

    #[test]
    fn test_json_rejects_non_text_keys() {
        let result = JsonCodec.encode(&Value::Map(vec![(Value::Int(1), Value::Nil)]));
        assert!(matches!(result, Err(ProtocolError::Unencodable(_))));
    }

    #[test]
    fn test_msgpack_roundtrip() {
        let codec = MsgPackCodec;
        let value = Value::Map(vec![(
            Value::Str("blob".into()),
            Value::Bytes(Bytes::from_static(b"\x00\xFF")),
        )]);
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);

        let nested = nested_value();
        let encoded = codec.encode(&nested).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), nested);
    }

    #[test]
    fn test_msgpack_decode_garbage() {
        assert!(MsgPackCodec.decode(&[0xC1]).is_err());
    }

    #[test]
    fn test_opaque_roundtrip_full_domain() {
        let codec = OpaqueCodec;
        let value = Value::List(vec![
            Value::Nil,
            Value::Bool(false),
            Value::Int(-42),
            Value::Int(i64::MIN),
            Value::Float(-2.5),
            Value::Str("text".into()),
            Value::Bytes(Bytes::from_static(b"\x00\x01\x02")),
            nested_value(),
            Value::Map(vec![(Value::Bytes(Bytes::from_static(b"k")), Value::Int(9))]),
        ]);
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_opaque_truncated() {
        let encoded = OpaqueCodec.encode(&Value::Str("hello".into())).unwrap();
        let result = OpaqueCodec.decode(&encoded[..encoded.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::Corrupt { .. })));
    }

    #[test]
    fn test_opaque_trailing_bytes() {
        let mut encoded = OpaqueCodec.encode(&Value::Nil).unwrap().to_vec();
        encoded.push(0x00);
        let result = OpaqueCodec.decode(&encoded);
        assert!(matches!(result, Err(ProtocolError::Corrupt { .. })));
    }

    #[test]
    fn test_opaque_unknown_tag() {
        let result = OpaqueCodec.decode(&[0x7F]);
        assert!(matches!(result, Err(ProtocolError::Corrupt { .. })));
    }

    #[test]
    fn test_table_roundtrip() {
        let codec = TableCodec;
        let value = Value::Map(vec![
            (Value::Str("name".into()), Value::Str("huey".into())),
            (Value::Str("kind".into()), Value::Str("cat".into())),
        ]);
        let encoded = codec.encode(&value).unwrap();
        assert_eq!(&encoded[..], b"name\x00huey\x00kind\x00cat");
        assert_eq!(codec.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_table_empty_map() {
        let encoded = TableCodec.encode(&Value::Map(Vec::new())).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(TableCodec.decode(&encoded).unwrap(), Value::Map(Vec::new()));
    }

    #[test]
    fn test_table_rejects_nul() {
        let result = TableCodec.encode(&Value::Map(vec![(
            Value::Str("k".into()),
            Value::Bytes(Bytes::from_static(b"a\x00b")),
        )]));
        assert!(matches!(result, Err(ProtocolError::Unencodable(_))));
    }

    #[test]
    fn test_table_tolerates_trailing_nul() {
        let decoded = TableCodec.decode(b"a\x00b\x00").unwrap();
        assert_eq!(
            decoded,
            Value::Map(vec![(Value::Str("a".into()), Value::Str("b".into()))])
        );
    }
}
