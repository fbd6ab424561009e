//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Wire data violated a framing invariant.
    #[error("corrupt {context}")]
    Corrupt { context: &'static str },

    /// A varint value exceeded the eight-byte encoding range.
    #[error("varint value {0} out of range (max 2^56 - 1)")]
    VarintRange(u64),

    /// The first byte of a response did not match any known reply.
    #[error("unexpected magic byte {0:#04x}")]
    UnexpectedMagic(u8),

    /// Text was expected but the bytes were not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The value cannot be represented by the selected codec.
    #[error("value not encodable: {0}")]
    Unencodable(String),

    /// Decoded data used a construct this client does not model.
    #[error("unsupported {0}")]
    Unsupported(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode error: {0}")]
    MsgPackEncode(#[from] rmpv::encode::Error),

    #[error("msgpack decode error: {0}")]
    MsgPackDecode(#[from] rmpv::decode::Error),
}
