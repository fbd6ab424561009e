//! # ttkv-protocol
//!
//! Wire-level building blocks for the KT and TT binary key/value dialects.
//!
//! This crate provides:
//! - The self-describing big-endian varint codec used by the in-band
//!   map/list blob format
//! - Request assembly primitives (all integers big-endian on the wire)
//! - The language-neutral [`Value`] model and pluggable value serializers
//! - Dialect constants (magic bytes, opcodes, flag bits)
//!
//! Everything here is free of I/O; the `ttkv-client` crate drives these
//! codecs over real sockets.

pub mod blob;
pub mod consts;
pub mod error;
pub mod serializer;
pub mod value;
pub mod varint;
pub mod wire;

pub use error::ProtocolError;
pub use serializer::{
    IdentityCodec, JsonCodec, MsgPackCodec, OpaqueCodec, TableCodec, TextCodec, ValueCodec,
};
pub use value::{Key, Value};
pub use wire::RequestBuffer;

/// Default port both server dialects listen on.
pub const DEFAULT_PORT: u16 = 1978;

/// Default host for client connections.
pub const DEFAULT_HOST: &str = "127.0.0.1";
