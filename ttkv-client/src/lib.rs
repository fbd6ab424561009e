//! # ttkv-client
//!
//! Blocking client for the KT and TT binary key/value dialects.
//!
//! This crate provides:
//! - [`FramedSocket`]: one TCP connection with exact-length buffered reads
//!   and all-or-nothing sends
//! - [`SocketPool`]: per-caller socket leasing with stalest-first idle
//!   reaping
//! - [`KtClient`]: the multi-database, TTL-capable dialect (bulk get/set/
//!   remove and server-side script invocation)
//! - [`TtClient`]: the single-database dialect with its miscellaneous
//!   command surface, table search and replication admin
//!
//! Each socket carries one request at a time; concurrent callers are
//! isolated by per-caller leases. Nothing is retried and no partial result
//! is ever returned.

pub mod config;
pub mod error;
pub mod kt;
pub mod pool;
pub mod socket;
pub mod tt;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use kt::{KtClient, RecordDetail};
pub use pool::{CallerId, SocketPool};
pub use socket::FramedSocket;
pub use tt::{ExtLock, SearchExpression, TtClient};

pub use ttkv_protocol::{
    IdentityCodec, JsonCodec, Key, MsgPackCodec, OpaqueCodec, ProtocolError, TableCodec,
    TextCodec, Value, ValueCodec,
};
