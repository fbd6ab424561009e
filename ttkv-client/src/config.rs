//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use ttkv_protocol::{TextCodec, ValueCodec, DEFAULT_HOST, DEFAULT_PORT};

/// Construction parameters shared by both engines.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host, default `127.0.0.1`.
    pub host: String,
    /// Server port, default `1978`.
    pub port: u16,
    /// Return keys as text (true, default) or raw bytes (false).
    pub decode_keys: bool,
    /// Value codec; defaults to the UTF-8 text codec.
    pub serializer: Arc<dyn ValueCodec>,
    /// Per-socket receive timeout; `None` (default) disables it.
    pub timeout: Option<Duration>,
    /// Disable Nagle's algorithm on new sockets (default true).
    pub nodelay: bool,
    /// Share idle sockets across callers (default true). When false every
    /// caller keeps one persistent socket of its own.
    pub connection_pool: bool,
    /// Database index used when a KT call omits one. Ignored by TT.
    pub default_db: u16,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            decode_keys: true,
            serializer: Arc::new(TextCodec),
            timeout: None,
            nodelay: true,
            connection_pool: true,
            default_db: 0,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_decode_keys(mut self, decode_keys: bool) -> Self {
        self.decode_keys = decode_keys;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn ValueCodec>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn without_connection_pool(mut self) -> Self {
        self.connection_pool = false;
        self
    }

    pub fn with_default_db(mut self, db: u16) -> Self {
        self.default_db = db;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
