//! Client error types.

use thiserror::Error;
use ttkv_protocol::ProtocolError;

/// Result type for all client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by client operations.
///
/// Every operation either returns its declared value or fails with exactly
/// one of these; partial results are never returned. Transport failures
/// ([`ClientError::Transport`], [`ClientError::Timeout`],
/// [`ClientError::ConnectionClosed`]) always evict the leased socket;
/// protocol and server anomalies evict it conservatively.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Low-level socket I/O failure unrelated to timeout or orderly close.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The socket receive timeout fired.
    #[error("socket receive timed out")]
    Timeout,

    /// The peer closed the connection, or a read returned zero bytes.
    #[error("connection closed")]
    ConnectionClosed,

    /// A parse invariant was violated: unexpected magic byte, truncated
    /// varint or blob item, undecodable reply data.
    #[error("protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    /// The server reported an internal error: the KT error magic or a TT
    /// status byte outside {0, 1}.
    #[error("server internal error (status byte {status:#04x})")]
    ServerInternal { status: u8 },

    /// Caller-side precondition failure; nothing was written to the wire.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Server-side script execution failed.
    #[error("script '{name}' failed (status byte {status:#04x})")]
    Script { name: String, status: u8 },
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            // Out-of-range varints and codec domain violations are caller
            // mistakes, caught before any bytes hit the wire.
            ProtocolError::VarintRange(_) | ProtocolError::Unencodable(_) => {
                ClientError::BadArgument(err.to_string())
            }
            other => ClientError::Protocol(other),
        }
    }
}

impl ClientError {
    /// Classifies a failed socket read.
    pub(crate) fn from_read_error(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ClientError::Timeout,
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset => {
                ClientError::ConnectionClosed
            }
            _ => ClientError::Transport(err),
        }
    }
}
