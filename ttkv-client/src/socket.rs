//! One framed TCP connection.
//!
//! A [`FramedSocket`] owns the stream plus a receive buffer and exposes the
//! two primitives every operation is built from: an exact-length buffered
//! read and an all-or-nothing send. Any failure of either closes the socket
//! for good; a failed socket is never reused.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Largest single read issued against the underlying socket.
const RECV_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
pub struct FramedSocket {
    stream: TcpStream,
    buf: BytesMut,
    chunk: Vec<u8>,
    closed: bool,
}

impl FramedSocket {
    /// Opens a TCP connection with the receive timeout and `TCP_NODELAY`
    /// options applied.
    pub fn connect(
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        nodelay: bool,
    ) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).map_err(ClientError::Transport)?;
        stream.set_read_timeout(timeout).map_err(ClientError::Transport)?;
        if nodelay {
            stream.set_nodelay(true).map_err(ClientError::Transport)?;
        }
        debug!(host, port, "socket connected");
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(8 * 1024),
            chunk: vec![0u8; RECV_CHUNK],
            closed: false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns exactly `n` bytes from the stream.
    ///
    /// Already-buffered bytes are served first; the remainder is read from
    /// the socket in chunks of up to 64 KiB. A zero-byte read means the
    /// peer closed the connection. Every failure closes the socket.
    pub fn recv_exact(&mut self, n: usize) -> Result<Bytes> {
        if self.closed {
            return Err(ClientError::ConnectionClosed);
        }
        while self.buf.len() < n {
            let got = match self.stream.read(&mut self.chunk) {
                Ok(got) => got,
                Err(err) => {
                    self.close();
                    return Err(ClientError::from_read_error(err));
                }
            };
            if got == 0 {
                self.close();
                return Err(ClientError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&self.chunk[..got]);
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Writes every byte of `data`. Any failure closes the socket.
    pub fn send_all(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ClientError::ConnectionClosed);
        }
        if let Err(err) = self.stream.write_all(data) {
            debug!(error = %err, "send failed");
            self.close();
            return Err(ClientError::ConnectionClosed);
        }
        Ok(())
    }

    /// Shuts the connection down in both directions. Idempotent; returns
    /// whether this call actually closed it.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let _ = self.stream.shutdown(Shutdown::Both);
        self.buf.clear();
        true
    }

    pub fn recv_u8(&mut self) -> Result<u8> {
        Ok(self.recv_exact(1)?[0])
    }

    pub fn recv_u16(&mut self) -> Result<u16> {
        let raw = self.recv_exact(2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub fn recv_u32(&mut self) -> Result<u32> {
        let raw = self.recv_exact(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub fn recv_i32(&mut self) -> Result<i32> {
        Ok(self.recv_u32()? as i32)
    }

    pub fn recv_u64(&mut self) -> Result<u64> {
        let raw = self.recv_exact(8)?;
        Ok(u64::from_be_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]))
    }

    pub fn recv_i64(&mut self) -> Result<i64> {
        Ok(self.recv_u64()? as i64)
    }
}
