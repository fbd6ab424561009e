//! Scripted mock server shared by the engine integration tests.
//!
//! Each accepted connection runs one session: a list of exchanges where the
//! server reads the exact request bytes the client is expected to send,
//! asserts them byte-for-byte, and replies with canned bytes. Assertion
//! failures surface when the test joins the server thread via `finish`.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use ttkv_client::ClientConfig;

pub struct Exchange {
    pub expect: Vec<u8>,
    pub reply: Vec<u8>,
}

pub fn exchange(expect: Vec<u8>, reply: Vec<u8>) -> Exchange {
    Exchange { expect, reply }
}

pub struct MockServer {
    pub host: String,
    pub port: u16,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Starts a server that accepts one connection per session, in order.
    pub fn start(sessions: Vec<Vec<Exchange>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            for session in sessions {
                let (mut conn, _) = listener.accept().unwrap();
                for exchange in session {
                    let mut got = vec![0u8; exchange.expect.len()];
                    conn.read_exact(&mut got).unwrap();
                    assert_eq!(got, exchange.expect, "request bytes mismatch");
                    if !exchange.reply.is_empty() {
                        conn.write_all(&exchange.reply).unwrap();
                    }
                }
            }
        });
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            handle,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_host(self.host.clone())
            .with_port(self.port)
    }

    /// Joins the server thread, surfacing any request-byte mismatch.
    pub fn finish(self) {
        self.handle.join().unwrap();
    }
}

/// Little chained builder for expected request and canned reply bytes.
#[derive(Default)]
pub struct Wire(Vec<u8>);

impl Wire {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn u8(mut self, n: u8) -> Self {
        self.0.push(n);
        self
    }

    pub fn u16(mut self, n: u16) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn u32(mut self, n: u32) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn u64(mut self, n: u64) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn i32(mut self, n: i32) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn i64(mut self, n: i64) -> Self {
        self.0.extend_from_slice(&n.to_be_bytes());
        self
    }

    pub fn raw(mut self, data: &[u8]) -> Self {
        self.0.extend_from_slice(data);
        self
    }

    /// `u32` length prefix then the bytes.
    pub fn framed(self, data: &[u8]) -> Self {
        self.u32(data.len() as u32).raw(data)
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

/// Expiration sentinel for records without a TTL.
pub const XT_NONE: i64 = 0x7FFF_FFFF_FFFF_FFFF;
