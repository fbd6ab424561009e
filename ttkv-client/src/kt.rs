//! KT dialect engine: multi-database, TTL-capable bulk operations and
//! server-side script invocation.
//!
//! Every request is one magic byte, a `u32` flags word, then the operation
//! body. The server echoes the magic on success or answers with the error
//! magic, in which case nothing further is parsed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use ttkv_protocol::consts::{kt, EXPIRE_NONE};
use ttkv_protocol::{Key, ProtocolError, RequestBuffer, Value, ValueCodec};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pool::SocketPool;
use crate::socket::FramedSocket;

/// One record from [`KtClient::get_bulk_details`].
#[derive(Debug, Clone)]
pub struct RecordDetail {
    /// Database index the record came from.
    pub db: u16,
    pub key: Key,
    pub value: Value,
    /// Absolute expiration time reported by the server.
    pub expire: i64,
}

/// `(db, key, value, xt)` exactly as read off the wire.
type RawRecord = (u16, Bytes, Bytes, i64);

/// Client for the KT dialect.
pub struct KtClient {
    pool: SocketPool,
    serializer: Arc<dyn ValueCodec>,
    decode_keys: bool,
    default_db: u16,
}

impl KtClient {
    pub fn new(config: ClientConfig) -> Self {
        let pool = SocketPool::new(
            config.host,
            config.port,
            config.timeout,
            config.nodelay,
            config.connection_pool,
        );
        Self {
            pool,
            serializer: config.serializer,
            decode_keys: config.decode_keys,
            default_db: config.default_db,
        }
    }

    /// The underlying socket pool, for embedder-driven maintenance.
    pub fn pool(&self) -> &SocketPool {
        &self.pool
    }

    /// Closes idle sockets older than `cutoff`; returns how many.
    pub fn close_idle(&self, cutoff: Duration) -> usize {
        self.pool.close_idle(cutoff)
    }

    /// Closes every socket this client holds.
    pub fn close_all(&self) {
        self.pool.close_all()
    }

    // =========================================================================
    // Fetching
    // =========================================================================

    /// Fetches a single record.
    pub fn get(&self, key: impl Into<Key>, db: Option<u16>) -> Result<Option<Value>> {
        match self.get_raw(key, db)? {
            Some(raw) => Ok(Some(self.decode_value(&raw)?)),
            None => Ok(None),
        }
    }

    /// Fetches a single record without decoding the value.
    pub fn get_raw(&self, key: impl Into<Key>, db: Option<u16>) -> Result<Option<Bytes>> {
        let mut req = request(kt::GET_BULK, 0);
        req.write_key_list_with_db(&[key.into().into_bytes()], self.db_or_default(db));
        let mut records = self.fetch(req.freeze())?;
        Ok(records.pop().map(|(_, _, value, _)| value))
    }

    /// Fetches many records from one database; misses are absent from the
    /// result map.
    pub fn get_bulk<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
        db: Option<u16>,
    ) -> Result<HashMap<Key, Value>>
    where
        K: Into<Key>,
    {
        let records = self.get_bulk_raw(keys, db)?;
        let mut out = HashMap::with_capacity(records.len());
        for (key, value) in records {
            out.insert(key, self.decode_value(&value)?);
        }
        Ok(out)
    }

    /// As [`KtClient::get_bulk`], leaving values as raw bytes.
    pub fn get_bulk_raw<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
        db: Option<u16>,
    ) -> Result<HashMap<Key, Bytes>>
    where
        K: Into<Key>,
    {
        let keys: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        let mut req = request(kt::GET_BULK, 0);
        req.write_key_list_with_db(&keys, self.db_or_default(db));
        let records = self.fetch(req.freeze())?;
        let mut out = HashMap::with_capacity(records.len());
        for (_, key, value, _) in records {
            out.insert(self.decode_key(key)?, value);
        }
        Ok(out)
    }

    /// Fetches records spread across databases, one `(db, key)` pair per
    /// entry.
    pub fn get_bulk_pairs<K>(
        &self,
        pairs: impl IntoIterator<Item = (u16, K)>,
    ) -> Result<HashMap<Key, Value>>
    where
        K: Into<Key>,
    {
        let pairs: Vec<(u16, Bytes)> = pairs
            .into_iter()
            .map(|(db, k)| (db, k.into().into_bytes()))
            .collect();
        let mut req = request(kt::GET_BULK, 0);
        req.write_db_key_list(&pairs);
        let records = self.fetch(req.freeze())?;
        let mut out = HashMap::with_capacity(records.len());
        for (_, key, value, _) in records {
            out.insert(self.decode_key(key)?, self.decode_value(&value)?);
        }
        Ok(out)
    }

    /// Fetches records with their database index and expiration echo.
    pub fn get_bulk_details<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
        db: Option<u16>,
    ) -> Result<Vec<RecordDetail>>
    where
        K: Into<Key>,
    {
        let keys: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        let mut req = request(kt::GET_BULK, 0);
        req.write_key_list_with_db(&keys, self.db_or_default(db));
        let records = self.fetch(req.freeze())?;
        records
            .into_iter()
            .map(|(db, key, value, xt)| {
                Ok(RecordDetail {
                    db,
                    key: self.decode_key(key)?,
                    value: self.decode_value(&value)?,
                    expire: xt,
                })
            })
            .collect()
    }

    // =========================================================================
    // Storing
    // =========================================================================

    /// Stores one record; returns the server's stored count.
    pub fn set<K, V>(
        &self,
        key: K,
        value: V,
        db: Option<u16>,
        expire: Option<i64>,
    ) -> Result<u32>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        self.set_bulk([(key, value)], db, expire)
    }

    /// Stores one record from raw bytes.
    pub fn set_raw(
        &self,
        key: impl Into<Key>,
        value: Bytes,
        db: Option<u16>,
        expire: Option<i64>,
    ) -> Result<u32> {
        self.set_bulk_raw([(key, value)], db, expire)
    }

    /// Stores many records; returns how many the server accepted.
    pub fn set_bulk<K, V>(
        &self,
        records: impl IntoIterator<Item = (K, V)>,
        db: Option<u16>,
        expire: Option<i64>,
    ) -> Result<u32>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let records = self.encode_records(records)?;
        self.store(&records, db, expire, false)
    }

    /// As [`KtClient::set_bulk`], without encoding the values.
    pub fn set_bulk_raw<K>(
        &self,
        records: impl IntoIterator<Item = (K, Bytes)>,
        db: Option<u16>,
        expire: Option<i64>,
    ) -> Result<u32>
    where
        K: Into<Key>,
    {
        let records: Vec<(Bytes, Bytes)> = records
            .into_iter()
            .map(|(k, v)| (k.into().into_bytes(), v))
            .collect();
        self.store(&records, db, expire, false)
    }

    /// Fire-and-forget store: the server sends no acknowledgment and the
    /// client performs no read.
    pub fn set_bulk_noreply<K, V>(
        &self,
        records: impl IntoIterator<Item = (K, V)>,
        db: Option<u16>,
        expire: Option<i64>,
    ) -> Result<()>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let records = self.encode_records(records)?;
        self.store(&records, db, expire, true).map(|_| ())
    }

    // =========================================================================
    // Removing
    // =========================================================================

    /// Removes one record; true if it existed.
    pub fn remove(&self, key: impl Into<Key>, db: Option<u16>) -> Result<bool> {
        Ok(self.remove_bulk([key], db)? > 0)
    }

    /// Removes many records from one database; returns how many existed.
    pub fn remove_bulk<K>(&self, keys: impl IntoIterator<Item = K>, db: Option<u16>) -> Result<u32>
    where
        K: Into<Key>,
    {
        let keys: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        let mut req = request(kt::REMOVE_BULK, 0);
        req.write_key_list_with_db(&keys, self.db_or_default(db));
        self.discard(req.freeze(), false)
    }

    /// Removes records spread across databases.
    pub fn remove_bulk_pairs<K>(&self, pairs: impl IntoIterator<Item = (u16, K)>) -> Result<u32>
    where
        K: Into<Key>,
    {
        let pairs: Vec<(u16, Bytes)> = pairs
            .into_iter()
            .map(|(db, k)| (db, k.into().into_bytes()))
            .collect();
        let mut req = request(kt::REMOVE_BULK, 0);
        req.write_db_key_list(&pairs);
        self.discard(req.freeze(), false)
    }

    /// Fire-and-forget removal.
    pub fn remove_bulk_noreply<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
        db: Option<u16>,
    ) -> Result<()>
    where
        K: Into<Key>,
    {
        let keys: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        let mut req = request(kt::REMOVE_BULK, kt::FLAG_NO_REPLY);
        req.write_key_list_with_db(&keys, self.db_or_default(db));
        self.discard(req.freeze(), true).map(|_| ())
    }

    // =========================================================================
    // Server-side scripts
    // =========================================================================

    /// Invokes a server-side script with a key/value parameter map and
    /// returns its result map.
    pub fn play_script<K, V>(
        &self,
        name: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<HashMap<Key, Value>>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let params = self.encode_records(params)?;
        let results = self.script(name, &params, false)?;
        let mut out = HashMap::with_capacity(results.len());
        for (key, value) in results {
            out.insert(self.decode_key(key)?, self.decode_value(&value)?);
        }
        Ok(out)
    }

    /// Invokes a script passing parameter values as raw bytes and returning
    /// raw result pairs.
    pub fn play_script_raw<K>(
        &self,
        name: &str,
        params: impl IntoIterator<Item = (K, Bytes)>,
    ) -> Result<Vec<(Bytes, Bytes)>>
    where
        K: Into<Key>,
    {
        let params: Vec<(Bytes, Bytes)> = params
            .into_iter()
            .map(|(k, v)| (k.into().into_bytes(), v))
            .collect();
        self.script(name, &params, false)
    }

    /// Invokes a script without reading a response.
    pub fn play_script_noreply<K, V>(
        &self,
        name: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<()>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let params = self.encode_records(params)?;
        self.script(name, &params, true).map(|_| ())
    }

    // =========================================================================
    // Wire plumbing
    // =========================================================================

    fn fetch(&self, request: Bytes) -> Result<Vec<RawRecord>> {
        self.pool.execute(|socket| {
            socket.send_all(&request)?;
            check_magic(socket, kt::GET_BULK)?;
            let count = socket.recv_u32()?;
            let mut records = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let db = socket.recv_u16()?;
                let klen = socket.recv_u32()? as usize;
                let vlen = socket.recv_u32()? as usize;
                let xt = socket.recv_i64()?;
                let key = socket.recv_exact(klen)?;
                let value = socket.recv_exact(vlen)?;
                records.push((db, key, value, xt));
            }
            Ok(records)
        })
    }

    fn store(
        &self,
        records: &[(Bytes, Bytes)],
        db: Option<u16>,
        expire: Option<i64>,
        no_reply: bool,
    ) -> Result<u32> {
        let flags = if no_reply { kt::FLAG_NO_REPLY } else { 0 };
        let mut req = request(kt::SET_BULK, flags);
        req.write_records_with_db_expire(
            records,
            self.db_or_default(db),
            expire.unwrap_or(EXPIRE_NONE),
        );
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if no_reply {
                return Ok(0);
            }
            check_magic(socket, kt::SET_BULK)?;
            socket.recv_u32()
        })
    }

    fn discard(&self, request: Bytes, no_reply: bool) -> Result<u32> {
        self.pool.execute(|socket| {
            socket.send_all(&request)?;
            if no_reply {
                return Ok(0);
            }
            check_magic(socket, kt::REMOVE_BULK)?;
            socket.recv_u32()
        })
    }

    fn script(
        &self,
        name: &str,
        params: &[(Bytes, Bytes)],
        no_reply: bool,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        let flags = if no_reply { kt::FLAG_NO_REPLY } else { 0 };
        let mut req = request(kt::PLAY_SCRIPT, flags);
        req.put_u32(name.len() as u32);
        req.put_u32(params.len() as u32);
        req.put_slice(name.as_bytes());
        for (key, value) in params {
            req.write_kv(key, value);
        }
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if no_reply {
                return Ok(Vec::new());
            }
            check_magic(socket, kt::PLAY_SCRIPT)?;
            let count = socket.recv_u32()?;
            let mut results = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let klen = socket.recv_u32()? as usize;
                let vlen = socket.recv_u32()? as usize;
                let key = socket.recv_exact(klen)?;
                let value = socket.recv_exact(vlen)?;
                results.push((key, value));
            }
            Ok(results)
        })
    }

    fn encode_records<K, V>(
        &self,
        records: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Vec<(Bytes, Bytes)>>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        records
            .into_iter()
            .map(|(k, v)| Ok((k.into().into_bytes(), self.encode_value(&v.into())?)))
            .collect()
    }

    fn db_or_default(&self, db: Option<u16>) -> u16 {
        db.unwrap_or(self.default_db)
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes> {
        Ok(self.serializer.encode(value)?)
    }

    fn decode_value(&self, raw: &[u8]) -> Result<Value> {
        Ok(self.serializer.decode(raw)?)
    }

    fn decode_key(&self, raw: Bytes) -> Result<Key> {
        if self.decode_keys {
            match String::from_utf8(raw.to_vec()) {
                Ok(text) => Ok(Key::Text(text)),
                Err(_) => Err(ClientError::Protocol(ProtocolError::InvalidUtf8("key"))),
            }
        } else {
            Ok(Key::Bytes(raw))
        }
    }
}

fn request(magic: u8, flags: u32) -> RequestBuffer {
    let mut req = RequestBuffer::new();
    req.put_u8(magic);
    req.put_u32(flags);
    req
}

/// Reads the response magic. The error magic becomes a server fault without
/// any further parsing; any other mismatch is a protocol violation.
fn check_magic(socket: &mut FramedSocket, expected: u8) -> Result<()> {
    let magic = socket.recv_u8()?;
    if magic == kt::ERROR {
        return Err(ClientError::ServerInternal { status: magic });
    }
    if magic != expected {
        return Err(ClientError::Protocol(ProtocolError::UnexpectedMagic(magic)));
    }
    Ok(())
}
