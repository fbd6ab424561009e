//! TT dialect engine: single-database storage with the miscellaneous
//! command channel, table search and replication admin.
//!
//! Every command starts with the two bytes `0xC8 op`. The first byte of a
//! reply is a status: `0x00` applied, `0x01` recoverable miss, anything
//! else a server fault. Commands with "succeeded or did-not-apply"
//! semantics surface the status as a boolean; data commands return their
//! payload only on `0x00`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use ttkv_protocol::consts::tt;
use ttkv_protocol::wire::f64_from_parts;
use ttkv_protocol::{Key, ProtocolError, RequestBuffer, Value, ValueCodec};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::pool::SocketPool;
use crate::socket::FramedSocket;

/// Locking mode for server-side script invocation.
///
/// The two record-lock flags on the wire are mutually exclusive; modelling
/// them as a mode makes an invalid combination unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtLock {
    /// No locking.
    #[default]
    None,
    /// Lock the touched record.
    Record,
    /// Lock the whole database.
    Global,
}

impl ExtLock {
    fn bits(self) -> u32 {
        match self {
            ExtLock::None => 0,
            ExtLock::Record => tt::EXT_LOCK_RECORD,
            ExtLock::Global => tt::EXT_LOCK_GLOBAL,
        }
    }
}

/// One NUL-packed condition expression for [`TtClient::search`], e.g.
/// `("addcond", column, operator, value)` or `("setlimit", max, offset)`.
#[derive(Debug, Clone)]
pub struct SearchExpression(Bytes);

impl SearchExpression {
    pub fn new<I>(args: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut buf = BytesMut::new();
        for (i, arg) in args.into_iter().enumerate() {
            if i > 0 {
                buf.put_u8(0);
            }
            buf.put_slice(arg.as_ref());
        }
        SearchExpression(buf.freeze())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Client for the TT dialect.
pub struct TtClient {
    pool: SocketPool,
    serializer: Arc<dyn ValueCodec>,
    decode_keys: bool,
}

impl TtClient {
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
    // Storage
    // =========================================================================

    /// Stores a record, overwriting any existing one.
    pub fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let raw = self.encode_value(&value.into())?;
        self.put_op(tt::PUT, key.into().into_bytes(), raw)
    }

    pub fn put_raw(&self, key: impl Into<Key>, value: Bytes) -> Result<bool> {
        self.put_op(tt::PUT, key.into().into_bytes(), value)
    }

    /// Stores a record only if the key is absent; false when it exists.
    pub fn putkeep(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let raw = self.encode_value(&value.into())?;
        self.put_op(tt::PUTKEEP, key.into().into_bytes(), raw)
    }

    pub fn putkeep_raw(&self, key: impl Into<Key>, value: Bytes) -> Result<bool> {
        self.put_op(tt::PUTKEEP, key.into().into_bytes(), value)
    }

    /// Appends to the value of a record, creating it if absent.
    pub fn putcat(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<bool> {
        let raw = self.encode_value(&value.into())?;
        self.put_op(tt::PUTCAT, key.into().into_bytes(), raw)
    }

    pub fn putcat_raw(&self, key: impl Into<Key>, value: Bytes) -> Result<bool> {
        self.put_op(tt::PUTCAT, key.into().into_bytes(), value)
    }

    /// Appends and shifts the value left, keeping at most `width` bytes.
    pub fn putshl(&self, key: impl Into<Key>, value: Bytes, width: u32) -> Result<bool> {
        let key = key.into().into_bytes();
        let mut req = request(tt::PUTSHL);
        req.put_u32(key.len() as u32);
        req.put_u32(value.len() as u32);
        req.put_u32(width);
        req.put_slice(&key);
        req.put_slice(&value);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            Ok(recv_status(socket)? == tt::STATUS_OK)
        })
    }

    /// Fire-and-forget store: the server sends no reply and the client
    /// performs no read.
    pub fn putnr(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let raw = self.encode_value(&value.into())?;
        let key = key.into().into_bytes();
        let mut req = request(tt::PUTNR);
        req.write_kv(&key, &raw);
        let req = req.freeze();
        self.pool.execute(|socket| socket.send_all(&req))
    }

    /// Removes a record; false when it was absent.
    pub fn out(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into().into_bytes();
        let mut req = request(tt::OUT);
        req.write_key(&key);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            Ok(recv_status(socket)? == tt::STATUS_OK)
        })
    }

    // =========================================================================
    // Fetching
    // =========================================================================

    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(self.decode_value(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_raw(&self, key: impl Into<Key>) -> Result<Option<Bytes>> {
        let key = key.into().into_bytes();
        let mut req = request(tt::GET);
        req.write_key(&key);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(None);
            }
            let len = socket.recv_u32()? as usize;
            Ok(Some(socket.recv_exact(len)?))
        })
    }

    /// Fetches many records; misses are absent from the result map.
    pub fn mget<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<HashMap<Key, Value>>
    where
        K: Into<Key>,
    {
        let records = self.mget_raw(keys)?;
        let mut out = HashMap::with_capacity(records.len());
        for (key, value) in records {
            out.insert(self.decode_key(key)?, self.decode_value(&value)?);
        }
        Ok(out)
    }

    /// As [`TtClient::mget`], returning raw wire pairs.
    pub fn mget_raw<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<Vec<(Bytes, Bytes)>>
    where
        K: Into<Key>,
    {
        let keys: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        let mut req = request(tt::MGET);
        req.write_key_list(&keys);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(Vec::new());
            }
            let count = socket.recv_u32()?;
            let mut records = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let klen = socket.recv_u32()? as usize;
                let vlen = socket.recv_u32()? as usize;
                let key = socket.recv_exact(klen)?;
                let value = socket.recv_exact(vlen)?;
                records.push((key, value));
            }
            Ok(records)
        })
    }

    /// Size in bytes of a record's value; `None` when the key is absent.
    pub fn vsiz(&self, key: impl Into<Key>) -> Result<Option<u32>> {
        let key = key.into().into_bytes();
        let mut req = request(tt::VSIZ);
        req.write_key(&key);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(None);
            }
            Ok(Some(socket.recv_u32()?))
        })
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Resets the server-side cursor; false if the server refused.
    pub fn iterinit(&self) -> Result<bool> {
        let req = request(tt::ITERINIT).freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            Ok(recv_status(socket)? == tt::STATUS_OK)
        })
    }

    /// Advances the cursor; `None` signals the end of iteration.
    pub fn iternext(&self) -> Result<Option<Key>> {
        let req = request(tt::ITERNEXT).freeze();
        let raw = self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(None);
            }
            let len = socket.recv_u32()? as usize;
            Ok(Some(socket.recv_exact(len)?))
        })?;
        raw.map(|k| self.decode_key(k)).transpose()
    }

    /// Lazy, single-pass key iteration. The sequence is not restartable and
    /// mutating the database while iterating is unsupported.
    pub fn keys(&self) -> Result<Keys<'_>> {
        self.iterinit()?;
        Ok(Keys {
            client: self,
            done: false,
        })
    }

    /// Lazy key/value iteration over the `misc` cursor.
    pub fn items(&self) -> Result<Items<'_>> {
        self.misc_impl("iterinit", &[], true)?;
        Ok(Items {
            client: self,
            done: false,
        })
    }

    /// As [`TtClient::items`], starting the cursor at `start`.
    pub fn items_from(&self, start: impl Into<Key>) -> Result<Items<'_>> {
        let args = [start.into().into_bytes()];
        self.misc_impl("iterinit", &args, true)?;
        Ok(Items {
            client: self,
            done: false,
        })
    }

    /// Keys sharing `prefix`, at most `max` of them (`None` for no bound).
    pub fn fwmkeys(&self, prefix: impl Into<Key>, max: Option<u32>) -> Result<Vec<Key>> {
        let prefix = prefix.into().into_bytes();
        let mut req = request(tt::FWMKEYS);
        req.put_u32(prefix.len() as u32);
        req.put_u32(max.unwrap_or(u32::MAX));
        req.put_slice(&prefix);
        let req = req.freeze();
        let raw = self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(Vec::new());
            }
            let count = socket.recv_u32()?;
            let mut keys = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let len = socket.recv_u32()? as usize;
                keys.push(socket.recv_exact(len)?);
            }
            Ok(keys)
        })?;
        raw.into_iter().map(|k| self.decode_key(k)).collect()
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Adds `delta` to an integer record and returns the new value; `None`
    /// when the existing record is not numeric.
    pub fn addint(&self, key: impl Into<Key>, delta: i32) -> Result<Option<i32>> {
        let key = key.into().into_bytes();
        let mut req = request(tt::ADDINT);
        req.put_u32(key.len() as u32);
        req.put_i32(delta);
        req.put_slice(&key);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(None);
            }
            Ok(Some(socket.recv_i32()?))
        })
    }

    /// Adds `delta` to a double record and returns the new value. Negative
    /// deltas have no defined wire form and are rejected.
    pub fn adddouble(&self, key: impl Into<Key>, delta: f64) -> Result<Option<f64>> {
        let key = key.into().into_bytes();
        let mut req = request(tt::ADDDOUBLE);
        req.put_u32(key.len() as u32);
        req.write_f64_parts(delta)?;
        req.put_slice(&key);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(None);
            }
            let integ = socket.recv_u64()?;
            let fract = socket.recv_u64()?;
            Ok(Some(f64_from_parts(integ, fract)))
        })
    }

    // =========================================================================
    // Server-side scripts
    // =========================================================================

    /// Invokes a server-side script. A non-zero status means the script
    /// failed.
    pub fn ext(
        &self,
        name: &str,
        key: impl Into<Key>,
        value: Bytes,
        lock: ExtLock,
    ) -> Result<Bytes> {
        let key = key.into().into_bytes();
        let mut req = request(tt::EXT);
        req.put_u32(name.len() as u32);
        req.put_u32(lock.bits());
        req.put_u32(key.len() as u32);
        req.put_u32(value.len() as u32);
        req.put_slice(name.as_bytes());
        req.put_slice(&key);
        req.put_slice(&value);
        let req = req.freeze();
        let name = name.to_owned();
        self.pool.execute(move |socket| {
            socket.send_all(&req)?;
            let status = socket.recv_u8()?;
            if status != tt::STATUS_OK {
                return Err(ClientError::Script { name, status });
            }
            let len = socket.recv_u32()? as usize;
            socket.recv_exact(len)
        })
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Flushes updates to permanent storage.
    pub fn sync(&self) -> Result<bool> {
        self.status_op(request(tt::SYNC).freeze())
    }

    /// Rebuilds the database file, optionally with tuning parameters.
    pub fn optimize(&self, params: Option<&str>) -> Result<bool> {
        let mut req = request(tt::OPTIMIZE);
        req.write_key(params.unwrap_or_default().as_bytes());
        self.status_op(req.freeze())
    }

    /// Removes every record.
    pub fn vanish(&self) -> Result<bool> {
        self.status_op(request(tt::VANISH).freeze())
    }

    /// Copies the database file to `path` on the server host.
    pub fn copy(&self, path: &str) -> Result<bool> {
        let mut req = request(tt::COPY);
        req.write_key(path.as_bytes());
        self.status_op(req.freeze())
    }

    /// Restores from the update log at `path`, starting at timestamp `ts`.
    pub fn restore(&self, path: &str, ts: u64, opts: u32) -> Result<bool> {
        let mut req = request(tt::RESTORE);
        req.put_u32(path.len() as u32);
        req.put_u64(ts);
        req.put_u32(opts);
        req.put_slice(path.as_bytes());
        self.status_op(req.freeze())
    }

    /// Points replication at a new master.
    pub fn setmst(&self, host: &str, port: u16, ts: u64, opts: u32) -> Result<bool> {
        let mut req = request(tt::SETMST);
        req.put_u32(host.len() as u32);
        req.put_u32(port.into());
        req.put_u64(ts);
        req.put_u32(opts);
        req.put_slice(host.as_bytes());
        self.status_op(req.freeze())
    }

    /// Number of records.
    pub fn rnum(&self) -> Result<u64> {
        let req = request(tt::RNUM).freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            recv_status_ok(socket)?;
            socket.recv_u64()
        })
    }

    /// Database size in bytes.
    pub fn size(&self) -> Result<u64> {
        let req = request(tt::SIZE).freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            recv_status_ok(socket)?;
            socket.recv_u64()
        })
    }

    /// The server's status report, unparsed.
    pub fn stat(&self) -> Result<Bytes> {
        let req = request(tt::STAT).freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            recv_status_ok(socket)?;
            let len = socket.recv_u32()? as usize;
            socket.recv_exact(len)
        })
    }

    // =========================================================================
    // The miscellaneous command channel
    // =========================================================================

    /// Runs a named command over the generic channel. Returns `None` when
    /// the server reports a recoverable miss. With `update_log` false the
    /// command is kept out of the replication log.
    pub fn misc<A>(
        &self,
        name: &str,
        args: impl IntoIterator<Item = A>,
        update_log: bool,
    ) -> Result<Option<Vec<Bytes>>>
    where
        A: AsRef<[u8]>,
    {
        let args: Vec<Bytes> = args
            .into_iter()
            .map(|a| Bytes::copy_from_slice(a.as_ref()))
            .collect();
        self.misc_impl(name, &args, update_log)
    }

    /// Bulk store over `misc("putlist")`; true when applied.
    pub fn putlist<K, V>(&self, records: impl IntoIterator<Item = (K, V)>) -> Result<bool>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let mut args = Vec::new();
        for (key, value) in records {
            args.push(key.into().into_bytes());
            args.push(self.encode_value(&value.into())?);
        }
        Ok(self.misc_impl("putlist", &args, true)?.is_some())
    }

    /// Bulk removal over `misc("outlist")`; true when applied.
    pub fn outlist<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<bool>
    where
        K: Into<Key>,
    {
        let args: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        Ok(self.misc_impl("outlist", &args, true)?.is_some())
    }

    /// Bulk fetch over `misc("getlist")`; misses are absent from the map.
    pub fn getlist<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<HashMap<Key, Value>>
    where
        K: Into<Key>,
    {
        let args: Vec<Bytes> = keys.into_iter().map(|k| k.into().into_bytes()).collect();
        let values = self.misc_impl("getlist", &args, true)?.unwrap_or_default();
        self.pairs_to_map(values)
    }

    /// A byte range of a record's value.
    pub fn get_part(
        &self,
        key: impl Into<Key>,
        start: u64,
        end: Option<u64>,
    ) -> Result<Option<Bytes>> {
        let mut args = vec![
            key.into().into_bytes(),
            Bytes::from(start.to_string().into_bytes()),
        ];
        if let Some(end) = end {
            args.push(Bytes::from(end.to_string().into_bytes()));
        }
        let values = self.misc_impl("getpart", &args, true)?;
        Ok(values.and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) }))
    }

    /// Records with keys in `[start, stop)`, at most `max` (0 for no bound).
    pub fn get_range<K>(
        &self,
        start: K,
        stop: Option<K>,
        max: u32,
    ) -> Result<HashMap<Key, Value>>
    where
        K: Into<Key>,
    {
        let mut args = vec![
            start.into().into_bytes(),
            Bytes::from(max.to_string().into_bytes()),
        ];
        if let Some(stop) = stop {
            args.push(stop.into().into_bytes());
        }
        let values = self.misc_impl("range", &args, true)?.unwrap_or_default();
        self.pairs_to_map(values)
    }

    /// Records whose keys match `regex`, at most `max` (0 for no bound).
    pub fn match_regex(&self, regex: &str, max: u32) -> Result<HashMap<Key, Value>> {
        let args = [
            Bytes::copy_from_slice(regex.as_bytes()),
            Bytes::from(max.to_string().into_bytes()),
        ];
        let values = self.misc_impl("regex", &args, true)?.unwrap_or_default();
        self.pairs_to_map(values)
    }

    /// Draws a fresh unique id from the server.
    pub fn genuid(&self) -> Result<u64> {
        let values = self
            .misc_impl("genuid", &[], true)?
            .ok_or(ClientError::Protocol(ProtocolError::Corrupt {
                context: "genuid reply missing",
            }))?;
        match values.first() {
            Some(raw) => parse_decimal(raw),
            None => Err(ClientError::Protocol(ProtocolError::Corrupt {
                context: "genuid reply empty",
            })),
        }
    }

    /// Drops the server's record cache.
    pub fn clear_cache(&self) -> Result<bool> {
        Ok(self.misc_impl("cacheclear", &[], true)?.is_some())
    }

    /// Creates or alters a column index on a table database. `index_type`
    /// is one of the `INDEX_*` constants.
    pub fn set_index(&self, column: &str, index_type: u32) -> Result<bool> {
        let args = [
            Bytes::copy_from_slice(column.as_bytes()),
            Bytes::from(index_type.to_string().into_bytes()),
        ];
        Ok(self.misc_impl("setindex", &args, true)?.is_some())
    }

    pub fn optimize_index(&self, column: &str) -> Result<bool> {
        self.set_index(column, tt::INDEX_OPTIMIZE)
    }

    pub fn delete_index(&self, column: &str) -> Result<bool> {
        self.set_index(column, tt::INDEX_DELETE)
    }

    // =========================================================================
    // Table search
    // =========================================================================

    /// Runs a table query; returns the matching primary keys.
    pub fn search(&self, expressions: &[SearchExpression]) -> Result<Vec<Key>> {
        let keys = self.search_impl(expressions, None)?.unwrap_or_default();
        keys.into_iter().map(|k| self.decode_key(k)).collect()
    }

    /// Runs a table query returning each matching record as its key and
    /// the raw column payload, which is not interpreted further.
    pub fn search_get(&self, expressions: &[SearchExpression]) -> Result<Vec<(Key, Bytes)>> {
        let items = self.search_impl(expressions, Some("get"))?.unwrap_or_default();
        items
            .into_iter()
            .map(|item| {
                // Item layout is `NUL key NUL columns`: skip one byte, then
                // split at the first NUL.
                if item.first() != Some(&0) {
                    return Err(ClientError::Protocol(ProtocolError::Corrupt {
                        context: "search result item prefix",
                    }));
                }
                let body = item.slice(1..);
                let split = body.iter().position(|&b| b == 0).ok_or(
                    ClientError::Protocol(ProtocolError::Corrupt {
                        context: "search result item separator",
                    }),
                )?;
                let key = self.decode_key(body.slice(..split))?;
                Ok((key, body.slice(split + 1..)))
            })
            .collect()
    }

    /// Runs a table query deleting the matches; true when applied.
    pub fn search_out(&self, expressions: &[SearchExpression]) -> Result<bool> {
        Ok(self.search_impl(expressions, Some("out"))?.is_some())
    }

    /// Runs a table query returning only the match count.
    pub fn search_count(&self, expressions: &[SearchExpression]) -> Result<u64> {
        match self.search_impl(expressions, Some("count"))? {
            Some(values) => match values.first() {
                Some(raw) => parse_decimal(raw),
                None => Ok(0),
            },
            None => Ok(0),
        }
    }

    // =========================================================================
    // Wire plumbing
    // =========================================================================

    fn put_op(&self, op: u8, key: Bytes, value: Bytes) -> Result<bool> {
        let mut req = request(op);
        req.write_kv(&key, &value);
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            Ok(recv_status(socket)? == tt::STATUS_OK)
        })
    }

    fn status_op(&self, request: Bytes) -> Result<bool> {
        self.pool.execute(|socket| {
            socket.send_all(&request)?;
            Ok(recv_status(socket)? == tt::STATUS_OK)
        })
    }

    fn misc_impl(
        &self,
        name: &str,
        args: &[Bytes],
        update_log: bool,
    ) -> Result<Option<Vec<Bytes>>> {
        let opts = if update_log {
            0
        } else {
            tt::MISC_NO_UPDATE_LOG
        };
        let mut req = request(tt::MISC);
        req.put_u32(name.len() as u32);
        req.put_u32(opts);
        req.put_u32(args.len() as u32);
        req.put_slice(name.as_bytes());
        for arg in args {
            req.write_key(arg);
        }
        let req = req.freeze();
        self.pool.execute(|socket| {
            socket.send_all(&req)?;
            if recv_status(socket)? == tt::STATUS_MISS {
                return Ok(None);
            }
            let count = socket.recv_u32()?;
            let mut values = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let len = socket.recv_u32()? as usize;
                values.push(socket.recv_exact(len)?);
            }
            Ok(Some(values))
        })
    }

    fn search_impl(
        &self,
        expressions: &[SearchExpression],
        cmd: Option<&str>,
    ) -> Result<Option<Vec<Bytes>>> {
        let mut args: Vec<Bytes> = expressions.iter().map(|e| e.0.clone()).collect();
        if let Some(cmd) = cmd {
            args.push(Bytes::copy_from_slice(cmd.as_bytes()));
        }
        self.misc_impl("search", &args, true)
    }

    fn pairs_to_map(&self, values: Vec<Bytes>) -> Result<HashMap<Key, Value>> {
        if values.len() % 2 != 0 {
            return Err(ClientError::Protocol(ProtocolError::Corrupt {
                context: "key/value list has odd length",
            }));
        }
        let mut out = HashMap::with_capacity(values.len() / 2);
        let mut values = values.into_iter();
        while let (Some(key), Some(value)) = (values.next(), values.next()) {
            out.insert(self.decode_key(key)?, self.decode_value(&value)?);
        }
        Ok(out)
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

/// Lazy single-pass key sequence from [`TtClient::keys`].
pub struct Keys<'a> {
    client: &'a TtClient,
    done: bool,
}

impl Iterator for Keys<'_> {
    type Item = Result<Key>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.client.iternext() {
            Ok(Some(key)) => Some(Ok(key)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Lazy single-pass key/value sequence from [`TtClient::items`].
pub struct Items<'a> {
    client: &'a TtClient,
    done: bool,
}

impl Iterator for Items<'_> {
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.client.misc_impl("iternext", &[], true) {
            Ok(Some(values)) => {
                let mut values = values.into_iter();
                let (Some(key), Some(raw)) = (values.next(), values.next()) else {
                    self.done = true;
                    return Some(Err(ClientError::Protocol(ProtocolError::Corrupt {
                        context: "iternext key/value reply",
                    })));
                };
                match (self.client.decode_key(key), self.client.decode_value(&raw)) {
                    (Ok(key), Ok(value)) => Some(Ok((key, value))),
                    (Err(err), _) | (_, Err(err)) => {
                        self.done = true;
                        Some(Err(err))
                    }
                }
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn request(op: u8) -> RequestBuffer {
    let mut req = RequestBuffer::new();
    req.put_u8(tt::MAGIC);
    req.put_u8(op);
    req
}

/// Reads a status byte, admitting only ok and miss.
fn recv_status(socket: &mut FramedSocket) -> Result<u8> {
    let status = socket.recv_u8()?;
    if status > tt::STATUS_MISS {
        return Err(ClientError::ServerInternal { status });
    }
    Ok(status)
}

/// Reads a status byte for commands that cannot miss.
fn recv_status_ok(socket: &mut FramedSocket) -> Result<()> {
    let status = socket.recv_u8()?;
    if status != tt::STATUS_OK {
        return Err(ClientError::ServerInternal { status });
    }
    Ok(())
}

fn parse_decimal(raw: &Bytes) -> Result<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::Protocol(ProtocolError::Corrupt {
            context: "numeric reply",
        }))
}
