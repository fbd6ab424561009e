//! Per-caller socket leasing.
//!
//! Each caller identity holds at most one leased socket at a time; released
//! sockets sit in a min-heap keyed by release time so the stalest is always
//! reaped first. All shared state lives behind one mutex, and that mutex is
//! never held across network I/O.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::socket::FramedSocket;

/// Opaque identity distinguishing concurrent users of a pool.
///
/// [`CallerId::current_thread`] is the usual source; embedders with their
/// own scheduling can mint ids explicitly. A caller must not run operations
/// under the same identity from two threads at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(u64);

static NEXT_CALLER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CALLER_ID: u64 = NEXT_CALLER_ID.fetch_add(1, AtomicOrdering::Relaxed);
}

impl CallerId {
    /// The identity of the current OS thread.
    pub fn current_thread() -> Self {
        CallerId(THREAD_CALLER_ID.with(|id| *id))
    }

    /// An explicit identity under the embedder's control.
    pub fn new(id: u64) -> Self {
        CallerId(id)
    }
}

/// A leased socket. The engine locks it for the duration of one operation.
pub type Lease = Arc<Mutex<FramedSocket>>;

struct IdleSocket {
    released_at: Instant,
    socket: Lease,
}

impl PartialEq for IdleSocket {
    fn eq(&self, other: &Self) -> bool {
        self.released_at == other.released_at
    }
}

impl Eq for IdleSocket {}

impl PartialOrd for IdleSocket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IdleSocket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.released_at.cmp(&other.released_at)
    }
}

struct PoolState {
    in_use: HashMap<CallerId, Lease>,
    free: BinaryHeap<Reverse<IdleSocket>>,
}

/// Thread-safe per-caller socket pool.
pub struct SocketPool {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    nodelay: bool,
    pooling: bool,
    state: Mutex<PoolState>,
}

impl SocketPool {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        timeout: Option<Duration>,
        nodelay: bool,
        pooling: bool,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            nodelay,
            pooling,
            state: Mutex::new(PoolState {
                in_use: HashMap::new(),
                free: BinaryHeap::new(),
            }),
        }
    }

    /// Leases a socket to `caller`.
    ///
    /// A caller that already holds a socket gets the same one back, so
    /// nested operations by one caller share a connection. Otherwise the
    /// stalest idle socket is reused, or a fresh one is opened outside the
    /// pool lock.
    pub fn checkout(&self, caller: CallerId) -> Result<Lease> {
        {
            let mut state = self.state.lock();
            if let Some(lease) = state.in_use.get(&caller) {
                return Ok(lease.clone());
            }
            if let Some(Reverse(idle)) = state.free.pop() {
                state.in_use.insert(caller, idle.socket.clone());
                return Ok(idle.socket);
            }
        }
        let socket = FramedSocket::connect(&self.host, self.port, self.timeout, self.nodelay)?;
        let lease: Lease = Arc::new(Mutex::new(socket));
        self.state.lock().in_use.insert(caller, lease.clone());
        Ok(lease)
    }

    /// Returns the caller's socket to the idle heap, stamped with the
    /// release time. A closed socket is discarded instead. With pooling
    /// disabled the lease stays in place so the caller keeps its socket.
    pub fn checkin(&self, caller: CallerId) {
        if !self.pooling {
            return;
        }
        let mut state = self.state.lock();
        if let Some(lease) = state.in_use.remove(&caller) {
            if !lease.lock().is_closed() {
                state.free.push(Reverse(IdleSocket {
                    released_at: Instant::now(),
                    socket: lease,
                }));
            }
        }
    }

    /// Closes and discards the caller's leased socket.
    pub fn close(&self, caller: CallerId) {
        let lease = self.state.lock().in_use.remove(&caller);
        if let Some(lease) = lease {
            lease.lock().close();
            debug!(caller = ?caller, "leased socket evicted");
        }
    }

    /// Closes idle sockets released more than `cutoff` ago, stalest first,
    /// stopping at the first recent one. Returns how many were closed.
    /// Sockets currently leased are never touched.
    pub fn close_idle(&self, cutoff: Duration) -> usize {
        let now = Instant::now();
        let mut reaped = Vec::new();
        {
            let mut state = self.state.lock();
            while state
                .free
                .peek()
                .is_some_and(|Reverse(idle)| now.duration_since(idle.released_at) >= cutoff)
            {
                if let Some(Reverse(idle)) = state.free.pop() {
                    reaped.push(idle.socket);
                }
            }
        }
        let count = reaped.len();
        for socket in reaped {
            socket.lock().close();
        }
        if count > 0 {
            debug!(count, "idle sockets reaped");
        }
        count
    }

    /// Closes every socket, leased and idle, and clears both collections.
    pub fn close_all(&self) {
        let (in_use, free) = {
            let mut state = self.state.lock();
            let in_use: Vec<_> = state.in_use.drain().map(|(_, lease)| lease).collect();
            let free = std::mem::take(&mut state.free);
            (in_use, free)
        };
        for lease in in_use {
            lease.lock().close();
        }
        for Reverse(idle) in free {
            idle.socket.lock().close();
        }
    }

    /// Number of idle sockets.
    pub fn idle_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Number of leased sockets.
    pub fn leased_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// Runs one operation over the current thread's leased socket.
    ///
    /// On success the socket is checked back in; on any failure it is
    /// closed and discarded, so the next call starts from a fresh one.
    pub(crate) fn execute<T>(&self, op: impl FnOnce(&mut FramedSocket) -> Result<T>) -> Result<T> {
        let caller = CallerId::current_thread();
        let lease = self.checkout(caller)?;
        let result = {
            let mut socket = lease.lock();
            op(&mut socket)
        };
        match result {
            Ok(value) => {
                self.checkin(caller);
                Ok(value)
            }
            Err(err) => {
                self.close(caller);
                Err(err)
            }
        }
    }
}
