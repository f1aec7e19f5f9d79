//! Transactional connection pool with health gating, background keep-alive,
//! and optimistic connection creation (spec.md §4.2).
//!
//! State is split across two locks to keep the hot acquire path from
//! contending with background keep-alive, exactly as spec.md §4.2 and
//! design note §9 ("Two-lock pool") require:
//! - the **idle lock** guards a LIFO stack of currently-idle connections;
//! - the **state lock** guards the population list and the closed flag,
//!   with a [`Notify`] standing in for the condition variable that wakes
//!   acquirers when a connection is released or capacity frees up.
//!
//! `tokio::sync::Notify` is used instead of a raw OS condvar because the
//! pool lives inside an async runtime (spec.md §5 parallel-threads model
//! is realized here as the tokio task scheduler); the locks that guard
//! plain data (`idle`, `state`, per-connection timestamps) stay synchronous
//! `parking_lot` mutexes since their critical sections never await.

use crate::config::PoolConfig;
use crate::driver::{Connection, DriverKind};
use crate::error::{ErrorKind, SqlError, SqlResult};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Notify};

/// An owned dynamically typed future, used for the pool's connector hook.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

const KEEPALIVE_SCAN_LIMIT: usize = 16;

/// A single live driver connection plus the bookkeeping spec.md §3 names:
/// monotonic id, in-use/borrowed flags, timestamps, transaction substate,
/// pinging flag, and broken flag.
pub struct PooledConnection<C: Connection> {
    id: u64,
    kind: DriverKind,
    conn: AsyncMutex<C>,
    created_at: Instant,
    last_used_at: SyncMutex<Instant>,
    tx_started_at: SyncMutex<Option<Instant>>,
    in_use: AtomicBool,
    borrowed: AtomicBool,
    in_transaction: AtomicBool,
    pinging: AtomicBool,
    broken: AtomicBool,
}

impl<C: Connection> PooledConnection<C> {
    fn new(id: u64, conn: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            kind: conn.driver_kind(),
            conn: AsyncMutex::new(conn),
            created_at: now,
            last_used_at: SyncMutex::new(now),
            tx_started_at: SyncMutex::new(None),
            in_use: AtomicBool::new(false),
            borrowed: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            pinging: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        }
    }

    /// A connection is healthy iff it hasn't outlived `max_lifetime`, its
    /// idle time (if idle) is within `max_idle_time`, and its transaction
    /// age (if in a transaction) is within `transaction_timeout`.
    fn is_healthy(&self, config: &PoolConfig) -> bool {
        if self.broken.load(Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now.duration_since(self.created_at) > Duration::from_millis(config.max_lifetime_ms) {
            return false;
        }
        if !self.in_use.load(Relaxed) {
            let last_used = *self.last_used_at.lock();
            if now.duration_since(last_used) > Duration::from_millis(config.max_idle_time_ms) {
                return false;
            }
        }
        if self.in_transaction.load(Relaxed) {
            if let Some(start) = *self.tx_started_at.lock() {
                if now.duration_since(start) > Duration::from_millis(config.transaction_timeout_ms) {
                    return false;
                }
            }
        }
        true
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

struct PoolState<C: Connection> {
    population: Vec<Arc<PooledConnection<C>>>,
    closed: bool,
}

/// Cheap pool-wide snapshot; `in_transaction` may be approximate since it
/// is read without holding every per-connection lock at once (spec.md
/// §4.2, "Pool statistics").
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub in_transaction: usize,
}

struct PoolInner<C: Connection + 'static> {
    config: PoolConfig,
    connector: Box<dyn Fn() -> BoxFuture<'static, SqlResult<C>> + Send + Sync>,
    idle: SyncMutex<Vec<Arc<PooledConnection<C>>>>,
    state: SyncMutex<PoolState<C>>,
    notify: Notify,
    next_id: AtomicU64,
    keepalive_handle: SyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

/// A bounded pool of live connections (spec.md §4.2). Cheap to clone: it is
/// a handle around a shared `Arc`.
pub struct Pool<C: Connection + 'static> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connection + 'static> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connection + 'static> Pool<C> {
    /// Creates a new pool. `connector` builds one fresh driver connection
    /// per call; it must not itself hold any pool lock while doing I/O.
    pub fn new(
        config: PoolConfig,
        connector: impl Fn() -> BoxFuture<'static, SqlResult<C>> + Send + Sync + 'static,
    ) -> Self {
        let inner = Arc::new(PoolInner {
            config,
            connector: Box::new(connector),
            idle: SyncMutex::new(Vec::new()),
            state: SyncMutex::new(PoolState {
                population: Vec::new(),
                closed: false,
            }),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            keepalive_handle: SyncMutex::new(None),
        });
        let pool = Self { inner };
        pool.spawn_keepalive();
        pool
    }

    fn spawn_keepalive(&self) {
        let interval_ms = self.inner.config.keepalive_interval_ms;
        if interval_ms == 0 {
            return;
        }
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                if inner.state.lock().closed {
                    return;
                }
                keepalive_scan(&inner).await;
            }
        });
        *self.inner.keepalive_handle.lock() = Some(handle);
    }

    async fn construct(&self) -> SqlResult<Arc<PooledConnection<C>>> {
        let conn = (self.inner.connector)().await?;
        let id = self.inner.next_id.fetch_add(1, Relaxed);
        Ok(Arc::new(PooledConnection::new(id, conn)))
    }

    fn remove_from_population(&self, pc: &Arc<PooledConnection<C>>) {
        let mut state = self.inner.state.lock();
        state.population.retain(|c| c.id != pc.id);
    }

    /// Leases a connection, following spec.md §4.2's five-step algorithm:
    /// pop an idle candidate and health-check it; on failure destroy and
    /// optimistically replace it; otherwise grow the pool under capacity,
    /// or wait on the state signal until `acquire_timeout_ms` elapses.
    pub async fn acquire(&self) -> SqlResult<Lease<C>> {
        let deadline = Instant::now() + Duration::from_millis(self.inner.config.acquire_timeout_ms);
        loop {
            if self.inner.state.lock().closed {
                return Err(SqlError::new(ErrorKind::ConnectionFailed, "pool is closed"));
            }

            let candidate = {
                let mut idle = self.inner.idle.lock();
                idle.iter()
                    .rposition(|c| !c.pinging.load(Relaxed) && !c.borrowed.load(Relaxed))
                    .map(|pos| idle.remove(pos))
            };
            if let Some(pc) = candidate {
                if pc.is_healthy(&self.inner.config) {
                    pc.in_use.store(true, Relaxed);
                    pc.borrowed.store(true, Relaxed);
                    *pc.last_used_at.lock() = Instant::now();
                    return Ok(Lease::new(self.clone(), pc));
                }
                self.remove_from_population(&pc);
                match self.construct().await {
                    Ok(fresh) => {
                        self.inner.state.lock().population.push(fresh.clone());
                        fresh.in_use.store(true, Relaxed);
                        fresh.borrowed.store(true, Relaxed);
                        return Ok(Lease::new(self.clone(), fresh));
                    }
                    Err(_) => continue,
                }
            }

            let has_capacity = {
                let state = self.inner.state.lock();
                state.population.len() < self.inner.config.max_size
            };
            if has_capacity {
                match self.construct().await {
                    Ok(fresh) => {
                        let mut state = self.inner.state.lock();
                        if state.population.len() < self.inner.config.max_size {
                            state.population.push(fresh.clone());
                            drop(state);
                            fresh.in_use.store(true, Relaxed);
                            fresh.borrowed.store(true, Relaxed);
                            return Ok(Lease::new(self.clone(), fresh));
                        }
                        // a concurrent acquirer filled the pool during construction
                        drop(state);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SqlError::new(ErrorKind::AcquireTimeout, "acquire timed out"));
            }
            let remaining = deadline - now;
            let _ = tokio::time::timeout(remaining, self.inner.notify.notified()).await;
            if Instant::now() >= deadline {
                return Err(SqlError::new(ErrorKind::AcquireTimeout, "acquire timed out"));
            }
        }
    }

    /// Returns a connection to the pool: rolls back any unfinished
    /// transaction under the connection's own lock, then either pushes it
    /// onto the idle stack or destroys it if broken (spec.md §4.2,
    /// "Release").
    async fn release(&self, pc: Arc<PooledConnection<C>>) {
        let mut broken = pc.broken.load(Relaxed);
        if pc.in_transaction.load(Relaxed) {
            let mut conn = pc.conn.lock().await;
            if conn.rollback().await.is_err() {
                broken = true;
            }
            pc.in_transaction.store(false, Relaxed);
            *pc.tx_started_at.lock() = None;
        }
        pc.in_use.store(false, Relaxed);
        pc.borrowed.store(false, Relaxed);
        *pc.last_used_at.lock() = Instant::now();

        if broken {
            pc.broken.store(true, Relaxed);
            self.remove_from_population(&pc);
        } else {
            self.inner.idle.lock().push(pc);
        }
        self.inner.notify.notify_waiters();
    }

    /// Snapshot of pool occupancy.
    pub fn stats(&self) -> PoolStats {
        let idle_len = self.inner.idle.lock().len();
        let state = self.inner.state.lock();
        let total = state.population.len();
        let in_transaction = state
            .population
            .iter()
            .filter(|c| c.in_transaction.load(Relaxed))
            .count();
        PoolStats {
            total,
            active: total.saturating_sub(idle_len),
            idle: idle_len,
            in_transaction,
        }
    }

    /// Sets the closed flag, wakes every waiter, joins the keep-alive task,
    /// and drops every connection in the population (spec.md §4.2,
    /// "Shutdown").
    pub async fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
        let handle = self.inner.keepalive_handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.idle.lock().clear();
        self.inner.state.lock().population.clear();
    }
}

/// Scans at most [`KEEPALIVE_SCAN_LIMIT`] idle, non-pinging connections,
/// probing each without holding either pool lock, so keep-alive never
/// blocks an acquirer (spec.md §4.2, "Keep-alive loop").
async fn keepalive_scan<C: Connection + 'static>(inner: &Arc<PoolInner<C>>) {
    let candidates: Vec<Arc<PooledConnection<C>>> = {
        let idle = inner.idle.lock();
        idle.iter()
            .filter(|c| !c.pinging.load(Relaxed))
            .take(KEEPALIVE_SCAN_LIMIT)
            .cloned()
            .collect()
    };
    for pc in candidates {
        pc.pinging.store(true, Relaxed);
        let outcome = {
            let mut conn = pc.conn.lock().await;
            conn.ping().await
        };
        match outcome {
            Ok(()) => *pc.last_used_at.lock() = Instant::now(),
            // The next acquire's health check rejects this connection via
            // the `broken` flag; no need to also falsify its timestamp.
            Err(_) => pc.broken.store(true, Relaxed),
        }
        pc.pinging.store(false, Relaxed);
    }
}

/// An exclusively leased connection. Dropping it releases the connection
/// back to the pool on a spawned task, since returning a connection may
/// need to roll back an unfinished transaction asynchronously and `Drop`
/// cannot `.await`.
pub struct Lease<C: Connection + 'static> {
    pool: Pool<C>,
    slot: Option<Arc<PooledConnection<C>>>,
}

impl<C: Connection + 'static> Lease<C> {
    fn new(pool: Pool<C>, slot: Arc<PooledConnection<C>>) -> Self {
        Self {
            pool,
            slot: Some(slot),
        }
    }

    fn conn(&self) -> &Arc<PooledConnection<C>> {
        self.slot.as_ref().expect("lease used after release")
    }

    pub async fn exec(&self, sql: &str) -> SqlResult<u64> {
        self.conn().conn.lock().await.exec(sql).await
    }

    pub async fn query(&self, sql: &str) -> SqlResult<crate::driver::ResultSet> {
        self.conn().conn.lock().await.query(sql).await
    }

    pub async fn begin_transaction(&self) -> SqlResult<()> {
        let pc = self.conn();
        pc.conn.lock().await.begin_transaction().await?;
        pc.in_transaction.store(true, Relaxed);
        *pc.tx_started_at.lock() = Some(Instant::now());
        Ok(())
    }

    pub async fn commit(&self) -> SqlResult<()> {
        let pc = self.conn();
        pc.conn.lock().await.commit().await?;
        pc.in_transaction.store(false, Relaxed);
        *pc.tx_started_at.lock() = None;
        Ok(())
    }

    pub async fn rollback(&self) -> SqlResult<()> {
        let pc = self.conn();
        pc.conn.lock().await.rollback().await?;
        pc.in_transaction.store(false, Relaxed);
        *pc.tx_started_at.lock() = None;
        Ok(())
    }

    pub async fn last_insert_id(&self) -> Option<i64> {
        self.conn().conn.lock().await.last_insert_id()
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.conn().kind
    }

    /// Flags the leased connection as broken so the pool destroys it on
    /// release instead of returning it to the idle stack (spec.md §4.2,
    /// "Release"), used by callers that detect a connection-class failure
    /// themselves before retrying with a fresh lease.
    pub fn mark_broken(&self) {
        self.conn().broken.store(true, Relaxed);
    }
}

impl<C: Connection + 'static> Drop for Lease<C> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.release(slot).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::{MemoryConnection, MemoryFault};

    fn memory_pool(max_size: usize) -> Pool<MemoryConnection> {
        let fault = MemoryFault::new();
        let mut config = PoolConfig::default();
        config.max_size = max_size;
        config.keepalive_interval_ms = 0;
        Pool::new(config, move || {
            let fault = fault.clone();
            Box::pin(async move { Ok(MemoryConnection::new(fault)) })
        })
    }

    #[tokio::test]
    async fn acquire_and_release_round_trip() {
        let pool = memory_pool(2);
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.query("SELECT 1").await.unwrap().row_count(), 1);
        drop(lease);
        tokio::task::yield_now().await;
        let stats = pool.stats();
        assert!(stats.total <= 2);
    }

    #[tokio::test]
    async fn never_exceeds_max_size() {
        let pool = memory_pool(2);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        drop(a);
        drop(b);
    }
}
