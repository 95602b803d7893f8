//! Bounded pool of reusable connections.
//!
//! At most `max_capacity` connections are checked out or being dialed at any
//! time. Returned connections wait in an idle set (at most `max_idle`, each
//! for at most `idle_timeout`) and the freshest one is handed out first.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// Errors returned by the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// No connection became available within the acquire timeout.
    #[error("connection pool exhausted")]
    Exhausted,

    #[error("connect failed: {0}")]
    Connect(io::Error),
}

/// Creates and closes the pooled connections.
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;

    fn connect(&self) -> impl Future<Output = io::Result<Self::Connection>> + Send;

    /// Called for connections leaving the pool for good.
    fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// Dials TCP connections to a fixed address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    dial_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            dial_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl ConnectionManager for TcpConnector {
    type Connection = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = tokio::time::timeout(self.dial_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("dial {} timed out after {:?}", self.addr, self.dial_timeout),
                )
            })??;
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "Dialed connection");
        Ok(stream)
    }
}

/// Pool limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections dialed when the pool is created.
    pub initial_capacity: usize,
    /// Upper bound on connections checked out at once.
    pub max_capacity: usize,
    /// Upper bound on connections kept idle.
    pub max_idle: usize,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Duration,
    /// How long `get` waits for a free slot; `None` waits forever.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1,
            max_capacity: 30,
            max_idle: 10,
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PoolConfig {
    /// Builder: set initial capacity.
    pub fn with_initial_capacity(mut self, initial: usize) -> Self {
        self.initial_capacity = initial;
        self
    }

    /// Builder: set max capacity.
    pub fn with_max_capacity(mut self, max: usize) -> Self {
        self.max_capacity = max;
        self
    }

    /// Builder: set max idle.
    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle = max;
        self
    }

    /// Builder: set idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builder: set acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Checks `initial_capacity <= max_idle <= max_capacity` and
    /// `max_capacity > 0`.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "max_capacity must be greater than 0".into(),
            ));
        }
        if self.max_idle > self.max_capacity {
            return Err(PoolError::InvalidConfig(format!(
                "max_idle ({}) exceeds max_capacity ({})",
                self.max_idle, self.max_capacity
            )));
        }
        if self.initial_capacity > self.max_idle {
            return Err(PoolError::InvalidConfig(format!(
                "initial_capacity ({}) exceeds max_idle ({})",
                self.initial_capacity, self.max_idle
            )));
        }
        Ok(())
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub max_capacity: usize,
}

struct IdleConnection<C> {
    conn: C,
    since: Instant,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection<M::Connection>>>,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection<M::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pops the freshest idle connection, closing expired ones on the way.
    fn take_idle(&self) -> Option<M::Connection> {
        let mut expired = Vec::new();
        let found = {
            let mut idle = self.idle();
            let mut found = None;
            while let Some(entry) = idle.pop_back() {
                if entry.since.elapsed() >= self.config.idle_timeout {
                    expired.push(entry.conn);
                } else {
                    found = Some(entry.conn);
                    break;
                }
            }
            found
        };
        if !expired.is_empty() {
            debug!(count = expired.len(), "Closing expired idle connections");
        }
        for conn in expired {
            self.manager.close(conn);
        }
        found
    }

    fn release(&self, conn: M::Connection) {
        let rejected = {
            let mut idle = self.idle();
            if idle.len() < self.config.max_idle {
                idle.push_back(IdleConnection {
                    conn,
                    since: Instant::now(),
                });
                None
            } else {
                Some(conn)
            }
        };
        if let Some(conn) = rejected {
            trace!("Idle set full, closing connection");
            self.manager.close(conn);
        }
    }
}

/// Connection pool over a [`ConnectionManager`]. Cloning shares the pool.
pub struct ConnectionPool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// Validates `config` and dials `initial_capacity` connections.
    pub async fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;

        let mut idle = VecDeque::with_capacity(config.max_idle);
        for _ in 0..config.initial_capacity {
            let conn = manager.connect().await.map_err(PoolError::Connect)?;
            idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(config.max_capacity)),
                idle: Mutex::new(idle),
                manager,
                config,
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Checks out a connection, reusing an idle one when possible.
    ///
    /// Waits while `max_capacity` connections are checked out, failing with
    /// [`PoolError::Exhausted`] once the acquire timeout elapses.
    pub async fn get(&self) -> Result<PooledConnection<M>, PoolError> {
        let acquire = Arc::clone(&self.inner.permits).acquire_owned();
        let permit = match self.inner.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| PoolError::Exhausted)?,
            None => acquire.await,
        }
        .map_err(|_| PoolError::Exhausted)?;

        let conn = match self.inner.take_idle() {
            Some(conn) => {
                trace!("Reusing idle connection");
                conn
            }
            None => self
                .inner
                .manager
                .connect()
                .await
                .map_err(PoolError::Connect)?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Returns a connection to the pool; same as dropping it.
    pub fn put(&self, conn: PooledConnection<M>) {
        drop(conn);
    }

    pub fn stats(&self) -> PoolStats {
        let max_capacity = self.inner.config.max_capacity;
        PoolStats {
            idle: self.inner.idle().len(),
            in_use: max_capacity - self.inner.permits.available_permits(),
            max_capacity,
        }
    }
}

/// A checked-out connection. Dropping it returns the connection to the pool.
pub struct PooledConnection<M: ConnectionManager> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    /// Closes the connection instead of returning it; use after IO or
    /// framing errors.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            debug!("Discarding broken connection");
            self.pool.manager.close(conn);
        }
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("connection is present until the guard is dropped")
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("connection is present until the guard is dropped")
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out numbered fake connections and counts closes.
    #[derive(Default)]
    struct Counter {
        dialed: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl ConnectionManager for Counter {
        type Connection = usize;

        async fn connect(&self) -> io::Result<usize> {
            Ok(self.dialed.fetch_add(1, Ordering::SeqCst))
        }

        fn close(&self, _conn: usize) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Refusing;

    impl ConnectionManager for Refusing {
        type Connection = ();

        async fn connect(&self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    fn config(initial: usize, max: usize, idle: usize) -> PoolConfig {
        PoolConfig::default()
            .with_initial_capacity(initial)
            .with_max_capacity(max)
            .with_max_idle(idle)
    }

    #[test]
    fn default_config_is_valid() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_capacity, 1);
        assert_eq!(config.max_capacity, 30);
        assert_eq!(config.max_idle, 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(config(0, 0, 0).validate().is_err());
        assert!(config(0, 2, 3).validate().is_err());
        assert!(config(3, 5, 2).validate().is_err());
        assert!(config(2, 2, 2).validate().is_ok());
    }

    #[tokio::test]
    async fn predials_initial_connections() {
        let pool = ConnectionPool::new(Counter::default(), config(2, 4, 2))
            .await
            .unwrap();
        assert_eq!(
            pool.stats(),
            PoolStats {
                idle: 2,
                in_use: 0,
                max_capacity: 4
            }
        );
    }

    #[tokio::test]
    async fn reuses_returned_connection() {
        let pool = ConnectionPool::new(Counter::default(), config(0, 2, 2))
            .await
            .unwrap();

        let conn = pool.get().await.unwrap();
        assert_eq!(*conn, 0);
        assert_eq!(pool.stats().in_use, 1);
        pool.put(conn);
        assert_eq!(pool.stats().idle, 1);

        let conn = pool.get().await.unwrap();
        assert_eq!(*conn, 0);
        assert_eq!(pool.inner.manager.dialed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discarded_connection_is_closed() {
        let pool = ConnectionPool::new(Counter::default(), config(0, 2, 2))
            .await
            .unwrap();
        let closed = Arc::clone(&pool.inner.manager.closed);

        pool.get().await.unwrap().discard();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().in_use, 0);

        assert_eq!(*pool.get().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn full_idle_set_closes_extra_connections() {
        let pool = ConnectionPool::new(Counter::default(), config(0, 3, 1))
            .await
            .unwrap();
        let closed = Arc::clone(&pool.inner.manager.closed);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        drop(a);
        drop(b);

        assert_eq!(pool.stats().idle, 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = ConnectionPool::new(
            Counter::default(),
            config(0, 1, 1).with_acquire_timeout(Some(Duration::from_millis(20))),
        )
        .await
        .unwrap();

        let held = pool.get().await.unwrap();
        assert!(matches!(pool.get().await, Err(PoolError::Exhausted)));
        assert_eq!(pool.stats().in_use, 1);

        drop(held);
        assert!(pool.get().await.is_ok());
    }

    #[tokio::test]
    async fn waiter_gets_connection_when_released() {
        let pool = ConnectionPool::new(
            Counter::default(),
            config(0, 1, 1).with_acquire_timeout(None),
        )
        .await
        .unwrap();

        let held = pool.get().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.get().await.unwrap() })
        };
        tokio::task::yield_now().await;
        drop(held);

        assert_eq!(waiter.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_idle_connections_are_not_reused() {
        let pool = ConnectionPool::new(
            Counter::default(),
            config(1, 2, 2).with_idle_timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap();
        let closed = Arc::clone(&pool.inner.manager.closed);

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(*pool.get().await.unwrap(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let err = ConnectionPool::new(Refusing, config(1, 1, 1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::Connect(_)));

        let pool = ConnectionPool::new(Refusing, config(0, 1, 1)).await.unwrap();
        assert!(matches!(pool.get().await, Err(PoolError::Connect(_))));
        assert_eq!(pool.stats().in_use, 0);
    }
}
