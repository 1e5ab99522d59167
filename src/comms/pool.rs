use std::{
    collections::VecDeque,
    net::SocketAddr,
    ops::{Deref, DerefMut},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::config::NodeConfig;

use super::connection::{self, Connection, ConnectionError};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no connection to {address} became available within {timeout:?}")]
    Exhausted {
        address: SocketAddr,
        timeout: Duration,
    },

    #[error("connection pool for {0} is shut down")]
    Shutdown(SocketAddr),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl PoolError {
    /// Exhaustion and shutdown are local conditions; only a failed connect
    /// reflects on the node.
    pub fn is_node_fault(&self) -> bool {
        matches!(self, PoolError::Connection(e) if e.is_node_fault())
    }
}

#[derive(Debug)]
struct IdleConnection {
    connection: Connection,
    since: Instant,
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Oldest at the front; reuse pops from the back.
    idle: VecDeque<IdleConnection>,
    /// Idle plus checked out, including connections still being opened.
    live: usize,
    shutdown: bool,
}

/// Bounded pool of connections to one node.
///
/// `live` never exceeds `max_connections`. A caller that finds the pool full
/// waits for a release for up to `connect_timeout`. Sockets are opened and
/// closed outside the pool lock.
#[derive(Debug)]
pub struct ConnectionManager {
    address: SocketAddr,
    config: NodeConfig,
    inner: Mutex<PoolInner>,
    available: Condvar,
}

impl ConnectionManager {
    pub fn new(config: NodeConfig) -> Result<Self, ConnectionError> {
        Ok(Self {
            address: connection::resolve(&config.address)?,
            config,
            inner: Mutex::new(PoolInner::default()),
            available: Condvar::new(),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn live_count(&self) -> usize {
        self.lock().live
    }

    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    /// Hands out the most recently used idle connection, opens a new one if
    /// the pool is below `max_connections`, or waits for a release. Waiting
    /// and connecting share one `connect_timeout` budget.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, PoolError> {
        let deadline = Instant::now() + self.config.connect_timeout;
        let mut inner = self.lock();

        loop {
            if inner.shutdown {
                return Err(PoolError::Shutdown(self.address));
            }
            if let Some(idle) = inner.idle.pop_back() {
                trace!("reusing idle connection to {}", self.address);
                return Ok(PooledConnection::new(self, idle.connection));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PoolError::Exhausted {
                    address: self.address,
                    timeout: self.config.connect_timeout,
                });
            }
            if inner.live < self.config.max_connections {
                inner.live += 1;
                drop(inner);
                return match self.open(remaining) {
                    Ok(connection) => Ok(PooledConnection::new(self, connection)),
                    Err(e) => {
                        self.forget_slot();
                        Err(e.into())
                    }
                };
            }

            inner = self
                .available
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Returns a connection to the idle set, or drops it from the pool if it
    /// is no longer connected.
    pub fn release(&self, connection: Connection) {
        let discarded = {
            let mut inner = self.lock();
            if connection.is_connected() && !inner.shutdown {
                inner.idle.push_back(IdleConnection {
                    connection,
                    since: Instant::now(),
                });
                None
            } else {
                inner.live -= 1;
                Some(connection)
            }
        };
        self.available.notify_one();

        if let Some(mut connection) = discarded {
            debug!(
                "dropping {:?} connection to {}",
                connection.state(),
                self.address
            );
            connection.close();
        }
    }

    /// Closes connections idle longer than `idle_timeout` while keeping at
    /// least `min_connections` live, then tops the pool back up to the
    /// minimum. Returns the number of connections closed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Connection> = {
            let mut inner = self.lock();
            let mut expired = Vec::new();
            while inner.live > self.config.min_connections {
                let is_expired = inner
                    .idle
                    .front()
                    .is_some_and(|idle| now.duration_since(idle.since) > self.config.idle_timeout);
                if !is_expired {
                    break;
                }
                if let Some(idle) = inner.idle.pop_front() {
                    inner.live -= 1;
                    expired.push(idle.connection);
                }
            }
            expired
        };

        let closed = expired.len();
        if closed > 0 {
            debug!("expired {closed} idle connection(s) to {}", self.address);
            self.available.notify_all();
        }
        for mut connection in expired {
            connection.close();
        }

        self.fill();
        closed
    }

    /// Opens connections until `min_connections` are live. Stops at the
    /// first connect failure. Returns the number opened.
    pub fn fill(&self) -> usize {
        let mut opened = 0;
        loop {
            {
                let mut inner = self.lock();
                if inner.shutdown || inner.live >= self.config.min_connections {
                    break;
                }
                inner.live += 1;
            }
            match self.open(self.config.connect_timeout) {
                Ok(connection) => {
                    self.release(connection);
                    opened += 1;
                }
                Err(e) => {
                    self.forget_slot();
                    warn!("could not open connection to {}: {e}", self.address);
                    break;
                }
            }
        }
        opened
    }

    /// Closes every idle connection. Checked-out connections are unaffected.
    pub fn drain_idle(&self) -> usize {
        let drained: Vec<IdleConnection> = {
            let mut inner = self.lock();
            let drained: Vec<_> = inner.idle.drain(..).collect();
            inner.live -= drained.len();
            drained
        };
        self.available.notify_all();

        let count = drained.len();
        for mut idle in drained {
            idle.connection.close();
        }
        count
    }

    /// Refuses further acquires and closes idle connections. Connections
    /// still checked out are closed as they come back.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        let drained = self.drain_idle();
        debug!(
            "connection pool for {} shut down, closed {drained} idle connection(s)",
            self.address
        );
    }

    fn open(&self, connect_timeout: Duration) -> Result<Connection, ConnectionError> {
        let mut connection =
            Connection::with_address(self.address, connect_timeout, self.config.request_timeout);
        connection.connect()?;
        Ok(connection)
    }

    fn forget_slot(&self) {
        self.lock().live -= 1;
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out connection, returned to its pool on drop.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    manager: &'a ConnectionManager,
    connection: Option<Connection>,
}

impl<'a> PooledConnection<'a> {
    fn new(manager: &'a ConnectionManager, connection: Connection) -> Self {
        Self {
            manager,
            connection: Some(connection),
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.manager.release(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use super::*;
    use crate::{
        command::Ping,
        comms::{
            connection::ConnectionState,
            mock::{self, MockServer},
        },
    };

    fn config(server: &MockServer, min: usize, max: usize) -> NodeConfig {
        NodeConfig {
            min_connections: min,
            max_connections: max,
            connect_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_millis(20),
            ..NodeConfig::new(server.address())
        }
    }

    #[test]
    fn invalid_address_is_rejected() {
        assert!(matches!(
            ConnectionManager::new(NodeConfig::new("nowhere")),
            Err(ConnectionError::InvalidAddress(_))
        ));
    }

    #[test]
    fn fill_opens_min_connections() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(config(&server, 2, 4)).unwrap();

        assert_eq!(pool.fill(), 2);
        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.fill(), 0);
    }

    #[test]
    fn released_connection_is_reused() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(config(&server, 0, 4)).unwrap();

        for _ in 0..3 {
            let mut connection = pool.acquire().unwrap();
            connection.execute(&mut Ping::new()).unwrap();
        }
        assert_eq!(server.accepted(), 1);
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn full_pool_waits_then_reports_exhaustion() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(config(&server, 0, 1)).unwrap();

        let held = pool.acquire().unwrap();
        let started = Instant::now();
        assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { .. })));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!pool.acquire().unwrap_err().is_node_fault());
        drop(held);

        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn waiter_is_woken_by_release() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(NodeConfig {
            connect_timeout: Duration::from_secs(5),
            ..config(&server, 0, 1)
        })
        .unwrap();

        thread::scope(|s| {
            let held = pool.acquire().unwrap();
            let waiter = s.spawn(|| pool.acquire().map(|_| ()));
            thread::sleep(Duration::from_millis(20));
            drop(held);
            assert!(waiter.join().unwrap().is_ok());
        });
        assert_eq!(server.accepted(), 1);
    }

    #[test]
    fn connect_after_waiting_gets_only_the_remaining_budget() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(NodeConfig {
            connect_timeout: Duration::from_millis(600),
            ..config(&server, 0, 1)
        })
        .unwrap();

        thread::scope(|s| {
            let mut held = pool.acquire().unwrap();
            assert!(held.connect_timeout() > Duration::from_millis(500));

            let waiter = s.spawn(|| pool.acquire().unwrap().connect_timeout());
            thread::sleep(Duration::from_millis(400));
            held.close();
            drop(held);

            assert!(waiter.join().unwrap() <= Duration::from_millis(300));
        });
        assert_eq!(server.accepted(), 2);
    }

    #[test]
    fn closed_connection_leaves_the_pool() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(config(&server, 0, 2)).unwrap();

        {
            let mut connection = pool.acquire().unwrap();
            connection.close();
            assert_eq!(connection.state(), ConnectionState::Closed);
        }
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn connect_failure_frees_the_slot() {
        let pool = ConnectionManager::new(NodeConfig {
            max_connections: 1,
            ..NodeConfig::new(mock::closed_address())
        })
        .unwrap();

        let err = pool.acquire().unwrap_err();
        assert!(err.is_node_fault());
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.fill(), 0);
    }

    #[test]
    fn sweep_keeps_the_minimum() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(config(&server, 1, 4)).unwrap();

        {
            let _a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            let _c = pool.acquire().unwrap();
        }
        assert_eq!(pool.idle_count(), 3);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.sweep(), 2);
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn drain_and_shutdown() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(config(&server, 2, 4)).unwrap();
        pool.fill();

        let held = pool.acquire().unwrap();
        assert_eq!(pool.drain_idle(), 1);
        assert_eq!(pool.live_count(), 1);

        pool.shutdown();
        assert!(matches!(pool.acquire(), Err(PoolError::Shutdown(_))));
        drop(held);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.fill(), 0);
    }

    #[test]
    fn concurrent_use_stays_within_bounds() {
        let server = MockServer::riak();
        let pool = ConnectionManager::new(NodeConfig {
            connect_timeout: Duration::from_secs(5),
            ..config(&server, 1, 3)
        })
        .unwrap();
        let checked_out = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..20 {
                        let mut connection = pool.acquire().unwrap();
                        let now = checked_out.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(pool.live_count() <= 3);
                        connection.execute(&mut Ping::new()).unwrap();
                        checked_out.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(server.accepted() <= 3);
        assert_eq!(pool.live_count(), pool.idle_count());
    }
}
