//! Configuration objects passed into a `Pool` at construction time.

use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsConnector;

/// Bounds on how many connections the pool may hold.
///
/// Mirrors `httpcore.pool.ConnectionPool`'s `max_connections` and
/// `max_keepalive_connections` constructor arguments. A `None` limit means
/// unbounded.
#[derive(Debug, Clone)]
pub struct PoolLimits {
    pub(crate) max_connections: Option<usize>,
    pub(crate) max_keepalive_connections: Option<usize>,
    pub(crate) keepalive_timeout: Duration,
}

impl Default for PoolLimits {
    fn default() -> PoolLimits {
        PoolLimits {
            max_connections: Some(100),
            max_keepalive_connections: Some(20),
            keepalive_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolLimits {
    /// Caps the total number of connections, active or idle, per pool.
    pub fn with_max_connections(mut self, max: Option<usize>) -> PoolLimits {
        self.max_connections = max;
        self
    }

    /// Caps how many idle connections are kept around for reuse.
    ///
    /// When a connection is released and this soft limit is already met,
    /// the pool closes the connection instead of keeping it idle.
    pub fn with_max_keepalive_connections(mut self, max: Option<usize>) -> PoolLimits {
        self.max_keepalive_connections = max;
        self
    }

    /// How long an idle connection may sit in the pool before it is treated
    /// as stale and dropped on the next acquire.
    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> PoolLimits {
        self.keepalive_timeout = timeout;
        self
    }
}

/// Deadlines applied to the individual phases of acquiring and using a
/// connection.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub(crate) pool: Option<Duration>,
    pub(crate) connect: Option<Duration>,
    pub(crate) read: Option<Duration>,
    pub(crate) write: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> TimeoutConfig {
        TimeoutConfig {
            pool: Some(Duration::from_secs(10)),
            connect: Some(Duration::from_secs(10)),
            read: Some(Duration::from_secs(30)),
            write: Some(Duration::from_secs(30)),
        }
    }
}

impl TimeoutConfig {
    /// How long to wait for a semaphore permit before failing with
    /// [`Error::is_pool_timeout`](crate::Error::is_pool_timeout).
    pub fn with_pool_timeout(mut self, timeout: Option<Duration>) -> TimeoutConfig {
        self.pool = timeout;
        self
    }

    /// How long DNS resolution plus the TCP/TLS handshake may take.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> TimeoutConfig {
        self.connect = timeout;
        self
    }

    /// How long a single socket read may take before it is treated as
    /// stalled.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> TimeoutConfig {
        self.read = timeout;
        self
    }

    /// How long a single socket write may take before it is treated as
    /// stalled.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> TimeoutConfig {
        self.write = timeout;
        self
    }
}

/// TLS parameters used when an origin's scheme is `https`.
///
/// This crate does not build TLS contexts itself; it only drives the
/// handshake through whatever `TlsConnector` the caller constructed. ALPN
/// is expected to offer both `h2` and `http/1.1`; the negotiated protocol
/// picks which engine drives the connection.
#[derive(Clone)]
pub struct SslConfig {
    pub(crate) connector: Arc<TlsConnector>,
}

impl SslConfig {
    /// Wraps a pre-built `rustls` connector for use by the pool.
    pub fn new(connector: TlsConnector) -> SslConfig {
        SslConfig {
            connector: Arc::new(connector),
        }
    }
}

impl std::fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslConfig").finish()
    }
}
