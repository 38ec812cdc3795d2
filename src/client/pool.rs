//! The connection pool: tracks active and idle connections per origin and
//! bounds how many may exist at once.
//!
//! `acquire_connection`/`release_connection` follow
//! `httpcore.connection_pool.ConnectionPool` from the original Python
//! source almost line for line: pop an idle connection for the origin if
//! one exists, otherwise wait for a semaphore permit and open a fresh one;
//! on release, either hand the connection back for reuse, or close it if
//! it's already dead or the idle pool is already at its soft limit.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body as HttpBody;

use crate::body::Incoming;
use crate::client::conn::IoTimeouts;
use crate::client::connection::{self, Connection};
use crate::config::{PoolLimits, SslConfig, TimeoutConfig};
use crate::error::Error;
use crate::origin::Origin;
use crate::semaphore::{Permit, PoolSemaphore};
use crate::store::ConnectionStore;

struct Pooled<B> {
    conn: Connection<B>,
    permit: Permit,
}

struct Inner<B> {
    semaphore: PoolSemaphore,
    limits: PoolLimits,
    timeouts: TimeoutConfig,
    ssl: Option<SslConfig>,
    /// Connections currently checked out. Unlike `keepalive`, active
    /// connections are never looked up by origin — a checkout already
    /// owns its connection directly — so this is a plain counter, the
    /// same bookkeeping `httpcore.pool`'s flatter pool variant uses for
    /// `num_active_connections`. Shared via `Arc` so an `ActiveGuard` can
    /// decrement it even after the checkout that created it is abandoned
    /// by a cancelled future rather than released normally.
    active_count: Arc<AtomicUsize>,
    keepalive: Mutex<ConnectionStore<Pooled<B>>>,
    closed: AtomicBool,
}

/// A connection pool keyed by origin.
///
/// Cheap to clone: clones share the same semaphore and connection stores,
/// the same way `httpcore.ConnectionPool` is a single long-lived object
/// shared by every request made through a client.
pub struct Pool<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Pool<B> {
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
        }
    }
}

impl<B> std::fmt::Debug for Pool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Decrements `active_count` when dropped, regardless of whether the
/// checkout that held it was released normally or abandoned mid-`await`
/// by a cancelled `send_request` future. Without this, cancelling a
/// request between `acquire_connection` and `release_connection` would
/// leak the counter forever — the semaphore permit itself is already
/// safe under cancellation (it frees itself via `Pooled`'s own drop),
/// but `active_count` has no such built-in guard.
struct ActiveGuard {
    active_count: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A connection checked out of the pool. Always handed back through
/// [`Pool::release_connection`], never dropped silently, so every permit
/// has a well-defined release point.
struct Checkout<B> {
    origin: Origin,
    pooled: Pooled<B>,
    _active: ActiveGuard,
}

impl<B> Pool<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    /// Builds a pool with the given resource limits, timeouts, and
    /// (optional) TLS configuration for `https` origins.
    pub fn new(limits: PoolLimits, timeouts: TimeoutConfig, ssl: Option<SslConfig>) -> Pool<B> {
        Pool {
            inner: Arc::new(Inner {
                semaphore: PoolSemaphore::new(limits.max_connections),
                limits,
                timeouts,
                ssl,
                active_count: Arc::new(AtomicUsize::new(0)),
                keepalive: Mutex::new(ConnectionStore::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Sends a single request, acquiring a connection from the pool (or
    /// opening a new one) and releasing it back when the response head has
    /// been handed to the caller.
    pub async fn send_request(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::pool_closed());
        }

        let origin = Origin::from_uri(req.uri())?;
        let checkout = self.acquire_connection(&origin).await?;
        let result = checkout.pooled.conn.send_request(req).await;
        self.release_connection(checkout, result.is_err()).await;
        result
    }

    /// How many connections are currently checked out for an in-flight
    /// request.
    pub fn active_connections(&self) -> usize {
        self.inner.active_count.load(Ordering::Acquire)
    }

    /// How many idle, reusable connections the pool is currently holding.
    ///
    /// Mirrors `len(self.keepalive_connections)` from the original
    /// `httpcore.ConnectionPool.num_connections` property.
    pub fn keepalive_connections(&self) -> usize {
        self.inner.keepalive.lock().unwrap().len()
    }

    /// Closes the pool: no further `send_request` calls succeed, and every
    /// idle connection is dropped. Connections currently checked out are
    /// left alone and close themselves on their next release.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained = {
            let mut keepalive = self.inner.keepalive.lock().unwrap();
            keepalive.drain()
        };
        for pooled in drained {
            pooled.conn.close();
        }
    }

    async fn acquire_connection(&self, origin: &Origin) -> Result<Checkout<B>, Error> {
        loop {
            let reused = {
                let mut keepalive = self.inner.keepalive.lock().unwrap();
                keepalive.pop_most_recent_for(origin)
            };
            let (_, pooled, age) = match reused {
                Some(found) => found,
                None => break,
            };

            if pooled.conn.is_closed() {
                // `pooled.permit` drops here, freeing a semaphore slot.
                continue;
            }
            if age >= self.inner.limits.keepalive_timeout {
                // Stale but not yet observed closed -- tear it down
                // explicitly rather than relying on `Drop`, since an
                // HTTP/2 connection's background driver keeps running
                // until something aborts it.
                pooled.conn.close();
                continue;
            }

            self.inner.active_count.fetch_add(1, Ordering::AcqRel);
            return Ok(Checkout {
                origin: origin.clone(),
                pooled,
                _active: ActiveGuard {
                    active_count: Arc::clone(&self.inner.active_count),
                },
            });
        }

        let permit = self.inner.semaphore.acquire(self.inner.timeouts.pool).await?;
        let io_timeouts = IoTimeouts {
            read: self.inner.timeouts.read,
            write: self.inner.timeouts.write,
        };
        let conn = connection::establish(
            origin,
            self.inner.ssl.as_ref(),
            self.inner.timeouts.connect,
            io_timeouts,
        )
        .await?;
        self.inner.active_count.fetch_add(1, Ordering::AcqRel);
        Ok(Checkout {
            origin: origin.clone(),
            pooled: Pooled { conn, permit },
            _active: ActiveGuard {
                active_count: Arc::clone(&self.inner.active_count),
            },
        })
    }

    async fn release_connection(&self, checkout: Checkout<B>, failed: bool) {
        let Checkout { origin, pooled, _active } = checkout;

        if failed || pooled.conn.is_closed() {
            // permit drops with `pooled`, freeing a semaphore slot. A
            // request that errored may have left the connection mid-frame;
            // it's never handed back for reuse even if the background
            // driver hasn't yet noticed the connection is dead.
            pooled.conn.close();
            drop(_active);
            return;
        }

        if self.inner.closed.load(Ordering::Acquire) {
            pooled.conn.close();
            drop(_active);
            return;
        }

        // `_active` hasn't dropped yet, so `active_count` still counts
        // this connection; added to the idle store's current size under
        // the same lock, that's exactly spec's `|active| + |keepalive|`
        // at the moment of release, matching both original sources'
        // `num_connections` (active plus idle) rather than idle alone.
        let mut keepalive = self.inner.keepalive.lock().unwrap();
        let total = self.inner.active_count.load(Ordering::Acquire) + keepalive.len();
        let at_soft_limit = self
            .inner
            .limits
            .max_keepalive_connections
            .map_or(false, |max| total > max);

        drop(_active);

        if at_soft_limit {
            // permit drops with `pooled`.
            pooled.conn.close();
            return;
        }

        keepalive.add(origin, pooled);
    }
}
