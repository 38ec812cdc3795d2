//! The connection façade: opens a transport for an origin and picks the
//! HTTP/1.1 or HTTP/2 engine to drive it, based on what ALPN (or the lack
//! of TLS at all) settled on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body as HttpBody;
use tokio::task::JoinHandle;

use crate::body::Incoming;
use crate::client::conn::{http1, http2, IoTimeouts};
use crate::client::ClientTransport;
use crate::config::SslConfig;
use crate::error::Error;
use crate::origin::Origin;
use crate::transport::{self, Protocol};

/// A handle to the task driving a connection's background I/O.
///
/// An HTTP/1.1 connection's driver exits on its own once every
/// `dispatch::Sender` clone is dropped, closing the socket behind it --
/// but `h2::client::Connection`'s future only ever resolves on a peer
/// `GOAWAY` or a connection-level error; dropping every `SendRequest`
/// clone it was handed out through does not end it. `close` forces the
/// issue for both protocols uniformly by aborting the task outright,
/// which drops the transport stream it owns regardless of what the
/// protocol engine itself would have done. Aborting a task that already
/// finished (the ordinary HTTP/1.1 case) is a harmless no-op.
struct DriverHandle {
    task: JoinHandle<()>,
    /// Set alongside the abort for protocols (HTTP/2) whose `is_closed`
    /// flag is otherwise only ever flipped by the driver future running
    /// to completion -- which `abort` bypasses.
    closed: Option<Arc<AtomicBool>>,
}

impl DriverHandle {
    fn new(task: JoinHandle<()>) -> DriverHandle {
        DriverHandle { task, closed: None }
    }

    fn with_closed_flag(task: JoinHandle<()>, closed: Arc<AtomicBool>) -> DriverHandle {
        DriverHandle {
            task,
            closed: Some(closed),
        }
    }

    fn close(&self) {
        if let Some(flag) = &self.closed {
            flag.store(true, Ordering::Relaxed);
        }
        self.task.abort();
    }

    #[cfg(test)]
    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// A single open connection, already speaking whichever protocol its ALPN
/// (or the absence of TLS) negotiated.
///
/// `httpcore.HTTPConnection` in the original source decides lazily, on
/// first `send()`, which of `h11`/`h2` to construct; here the choice is
/// made eagerly right after the transport opens, since Rust's static
/// `SendRequest<B>` types differ between engines and deferring the choice
/// would require boxing every request path instead of just this enum.
pub(crate) enum Connection<B> {
    Http1(http1::SendRequest<B>, DriverHandle),
    Http2(http2::SendRequest<B>, DriverHandle),
}

impl<B> Connection<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    pub(crate) async fn send_request(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        match self {
            Connection::Http1(sr, _) => sr.send_request(req).await,
            Connection::Http2(sr, _) => sr.send_request(req).await,
        }
    }

    /// Whether the connection's background driver task has observed the
    /// connection end. A closed connection is never returned to the
    /// keepalive store.
    pub(crate) fn is_closed(&self) -> bool {
        match self {
            Connection::Http1(sr, _) => sr.is_closed(),
            Connection::Http2(sr, _) => sr.is_closed(),
        }
    }

    /// Forces this connection closed: aborts its background driver task,
    /// which drops the transport stream regardless of whether the
    /// protocol engine itself exposes a shutdown path. Idempotent.
    pub(crate) fn close(&self) {
        match self {
            Connection::Http1(_, handle) => handle.close(),
            Connection::Http2(_, handle) => handle.close(),
        }
    }

    #[cfg(test)]
    fn driver_is_finished(&self) -> bool {
        match self {
            Connection::Http1(_, handle) => handle.is_finished(),
            Connection::Http2(_, handle) => handle.is_finished(),
        }
    }
}

/// Opens a transport for `origin` and completes the HTTP/1.1 or HTTP/2
/// handshake over it, spawning the connection's background driver task.
///
/// Returns the `Connection` handle; the driver task runs independently and
/// is not joined by the caller (matching `httpcore`'s fire-and-forget
/// background network task, and hyper's own `tokio::spawn(connection)`
/// pattern in its client examples).
pub(crate) async fn establish<B>(
    origin: &Origin,
    ssl: Option<&SslConfig>,
    connect_timeout: Option<Duration>,
    io_timeouts: IoTimeouts,
) -> Result<Connection<B>, Error>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    let (stream, protocol) = transport::connect(origin, ssl, connect_timeout).await?;

    match protocol {
        Protocol::Http1 => {
            let (send_request, connection) = http1::handshake(stream, io_timeouts).await?;
            let handle = DriverHandle::new(spawn_task(connection.run()));
            Ok(Connection::Http1(send_request, handle))
        }
        Protocol::Http2 => {
            let (send_request, connection) = http2::handshake(stream, io_timeouts).await?;
            let closed = send_request.closed_flag();
            let handle = DriverHandle::with_closed_flag(spawn_task(connection), closed);
            Ok(Connection::Http2(send_request, handle))
        }
    }
}

fn spawn_task<F>(fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = fut.await {
            tracing::debug!(error = %err, "connection driver ended");
        }
    })
}

/// A single connection used directly, with no pooling.
///
/// The unpooled counterpart the pool itself is built from: useful for a
/// caller that already knows it only needs one connection to one origin
/// and doesn't want semaphore/idle-store bookkeeping in the way.
pub struct SingleConnection<B> {
    inner: Connection<B>,
}

impl<B> std::fmt::Debug for SingleConnection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleConnection").finish()
    }
}

impl<B> SingleConnection<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    /// Opens a connection to `origin` without registering it in any pool.
    pub async fn connect(
        origin: &Origin,
        ssl: Option<&SslConfig>,
        timeouts: &crate::config::TimeoutConfig,
    ) -> Result<SingleConnection<B>, Error> {
        Ok(SingleConnection {
            inner: establish(
                origin,
                ssl,
                timeouts.connect,
                IoTimeouts {
                    read: timeouts.read,
                    write: timeouts.write,
                },
            )
            .await?,
        })
    }
}

#[async_trait]
impl<B> ClientTransport<B> for SingleConnection<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    async fn send(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        self.inner.send_request(req).await
    }

    async fn close(&self) {
        self.inner.close();
    }
}
