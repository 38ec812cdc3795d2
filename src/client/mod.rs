//! The client-side connection pool and per-connection protocol engines.
//!
//! [`Pool`] is the primary entry point: it owns the semaphore and idle
//! connection store described in the crate's top-level docs.
//! [`SingleConnection`] exposes the same [`ClientTransport`] capability for
//! callers that want to drive a single connection themselves, bypassing
//! pooling entirely.

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body::Body as HttpBody;

use crate::body::Incoming;
use crate::error::Error;

pub(crate) mod conn;
mod connection;
mod pool;

pub use connection::SingleConnection;
pub use pool::Pool;

/// A capability shared by [`Pool`] and a bare, unpooled connection: send a
/// request and get a response back, and close down when done.
///
/// Expressed as an explicit trait rather than two structurally-similar but
/// unrelated `send`/`close` methods, so code written against "something
/// that can send requests" doesn't have to care whether a pool sits behind
/// it.
#[async_trait]
pub trait ClientTransport<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    /// Sends a single request and returns its response.
    async fn send(&self, req: Request<B>) -> Result<Response<Incoming>, Error>;

    /// Shuts down, rejecting any requests sent afterward.
    async fn close(&self);
}

#[async_trait]
impl<B> ClientTransport<B> for Pool<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    async fn send(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        self.send_request(req).await
    }

    async fn close(&self) {
        Pool::close(self).await
    }
}
