//! Per-connection protocol engines.
//!
//! The types in this module drive a single already-open connection; DNS,
//! TCP/TLS, and pooling are handled by [`crate::transport`] and
//! [`crate::pool`]. `http1` and `http2` each expose a `handshake` function
//! returning a `SendRequest` handle plus a `Connection` future that must be
//! polled (normally via `tokio::spawn`) to drive the connection's I/O.

use std::time::Duration;

pub(crate) mod dispatch;
pub(crate) mod http1;
pub(crate) mod http2;

/// Per-connection read/write deadlines, applied to every individual socket
/// operation rather than the request as a whole (a slow-but-steady transfer
/// should not time out just because it runs long) — spec's `read_timeout`/
/// `write_timeout` from `TimeoutConfig`, threaded down from the pool into
/// whichever engine ends up driving the connection.
#[derive(Clone, Copy, Default)]
pub(crate) struct IoTimeouts {
    pub(crate) read: Option<Duration>,
    pub(crate) write: Option<Duration>,
}
