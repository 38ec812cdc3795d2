//! Error and Result types shared across the pool and protocol engines.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Result type returned by most `httpcore` operations.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while acquiring, driving, or releasing a connection.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Kind {
    /// `semaphore.acquire` exceeded `pool_timeout`.
    PoolTimeout,
    /// Transport open (TCP connect + optional TLS handshake) exceeded `connect_timeout`.
    ConnectTimeout,
    /// A socket read exceeded `read_timeout`.
    ReadTimeout,
    /// A socket write exceeded `write_timeout`.
    WriteTimeout,
    /// DNS, socket, or TLS failure that isn't a timeout.
    NetworkError,
    /// Malformed framing or an engine reached an unexpected state.
    ProtocolError,
    /// The caller tried to read a response body stream a second time.
    StreamConsumed,
    /// The caller tried to read a response body after it was explicitly closed.
    ResponseClosed,
    /// `send` was called after `Pool::close()`.
    PoolClosed,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn pool_timeout() -> Error {
        Error::new(Kind::PoolTimeout)
    }

    pub(crate) fn connect_timeout() -> Error {
        Error::new(Kind::ConnectTimeout)
    }

    pub(crate) fn read_timeout() -> Error {
        Error::new(Kind::ReadTimeout)
    }

    pub(crate) fn write_timeout() -> Error {
        Error::new(Kind::WriteTimeout)
    }

    pub(crate) fn network<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::NetworkError).with(cause)
    }

    pub(crate) fn protocol<C: Into<Cause>>(cause: C) -> Error {
        Error::new(Kind::ProtocolError).with(cause)
    }

    pub(crate) fn protocol_msg(msg: &'static str) -> Error {
        Error::new(Kind::ProtocolError).with(msg)
    }

    pub(crate) fn stream_consumed() -> Error {
        Error::new(Kind::StreamConsumed)
    }

    pub(crate) fn response_closed() -> Error {
        Error::new(Kind::ResponseClosed)
    }

    pub(crate) fn pool_closed() -> Error {
        Error::new(Kind::PoolClosed)
    }

    pub(crate) fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// Returns true if waiting for a pool permit timed out.
    pub fn is_pool_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::PoolTimeout)
    }

    /// Returns true if opening the transport timed out.
    pub fn is_connect_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectTimeout)
    }

    /// Returns true if a read deadline was exceeded.
    pub fn is_read_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::ReadTimeout)
    }

    /// Returns true if a write deadline was exceeded.
    pub fn is_write_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::WriteTimeout)
    }

    /// Returns true for DNS, socket, or TLS failures that are not timeouts.
    pub fn is_network(&self) -> bool {
        matches!(self.inner.kind, Kind::NetworkError)
    }

    /// Returns true if an HTTP/1.1 or HTTP/2 engine detected malformed framing
    /// or an unexpected state. Safe to retry idempotent methods on a fresh
    /// connection.
    pub fn is_protocol(&self) -> bool {
        matches!(self.inner.kind, Kind::ProtocolError)
    }

    /// Returns true if the pool was closed before this `send` was dispatched.
    pub fn is_pool_closed(&self) -> bool {
        matches!(self.inner.kind, Kind::PoolClosed)
    }

    /// Returns true if a response body was polled again after it had
    /// already yielded its final chunk.
    pub fn is_stream_consumed(&self) -> bool {
        matches!(self.inner.kind, Kind::StreamConsumed)
    }

    /// Returns true if a response body was polled after [`Incoming::close`](crate::body::Incoming::close).
    pub fn is_response_closed(&self) -> bool {
        matches!(self.inner.kind, Kind::ResponseClosed)
    }

    /// Consumes the error, returning its underlying cause, if any.
    pub fn into_cause(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.inner.cause
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::PoolTimeout => "timed out waiting for a pool connection permit",
            Kind::ConnectTimeout => "timed out opening a transport connection",
            Kind::ReadTimeout => "timed out reading from the connection",
            Kind::WriteTimeout => "timed out writing to the connection",
            Kind::NetworkError => "a network error occurred",
            Kind::ProtocolError => "the connection violated protocol framing",
            Kind::StreamConsumed => "the response body was already consumed",
            Kind::ResponseClosed => "the response body was already closed",
            Kind::PoolClosed => "the connection pool is closed",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("httpcore::Error");
        f.field(&self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            f.field(cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cause) = self.inner.cause {
            write!(f, "{}: {}", self.description(), cause)
        } else {
            f.write_str(self.description())
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .cause
            .as_ref()
            .map(|cause| &**cause as &(dyn StdError + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::TimedOut {
            Error::read_timeout().with(err)
        } else {
            Error::network(err)
        }
    }
}
