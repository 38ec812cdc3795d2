//! Request and response body types.
//!
//! Bodies are [`http_body::Body`] implementors so callers can stream
//! arbitrary sources into a request and get backpressure on the way out of
//! a response, the same trait hyper itself builds on.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body as HttpBody, SizeHint};
use tokio::sync::mpsc;

use crate::error::Error;

/// A request or response body.
///
/// Most callers don't need to name this type: request bodies are generic
/// over `http_body::Body`, and response bodies are always [`Incoming`].
pub type BoxBody = http_body::combinators::UnsyncBoxBody<Bytes, Error>;

/// A body made of a single, already-in-memory chunk.
///
/// The request-side counterpart of `httpcore`'s streaming request bodies;
/// used whenever the caller already has the whole payload as `Bytes`.
#[derive(Debug, Clone)]
pub struct Buffered {
    data: Option<Bytes>,
}

impl Buffered {
    /// Wraps `data` as a one-shot body. An empty buffer produces a body
    /// that reports `is_end_stream() == true` immediately.
    pub fn new(data: Bytes) -> Buffered {
        Buffered {
            data: if data.is_empty() { None } else { Some(data) },
        }
    }

    /// A body with no content.
    pub fn empty() -> Buffered {
        Buffered { data: None }
    }
}

impl HttpBody for Buffered {
    type Data = Bytes;
    type Error = Error;

    fn poll_data(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        Poll::Ready(self.data.take().map(Ok))
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.as_ref().map_or(0, |b| b.len() as u64))
    }
}

/// A body made of a lazy, finite sequence of byte chunks supplied by the
/// caller over a channel.
///
/// The streaming counterpart of [`Buffered`]: the request-side engines
/// treat a `Streaming` body the same as any other `http_body::Body` whose
/// `size_hint` doesn't report an exact length, which is what selects
/// chunked transfer-encoding on the HTTP/1.1 path (spec.md §4.D) and plain
/// unsized `DATA` framing on the HTTP/2 path.
#[derive(Debug)]
pub struct Streaming {
    rx: mpsc::Receiver<Bytes>,
    done: bool,
}

impl Streaming {
    /// Returns the body plus a sender the caller uses to push chunks into
    /// it. Dropping the sender (or calling it zero times) ends the body.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Streaming) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Streaming { rx, done: false })
    }
}

impl HttpBody for Streaming {
    type Data = Bytes;
    type Error = Error;

    fn poll_data(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        if self.done {
            return Poll::Ready(None);
        }
        match futures_core::ready!(self.rx.poll_recv(cx)) {
            Some(chunk) => Poll::Ready(Some(Ok(chunk))),
            None => {
                self.done = true;
                Poll::Ready(None)
            }
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

/// The body of a response streamed back from the connection that produced
/// it.
///
/// Each chunk is handed over the channel by the HTTP/1.1 or HTTP/2 engine
/// as it comes off the wire, so a caller who never polls this body applies
/// backpressure all the way back to the socket (the channel is bounded).
///
/// A response owns the connection until this body is fully drained or
/// explicitly [`close`](Incoming::close)d; polling it again afterward fails
/// with [`Error::is_stream_consumed`]/[`Error::is_response_closed`] rather
/// than silently returning `None` a second time.
#[derive(Debug)]
pub struct Incoming {
    state: IncomingState,
}

#[derive(Debug)]
enum IncomingState {
    Channel {
        data: mpsc::Receiver<Result<Bytes, Error>>,
        trailers: Option<mpsc::Receiver<HeaderMap>>,
    },
    /// The channel reported end-of-stream; the one `None` that signals
    /// completion to a well-behaved caller has already been returned.
    Exhausted,
    /// The caller called `close()` before the body was fully read.
    Closed,
}

impl Incoming {
    pub(crate) fn channel(
        capacity: usize,
    ) -> (mpsc::Sender<Result<Bytes, Error>>, Incoming) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Incoming {
                state: IncomingState::Channel {
                    data: rx,
                    trailers: None,
                },
            },
        )
    }

    /// A response body with a known-empty payload, e.g. for 204/304
    /// responses or HEAD requests.
    pub fn empty() -> Incoming {
        Incoming {
            state: IncomingState::Exhausted,
        }
    }

    /// Drops the remainder of the body without reading it.
    ///
    /// Matches `httpcore.HTTPConnection`'s `aclose()` semantics: closing
    /// early is not itself an error, but any later `poll_data` call is —
    /// callers are expected to stop polling once they've closed.
    pub fn close(&mut self) {
        self.state = IncomingState::Closed;
    }
}

impl HttpBody for Incoming {
    type Data = Bytes;
    type Error = Error;

    fn poll_data(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        match &mut self.state {
            IncomingState::Channel { data, .. } => match futures_core::ready!(data.poll_recv(cx)) {
                Some(item) => Poll::Ready(Some(item)),
                None => {
                    self.state = IncomingState::Exhausted;
                    Poll::Ready(None)
                }
            },
            IncomingState::Exhausted => Poll::Ready(Some(Err(Error::stream_consumed()))),
            IncomingState::Closed => Poll::Ready(Some(Err(Error::response_closed()))),
        }
    }

    fn poll_trailers(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        match &mut self.state {
            IncomingState::Channel { trailers, .. } => match trailers {
                Some(rx) => Poll::Ready(Ok(futures_core::ready!(rx.poll_recv(cx)))),
                None => Poll::Ready(Ok(None)),
            },
            IncomingState::Exhausted => Poll::Ready(Ok(None)),
            IncomingState::Closed => Poll::Ready(Err(Error::response_closed())),
        }
    }

    fn is_end_stream(&self) -> bool {
        !matches!(self.state, IncomingState::Channel { .. })
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body::Body;

    #[tokio::test]
    async fn buffered_yields_once_then_ends() {
        let mut body = Buffered::new(Bytes::from_static(b"hello"));
        assert!(!body.is_end_stream());
        let chunk = futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_data(cx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chunk, Bytes::from_static(b"hello"));
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn streaming_yields_chunks_in_order_then_ends() {
        let (tx, mut body) = Streaming::channel(4);
        tx.send(Bytes::from_static(b"Hello, ")).await.unwrap();
        tx.send(Bytes::from_static(b"world!")).await.unwrap();
        drop(tx);

        let mut collected = Vec::new();
        while let Some(chunk) =
            futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_data(cx)).await
        {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"Hello, world!");
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn incoming_close_fails_further_reads() {
        let (tx, mut body) = Incoming::channel(4);
        tx.send(Ok(Bytes::from_static(b"a"))).await.unwrap();
        body.close();
        assert!(body.is_end_stream());
        let chunk = futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_data(cx)).await;
        assert!(chunk.unwrap().unwrap_err().is_response_closed());
    }

    #[tokio::test]
    async fn incoming_rereads_after_eof_are_rejected() {
        let (tx, mut body) = Incoming::channel(4);
        drop(tx);
        let first = futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_data(cx)).await;
        assert!(first.is_none());
        assert!(body.is_end_stream());
        let second = futures_util::future::poll_fn(|cx| Pin::new(&mut body).poll_data(cx)).await;
        assert!(second.unwrap().unwrap_err().is_stream_consumed());
    }
}
