//! The HTTP/2 engine: a thin wrapper over the `h2` crate's own
//! sans-I/O state machine. Unlike HTTP/1.1, `h2::client::SendRequest` is
//! already `Clone` and multiplexes streams on its own, so this module adds
//! no dispatcher of its own — only the glue to present request/response
//! bodies as [`http_body::Body`] the same way the HTTP/1.1 engine does.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body as HttpBody;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::body::Incoming;
use crate::client::conn::IoTimeouts;
use crate::error::Error;

const BODY_CHANNEL_CAPACITY: usize = 8;

/// Awaits `fut`, mapping a timeout into `on_timeout()` instead of the I/O
/// error `h2` itself would report — the HTTP/2 counterpart of
/// `http1::with_timeout`, applied to the handful of `h2` futures that
/// correspond to spec's per-operation read/write deadlines: waiting for
/// send-stream capacity (a write) and waiting for the response head or a
/// body chunk (a read).
async fn with_timeout<F: std::future::Future>(
    timeout: Option<Duration>,
    fut: F,
    on_timeout: fn() -> Error,
) -> Result<F::Output, Error> {
    match timeout {
        None => Ok(fut.await),
        Some(dur) => tokio::time::timeout(dur, fut).await.map_err(|_| on_timeout()),
    }
}

/// A handle used to send requests over a multiplexed HTTP/2 connection.
///
/// Cheap to clone: every clone shares the same underlying `h2` stream
/// table, so the pool can hand this out for several concurrent requests
/// against the same connection.
pub(crate) struct SendRequest<B> {
    inner: h2::client::SendRequest<Bytes>,
    closed: Arc<AtomicBool>,
    io_timeouts: IoTimeouts,
    _marker: PhantomData<fn(B)>,
}

impl<B> Clone for SendRequest<B> {
    fn clone(&self) -> Self {
        SendRequest {
            inner: self.inner.clone(),
            closed: self.closed.clone(),
            io_timeouts: self.io_timeouts,
            _marker: PhantomData,
        }
    }
}

impl<B> SendRequest<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    pub(crate) async fn send_request(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        let mut h2_send = self.inner.clone();
        with_timeout(self.io_timeouts.write, h2_send.ready(), Error::write_timeout)
            .await?
            .map_err(Error::protocol)?;

        let (parts, mut body) = req.into_parts();
        let head = Request::from_parts(parts, ());
        let end_of_stream = body.is_end_stream();

        let (response_fut, send_stream) = h2_send
            .send_request(head, end_of_stream)
            .map_err(Error::protocol)?;

        if !end_of_stream {
            write_body(send_stream, Pin::new(&mut body), self.io_timeouts.write).await?;
        }

        let response = with_timeout(self.io_timeouts.read, response_fut, Error::read_timeout)
            .await?
            .map_err(Error::protocol)?;
        let (parts, recv_stream) = response.into_parts();
        let incoming = spawn_incoming(recv_stream, self.io_timeouts.read);
        Ok(Response::from_parts(parts, incoming))
    }

    /// Whether the background `Connection` task has observed the
    /// underlying h2 connection end. The pool treats this connection as
    /// no longer reusable once true.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// The shared flag `is_closed` reads from, so the façade can mark this
    /// connection closed the instant it forces the driver task down --
    /// `h2::client::Connection`'s own future only resolves on GOAWAY or a
    /// connection-level error, so aborting the task (rather than letting
    /// it run to completion) would otherwise leave `closed` stuck at
    /// `false`.
    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

/// The future driving the HTTP/2 connection's I/O. Must be polled (e.g.
/// via `tokio::spawn`) for any `SendRequest` clone to make progress.
pub(crate) struct Connection<T> {
    inner: h2::client::Connection<T, Bytes>,
    closed: Arc<AtomicBool>,
}

impl<T> Future for Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll(cx);
        if result.is_ready() {
            this.closed.store(true, Ordering::Relaxed);
        }
        result.map_err(Error::protocol)
    }
}

/// Opens an HTTP/2 connection over an already-connected, already-ALPN
/// negotiated stream.
pub(crate) async fn handshake<T, B>(
    io: T,
    io_timeouts: IoTimeouts,
) -> Result<(SendRequest<B>, Connection<T>), Error>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    let (send_request, connection) = h2::client::Builder::new()
        .enable_push(false)
        .handshake(io)
        .await
        .map_err(Error::protocol)?;

    let closed = Arc::new(AtomicBool::new(false));
    Ok((
        SendRequest {
            inner: send_request,
            closed: closed.clone(),
            io_timeouts,
            _marker: PhantomData,
        },
        Connection {
            inner: connection,
            closed,
        },
    ))
}

async fn write_body<B>(
    mut send_stream: h2::SendStream<Bytes>,
    mut body: Pin<&mut B>,
    write_timeout: Option<Duration>,
) -> Result<(), Error>
where
    B: HttpBody<Data = Bytes, Error = Error>,
{
    loop {
        let chunk = futures_util::future::poll_fn(|cx| body.as_mut().poll_data(cx)).await;
        let mut chunk = match chunk {
            Some(c) => c?,
            None => break,
        };

        while !chunk.is_empty() {
            send_stream.reserve_capacity(chunk.len());
            let available = with_timeout(
                write_timeout,
                futures_util::future::poll_fn(|cx| send_stream.poll_capacity(cx)),
                Error::write_timeout,
            )
            .await?
            .transpose()
            .map_err(Error::protocol)?
            .unwrap_or(0);
            if available == 0 {
                continue;
            }
            let taken = available.min(chunk.len());
            let data = chunk.split_to(taken);
            let end = chunk.is_empty() && body.is_end_stream();
            send_stream.send_data(data, end).map_err(Error::protocol)?;
        }
    }
    if body.is_end_stream() {
        let _ = send_stream.send_data(Bytes::new(), true);
    }
    Ok(())
}

/// Reads the response body off `recv_stream` into `Incoming`'s channel.
///
/// Runs as its own spawned task decoupled from the caller's `send_request`
/// future, so `read_timeout` here is applied per chunk directly (rather
/// than through `with_timeout`, whose `Result`-only return doesn't fit
/// `poll_data`'s `Option<Result<_>>` shape) and a stall is reported to the
/// caller through the body stream itself, the same path a mid-body
/// protocol error already uses.
fn spawn_incoming(mut recv_stream: h2::RecvStream, read_timeout: Option<Duration>) -> Incoming {
    let (tx, incoming) = Incoming::channel(BODY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        loop {
            let poll = futures_util::future::poll_fn(|cx| recv_stream.poll_data(cx));
            let chunk = match read_timeout {
                None => poll.await,
                Some(dur) => match tokio::time::timeout(dur, poll).await {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        let _ = tx.send(Err(Error::read_timeout())).await;
                        break;
                    }
                },
            };
            match chunk {
                Some(Ok(bytes)) => {
                    let len = bytes.len();
                    let _ = recv_stream.flow_control().release_capacity(len);
                    if tx.send(Ok(bytes)).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(Error::protocol(e))).await;
                    break;
                }
                None => break,
            }
        }
    });
    incoming
}
