//! The HTTP/1.1 sans-I/O engine: request/response framing over a single
//! byte stream, driven one request at a time.
//!
//! Request-line and header serialization is hand-rolled; response heads
//! are parsed with `httparse`. There is no pipelining: a second request
//! waits for the first response's body to finish draining, which is what
//! HTTP/1.1 requires anyway since the wire is not multiplexed.

use std::pin::Pin;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, Method, Request, Response, StatusCode, Version};
use http_body::Body as HttpBody;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::body::Incoming;
use crate::client::conn::{dispatch, IoTimeouts};
use crate::error::Error;
use crate::headers;

const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;
const BODY_CHANNEL_CAPACITY: usize = 8;

async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F, on_timeout: fn() -> Error) -> Result<T, Error>
where
    F: std::future::Future<Output = Result<T, std::io::Error>>,
{
    match timeout {
        None => Ok(fut.await?),
        Some(dur) => match tokio::time::timeout(dur, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(on_timeout()),
        },
    }
}

/// A handle used to send requests over a single HTTP/1.1 connection.
///
/// Only one request may be in flight at a time; a second `send_request`
/// call simply queues behind the first until its response body finishes.
pub(crate) struct SendRequest<B> {
    dispatch: dispatch::Sender<B>,
}

impl<B> SendRequest<B>
where
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    pub(crate) async fn send_request(&self, req: Request<B>) -> Result<Response<Incoming>, Error> {
        self.dispatch.send_request(req).await
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.dispatch.is_closed()
    }
}

/// The future driving a single HTTP/1.1 connection. Must be polled (e.g.
/// via `tokio::spawn`) for its `SendRequest` counterpart to make progress.
pub(crate) struct Connection<T, B> {
    io: T,
    dispatch: dispatch::Receiver<B>,
    read_buf: BytesMut,
    io_timeouts: IoTimeouts,
}

/// Opens an HTTP/1.1 connection over an already-connected stream.
pub(crate) async fn handshake<T, B>(
    io: T,
    io_timeouts: IoTimeouts,
) -> Result<(SendRequest<B>, Connection<T, B>), Error>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    let (tx, rx) = dispatch::channel();
    Ok((
        SendRequest { dispatch: tx },
        Connection {
            io,
            dispatch: rx,
            read_buf: BytesMut::with_capacity(8 * 1024),
            io_timeouts,
        },
    ))
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum BodyMode {
    None,
    ContentLength(u64),
    Chunked,
    UntilClose,
}

impl<T, B> Connection<T, B>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    /// Drives the connection until the dispatch channel closes (the
    /// `SendRequest` was dropped) or the peer signals it will close the
    /// connection.
    pub(crate) async fn run(mut self) -> Result<(), Error> {
        loop {
            let (req, reply) = match self.dispatch.recv().await {
                Some(item) => item,
                None => return Ok(()),
            };
            match self.roundtrip(req, reply).await {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    async fn roundtrip(
        &mut self,
        req: Request<B>,
        reply: oneshot::Sender<Result<Response<Incoming>, Error>>,
    ) -> Result<bool, Error> {
        let method = req.method().clone();

        if let Err(e) = self.write_request(req).await {
            let kind = e.kind();
            let _ = reply.send(Err(e));
            return Err(Error::new(kind));
        }

        let head = match self.read_response_head().await {
            Ok(head) => head,
            Err(e) => {
                let kind = e.kind();
                let _ = reply.send(Err(e));
                return Err(Error::new(kind));
            }
        };

        let informational = head.status.as_u16() >= 100 && head.status.as_u16() < 200;
        if informational {
            // 1xx responses carry no body and are followed by the real
            // response on the same connection; loop back around.
            return self.roundtrip_continue(method, reply).await;
        }

        self.respond(head, method, reply).await
    }

    // Re-reads a second response head after discarding a 1xx.
    fn roundtrip_continue<'a>(
        &'a mut self,
        method: Method,
        reply: oneshot::Sender<Result<Response<Incoming>, Error>>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<bool, Error>> + Send + 'a>> {
        Box::pin(async move {
            let head = match self.read_response_head().await {
                Ok(head) => head,
                Err(e) => {
                    let kind = e.kind();
                    let _ = reply.send(Err(e));
                    return Err(Error::new(kind));
                }
            };
            self.respond(head, method, reply).await
        })
    }

    async fn respond(
        &mut self,
        head: ResponseHead,
        method: Method,
        reply: oneshot::Sender<Result<Response<Incoming>, Error>>,
    ) -> Result<bool, Error> {
        let body_mode = framing_mode(&head, &method);
        // A body with no content-length or chunked framing only ends when
        // the peer closes the socket, so the connection can't be reused
        // afterward no matter what the `Connection` header claimed.
        let keep_alive = head.keep_alive && body_mode != BodyMode::UntilClose;

        let (body_tx, incoming) = match body_mode {
            BodyMode::None => (None, Incoming::empty()),
            _ => {
                let (tx, rx) = Incoming::channel(BODY_CHANNEL_CAPACITY);
                (Some(tx), rx)
            }
        };

        let mut response = Response::new(incoming);
        *response.status_mut() = head.status;
        *response.version_mut() = head.version;
        *response.headers_mut() = head.headers;

        let caller_gone = reply.send(Ok(response)).is_err();

        if let Some(tx) = body_tx {
            self.stream_body(body_mode, tx, caller_gone).await?;
        }

        Ok(keep_alive)
    }

    async fn write_request(&mut self, req: Request<B>) -> Result<(), Error> {
        let (parts, mut body) = req.into_parts();

        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());

        let mut head = format!("{} {} HTTP/1.1\r\n", parts.method, path);

        let has_host = parts.headers.contains_key(http::header::HOST);
        if !has_host {
            if let Some(authority) = parts.uri.authority() {
                head.push_str("host: ");
                head.push_str(authority.as_str());
                head.push_str("\r\n");
            }
        }

        let size_hint = body.size_hint();
        let use_chunked = !parts.headers.contains_key(http::header::CONTENT_LENGTH)
            && !parts.headers.contains_key(http::header::TRANSFER_ENCODING)
            && size_hint.exact().is_none()
            && !body.is_end_stream();

        for (name, value) in parts.headers.iter() {
            head.push_str(name.as_str());
            head.push_str(": ");
            head.push_str(value.to_str().unwrap_or(""));
            head.push_str("\r\n");
        }
        if use_chunked {
            head.push_str("transfer-encoding: chunked\r\n");
        } else if !parts.headers.contains_key(http::header::CONTENT_LENGTH) {
            let len = size_hint.exact().unwrap_or(0);
            head.push_str(&format!("content-length: {}\r\n", len));
        }
        head.push_str("\r\n");

        self.io_write_all(head.as_bytes()).await?;

        let mut pinned = Pin::new(&mut body);
        while let Some(chunk) = futures_util::future::poll_fn(|cx| pinned.as_mut().poll_data(cx)).await {
            let chunk = chunk?;
            if use_chunked {
                self.io_write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                    .await?;
                self.io_write_all(&chunk).await?;
                self.io_write_all(b"\r\n").await?;
            } else {
                self.io_write_all(&chunk).await?;
            }
        }
        if use_chunked {
            self.io_write_all(b"0\r\n\r\n").await?;
        }
        self.io_flush().await?;
        Ok(())
    }

    async fn read_response_head(&mut self) -> Result<ResponseHead, Error> {
        loop {
            {
                let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                let mut parsed = httparse::Response::new(&mut raw_headers);
                match parsed
                    .parse(&self.read_buf)
                    .map_err(Error::protocol)?
                {
                    httparse::Status::Complete(consumed) => {
                        let status = StatusCode::from_u16(parsed.code.unwrap_or(200))
                            .map_err(Error::protocol)?;
                        let version = if parsed.version == Some(1) {
                            Version::HTTP_11
                        } else {
                            Version::HTTP_10
                        };

                        let mut headers = HeaderMap::with_capacity(parsed.headers.len());
                        let mut keep_alive = version == Version::HTTP_11;
                        for h in parsed.headers.iter() {
                            let name = http::header::HeaderName::from_bytes(h.name.as_bytes())
                                .map_err(Error::protocol)?;
                            let value = http::header::HeaderValue::from_bytes(h.value)
                                .map_err(Error::protocol)?;
                            if name == http::header::CONNECTION {
                                if headers::connection_keep_alive(&value) {
                                    keep_alive = true;
                                } else if headers::connection_close(&value) {
                                    keep_alive = false;
                                }
                            }
                            headers.append(name, value);
                        }

                        self.read_buf.advance(consumed);
                        return Ok(ResponseHead {
                            status,
                            version,
                            headers,
                            keep_alive,
                        });
                    }
                    httparse::Status::Partial => {
                        if self.read_buf.len() >= MAX_HEAD_SIZE {
                            return Err(Error::protocol_msg("response head too large"));
                        }
                    }
                }
            }

            let mut chunk = [0u8; 4096];
            let n = self.io_read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::protocol_msg("connection closed before response head"));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn stream_body(
        &mut self,
        mode: BodyMode,
        tx: mpsc::Sender<Result<Bytes, Error>>,
        caller_gone: bool,
    ) -> Result<(), Error> {
        let result = self.stream_body_inner(mode, &tx, caller_gone).await;
        // A mid-body failure must reach the caller through the body stream
        // itself, not just tear the background driver down silently: a
        // caller reading `Incoming` would otherwise see a clean `None` and
        // believe the response ended normally instead of being truncated.
        if let Err(ref e) = result {
            if !caller_gone {
                let _ = tx.send(Err(Error::protocol(e.to_string()))).await;
            }
        }
        result
    }

    async fn stream_body_inner(
        &mut self,
        mode: BodyMode,
        tx: &mpsc::Sender<Result<Bytes, Error>>,
        caller_gone: bool,
    ) -> Result<(), Error> {
        match mode {
            BodyMode::None => {}
            BodyMode::ContentLength(mut remaining) => {
                while remaining > 0 {
                    let chunk = self.read_some(remaining as usize).await?;
                    if chunk.is_empty() {
                        return Err(Error::protocol_msg("connection closed before content-length body completed"));
                    }
                    remaining -= chunk.len() as u64;
                    if !caller_gone {
                        let _ = tx.send(Ok(chunk)).await;
                    }
                }
            }
            BodyMode::Chunked => {
                loop {
                    let size = self.read_chunk_size().await?;
                    if size == 0 {
                        self.read_trailers().await?;
                        break;
                    }
                    let mut remaining = size;
                    while remaining > 0 {
                        let chunk = self.read_some(remaining as usize).await?;
                        if chunk.is_empty() {
                            return Err(Error::protocol_msg("connection closed mid-chunk"));
                        }
                        remaining -= chunk.len() as u64;
                        if !caller_gone {
                            let _ = tx.send(Ok(chunk)).await;
                        }
                    }
                    self.read_crlf().await?;
                }
            }
            BodyMode::UntilClose => loop {
                let chunk = self.read_some(8192).await?;
                if chunk.is_empty() {
                    break;
                }
                if !caller_gone {
                    let _ = tx.send(Ok(chunk)).await;
                }
            },
        }
        Ok(())
    }

    /// Reads up to `max` bytes of body, first draining anything already
    /// buffered from the head read, then pulling more off the socket.
    /// Returns an empty `Bytes` only at EOF (used by `UntilClose`).
    async fn read_some(&mut self, max: usize) -> Result<Bytes, Error> {
        if self.read_buf.is_empty() {
            let mut chunk = vec![0u8; max.min(8192)];
            let n = self.io_read(&mut chunk).await?;
            chunk.truncate(n);
            return Ok(Bytes::from(chunk));
        }
        let take = self.read_buf.len().min(max);
        Ok(self.read_buf.split_to(take).freeze())
    }

    async fn read_chunk_size(&mut self) -> Result<u64, Error> {
        let line = self.read_line().await?;
        let size_str = line.split(';').next().unwrap_or("").trim();
        u64::from_str_radix(size_str, 16).map_err(|_| Error::protocol_msg("invalid chunk size"))
    }

    async fn read_crlf(&mut self) -> Result<(), Error> {
        let line = self.read_line().await?;
        if !line.is_empty() {
            return Err(Error::protocol_msg("expected CRLF after chunk data"));
        }
        Ok(())
    }

    async fn read_trailers(&mut self) -> Result<(), Error> {
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                return Ok(());
            }
        }
    }

    async fn read_line(&mut self) -> Result<String, Error> {
        loop {
            if let Some(pos) = find_crlf(&self.read_buf) {
                let line = self.read_buf.split_to(pos).freeze();
                self.read_buf.advance(2); // the CRLF itself
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            let mut chunk = [0u8; 1024];
            let n = self.io_read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::protocol_msg("connection closed mid-chunk"));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl<T, B> Connection<T, B>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: HttpBody<Data = Bytes, Error = Error> + Unpin + Send + 'static,
{
    async fn io_read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        with_timeout(self.io_timeouts.read, self.io.read(buf), Error::read_timeout).await
    }

    async fn io_write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        with_timeout(self.io_timeouts.write, self.io.write_all(buf), Error::write_timeout).await
    }

    async fn io_flush(&mut self) -> Result<(), Error> {
        with_timeout(self.io_timeouts.write, self.io.flush(), Error::write_timeout).await
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

struct ResponseHead {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    keep_alive: bool,
}

fn framing_mode(head: &ResponseHead, method: &Method) -> BodyMode {
    let status = head.status.as_u16();
    if *method == Method::HEAD || (100..200).contains(&status) || status == 204 || status == 304 {
        return BodyMode::None;
    }
    if headers::transfer_encoding_is_chunked(&head.headers) {
        return BodyMode::Chunked;
    }
    if let Some(len) = headers::content_length_parse_all(&head.headers) {
        return if len == 0 {
            BodyMode::None
        } else {
            BodyMode::ContentLength(len)
        };
    }
    BodyMode::UntilClose
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_mode_prefers_chunked_over_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(http::header::CONTENT_LENGTH, "10".parse().unwrap());
        let head = ResponseHead {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers,
            keep_alive: true,
        };
        assert!(matches!(
            framing_mode(&head, &Method::GET),
            BodyMode::Chunked
        ));
    }

    #[test]
    fn head_request_never_has_a_body() {
        let head = ResponseHead {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            keep_alive: true,
        };
        assert!(matches!(framing_mode(&head, &Method::HEAD), BodyMode::None));
    }

    #[test]
    fn no_framing_header_means_read_until_close() {
        let head = ResponseHead {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            keep_alive: true,
        };
        assert!(matches!(
            framing_mode(&head, &Method::GET),
            BodyMode::UntilClose
        ));
    }
}
