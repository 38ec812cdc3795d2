//! Opens the raw transport for an origin: DNS, TCP connect, and for
//! `https` origins, the TLS handshake and ALPN negotiation that decides
//! which protocol engine drives the connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::config::SslConfig;
use crate::error::Error;
use crate::origin::{Origin, Scheme};

/// Which protocol engine should drive a freshly opened connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Protocol {
    Http1,
    Http2,
}

/// Either a plain TCP stream or a TLS stream wrapping one.
///
/// A single enum rather than a trait object, so the hot path (read/write)
/// is a match, not a vtable call.
pub(crate) enum TransportStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Resolves `origin`'s host, connects a TCP socket, and for `https`
/// performs the TLS handshake, returning the stream plus the protocol
/// ALPN settled on.
///
/// Plain-text origins are always driven as HTTP/1.1: this crate has no
/// h2c (HTTP/2 over cleartext) support, matching spec's non-goals around
/// protocol upgrade negotiation outside of ALPN.
pub(crate) async fn connect(
    origin: &Origin,
    ssl: Option<&SslConfig>,
    connect_timeout: Option<Duration>,
) -> Result<(TransportStream, Protocol), Error> {
    let fut = connect_inner(origin, ssl);
    match connect_timeout {
        None => fut.await,
        Some(dur) => tokio::time::timeout(dur, fut)
            .await
            .map_err(|_| Error::connect_timeout())?,
    }
}

async fn connect_inner(
    origin: &Origin,
    ssl: Option<&SslConfig>,
) -> Result<(TransportStream, Protocol), Error> {
    let addr = format!("{}:{}", origin.host(), origin.port());
    let mut last_err = None;
    let mut stream = None;
    for addr in tokio::net::lookup_host(&addr)
        .await
        .map_err(Error::network)?
    {
        match TcpStream::connect(addr).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let tcp = stream.ok_or_else(|| {
        Error::network(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no addresses resolved")))
    })?;
    tcp.set_nodelay(true).map_err(Error::network)?;

    if origin.scheme() != Scheme::Https {
        return Ok((TransportStream::Plain(tcp), Protocol::Http1));
    }

    let ssl = ssl.ok_or_else(|| Error::protocol_msg("https origin requires an SslConfig"))?;
    let server_name = rustls::ServerName::try_from(origin.host())
        .map_err(|_| Error::protocol_msg("invalid DNS name for TLS SNI"))?;
    let tls = ssl
        .connector
        .connect(server_name, tcp)
        .await
        .map_err(Error::network)?;

    let protocol = match tls.get_ref().1.alpn_protocol() {
        Some(proto) if proto == b"h2" => Protocol::Http2,
        _ => Protocol::Http1,
    };

    Ok((TransportStream::Tls(Box::new(tls)), protocol))
}
