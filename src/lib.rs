#![deny(missing_debug_implementations)]

//! # httpcore
//!
//! `httpcore` is the connection pool and per-connection protocol dispatch
//! layer underneath an HTTP client: given a request, it picks (or opens) a
//! connection for the request's origin, drives the HTTP/1.1 or HTTP/2 wire
//! protocol over it, and returns the connection to a keepalive pool when
//! it's done.
//!
//! ## What's in scope
//!
//! - A bounded pool of connections, keyed by origin (scheme + host + port)
//! - HTTP/1.1 framing (`httparse` + a hand-rolled serializer) and HTTP/2
//!   framing (the [`h2`] crate) behind one connection façade, chosen by
//!   ALPN
//! - Streaming request and response bodies via [`http_body::Body`]
//! - A single [`Error`] type with a `source()` chain back to the
//!   underlying I/O, TLS, or HTTP/2 failure
//!
//! ## What's out of scope
//!
//! URL parsing, redirect/cookie handling, response caching, HTTP/3, proxy
//! tunneling, and building the `rustls` `ClientConfig` itself all live
//! above or beside this crate; it only drives whatever `TlsConnector` it's
//! handed.
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::Request;
//! use httpcore::body::Buffered;
//! use httpcore::client::{ClientTransport, Pool};
//! use httpcore::config::{PoolLimits, TimeoutConfig};
//!
//! # async fn run() -> Result<(), httpcore::Error> {
//! let pool: Pool<Buffered> = Pool::new(PoolLimits::default(), TimeoutConfig::default(), None);
//!
//! let req = Request::builder()
//!     .uri("http://example.com/")
//!     .body(Buffered::new(Bytes::new()))
//!     .unwrap();
//!
//! let response = pool.send(req).await?;
//! assert!(response.status().is_success() || response.status().is_redirection());
//! # Ok(())
//! # }
//! ```

#[doc(no_inline)]
pub use http::{header, HeaderMap, Method, Request, Response, StatusCode, Uri, Version};

pub use crate::error::{Error, Result};
pub use crate::origin::{Origin, Scheme};

pub mod body;
pub mod client;
pub mod config;
mod error;
mod headers;
mod origin;
mod semaphore;
mod store;
mod transport;
