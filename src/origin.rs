//! The `Origin` key connections are pooled by.

use std::fmt;

use http::uri::{Scheme as HttpScheme, Uri};

use crate::error::Error;

/// The URI scheme a connection is opened for.
///
/// Only plain-text and TLS are distinguished; anything else is rejected
/// before a connection is ever attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `http://`
    Http,
    /// `https://`
    Https,
}

impl Scheme {
    /// The scheme's default port, used when a `Uri` doesn't carry one.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    /// Whether this scheme requires a TLS handshake after connecting.
    pub fn is_secure(self) -> bool {
        matches!(self, Scheme::Https)
    }
}

/// A connection's pool key: scheme, host, and port.
///
/// Two requests share a connection only if their origins are equal.
/// Equality and hashing are derived directly from the fields, so `Origin`
/// never looks at path, query, userinfo, or the original request's textual
/// form of the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Origin {
    /// Builds an origin directly from its parts.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Origin {
        Origin {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Extracts the origin a request would be routed to.
    ///
    /// Fails if the URI has no authority, or carries a scheme other than
    /// `http`/`https`.
    pub fn from_uri(uri: &Uri) -> Result<Origin, Error> {
        let scheme = match uri.scheme() {
            Some(s) if *s == HttpScheme::HTTP => Scheme::Http,
            Some(s) if *s == HttpScheme::HTTPS => Scheme::Https,
            _ => return Err(Error::protocol_msg("unsupported or missing URI scheme")),
        };
        let authority = uri
            .authority()
            .ok_or_else(|| Error::protocol_msg("URI has no authority"))?;
        let port = authority
            .port_u16()
            .unwrap_or_else(|| scheme.default_port());
        Ok(Origin::new(scheme, authority.host(), port))
    }

    /// The scheme this origin was opened for.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The hostname, without port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, defaulted from the scheme if the original URI omitted it.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}
