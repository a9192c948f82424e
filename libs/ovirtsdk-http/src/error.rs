use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Network-level failure classes a caller-supplied retry policy can match on.
///
/// The transport itself never retries; it only preserves the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// The peer actively refused the TCP connection
    ConnectRefused,
    /// TLS negotiation or certificate verification failed
    TlsHandshake,
    /// Connect or request timeout elapsed
    Timeout,
    /// Host name resolution failed
    Dns,
    /// Any other I/O or protocol failure
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConnectRefused => "connection refused",
            Self::TlsHandshake => "TLS handshake failure",
            Self::Timeout => "timeout",
            Self::Dns => "DNS failure",
            Self::Other => "transport failure",
        };
        f.write_str(s)
    }
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request timed out
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn StdError + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is a
    /// diagnostic message for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// Client configuration rejected at build time (CA material, proxy, headers)
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// The client was closed; no new requests are accepted
    #[error("HTTP client is closed")]
    Closed,
}

impl HttpError {
    /// Network-level failure class, or `None` for local errors
    /// (request building, body limits, decoding, closed client).
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Timeout(_) => Some(TransportErrorKind::Timeout),
            Self::Tls(_) => Some(TransportErrorKind::TlsHandshake),
            Self::Transport(source) => Some(classify(source.as_ref())),
            _ => None,
        }
    }
}

/// Walk the source chain looking for a recognizable root cause.
///
/// `io::Error::source()` skips the wrapped error itself, so custom io errors
/// are descended through `get_ref()` instead.
fn classify(err: &(dyn StdError + 'static)) -> TransportErrorKind {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<rustls::Error>() {
            return TransportErrorKind::TlsHandshake;
        }
        if e.to_string().starts_with("dns error") {
            return TransportErrorKind::Dns;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return TransportErrorKind::ConnectRefused;
                }
                std::io::ErrorKind::TimedOut => return TransportErrorKind::Timeout,
                _ => {}
            }
            if let Some(inner) = io.get_ref() {
                let inner: &(dyn StdError + 'static) = inner;
                current = Some(inner);
                continue;
            }
        }
        current = e.source();
    }
    TransportErrorKind::Other
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
