use crate::fault::Fault;
use ovirtsdk_http::{HttpError, TransportErrorKind};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`Connection`](crate::Connection) and the service tree.
///
/// `Clone` so that every task waiting on one shared token exchange receives
/// the same failure.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Construction options are missing, malformed or contradictory.
    /// Never reaches the network.
    #[error("invalid connection configuration: {0}")]
    Config(String),

    /// Network-level failure (connect, TLS, timeout, DNS).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The SSO exchange failed, or a request stayed unauthorized after
    /// re-authentication.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request could not be built or its response could not be accepted
    /// (malformed URL or header, body over the size limit). Not a network
    /// failure.
    #[error("request failed: {0}")]
    Request(#[source] Arc<HttpError>),

    /// Non-2xx business response.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// A link handed to [`Connection::follow_link`](crate::Connection::follow_link)
    /// does not point below the API root.
    #[error("link '{0}' is not below the API root")]
    InvalidLink(String),

    /// The connection was closed.
    #[error("connection is closed")]
    ConnectionClosed,
}

impl Error {
    /// Transport failure class, when this is a network-level error.
    ///
    /// Intended for caller-side retry policies; the SDK itself never retries
    /// network failures.
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// The server fault, when this is a business-level failure.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Auth(AuthError::Unauthorized(fault)) => Some(fault.as_ref()),
            _ => None,
        }
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Closed => Self::ConnectionClosed,
            other => match other.transport_kind() {
                Some(kind) => Self::Transport(TransportError {
                    kind,
                    source: Arc::new(other),
                }),
                None => Self::Request(Arc::new(other)),
            },
        }
    }
}

/// A transport failure together with its classification.
#[derive(Clone)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: Arc<HttpError>,
}

impl TransportError {
    /// Failure class for retry decisions.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// The underlying HTTP client error.
    #[must_use]
    pub fn http_error(&self) -> &HttpError {
        &self.source
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportError")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.source)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Authentication failures.
///
/// Variants never carry credentials or token values.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The SSO service answered with an error payload or an error status.
    #[error("error during SSO authentication: {code}: {description}")]
    Sso { code: String, description: String },

    /// The SSO response could not be understood.
    #[error("invalid SSO response: {0}")]
    InvalidResponse(String),

    /// The SSO service issued a token that is not a bearer token.
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),

    /// The Kerberos provider could not produce a negotiation token.
    #[error("Kerberos negotiation failed: {0}")]
    Negotiate(String),

    /// The request was rejected with 401 and re-authentication either did not
    /// help or is not possible for the configured credentials.
    #[error("request not authorized: {0}")]
    Unauthorized(Box<Fault>),

    /// The configured credentials do not use bearer tokens.
    #[error("no bearer token is used with {0} authentication")]
    NoToken(&'static str),
}
