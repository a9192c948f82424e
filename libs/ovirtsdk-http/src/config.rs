use crate::secret::SecretString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("ovirtsdk-http/", env!("CARGO_PKG_VERSION"));

/// A source of trusted CA certificates in PEM format.
#[derive(Clone)]
pub enum CaSource {
    /// PEM file on disk, read when the client is built
    File(PathBuf),
    /// PEM bytes held in memory
    Pem(Vec<u8>),
}

impl fmt::Debug for CaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Pem(bytes) => write!(f, "Pem({} bytes)", bytes.len()),
        }
    }
}

/// How the client decides which server certificates to trust.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub enum TlsTrust {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// OS native root certificate store
    Native,
    /// Only the given CA certificates
    Custom(Vec<CaSource>),
    /// Skip certificate verification entirely
    ///
    /// **WARNING**: exposes traffic to interception. Meant for lab engines
    /// with self-signed certificates.
    Insecure,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows plain HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections
    AllowInsecureHttp,
}

/// Upstream HTTP proxy reached with `CONNECT` tunnelling.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy URL, e.g. `http://proxy.example.com:3128`
    pub url: String,
    /// Optional user name for `Proxy-Authorization: Basic`
    pub username: Option<String>,
    /// Optional password for `Proxy-Authorization: Basic`
    pub password: Option<SecretString>,
}

impl ProxyConfig {
    /// Proxy without credentials
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout (default: 30 seconds)
    pub request_timeout: Duration,

    /// TCP connect timeout (default: none, bounded by `request_timeout`)
    pub connect_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 64 MB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// Certificate trust strategy (default: `WebPki`)
    pub tls: TlsTrust,

    /// Upstream proxy (default: direct connections)
    pub proxy: Option<ProxyConfig>,

    /// Advertise `Accept-Encoding: gzip` and decompress responses (default: false)
    pub compression: bool,

    /// Emit request/response metadata as `DEBUG` events on the
    /// `ovirtsdk_http::wire` target (default: false)
    pub wire_log: bool,

    /// Headers added to every request unless the request sets them itself
    pub default_headers: Vec<(String, String)>,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: None,
            max_body_size: 64 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls: TlsTrust::default(),
            proxy: None,
            compression: false,
            wire_log: false,
            default_headers: Vec::new(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Configuration for tests against local mock servers (plain HTTP allowed)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::default()
        }
    }
}
