use crate::client::{HttpClient, InnerService};
use crate::config::{CaSource, HttpClientConfig, ProxyConfig, TlsTrust, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{DefaultHeadersLayer, WireLogLayer};
use crate::proxy::ProxyConnector;
use crate::response::ResponseBody;
use crate::tls;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Builder for constructing an [`HttpClient`] with a layered tower middleware stack.
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Configuration the client will be built from
    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the TCP connect timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Set the certificate trust strategy
    #[must_use]
    pub fn tls(mut self, trust: TlsTrust) -> Self {
        self.config.tls = trust;
        self
    }

    /// Trust the CA certificates in a PEM file.
    ///
    /// Switches the trust strategy to [`TlsTrust::Custom`], keeping CA sources
    /// added earlier.
    #[must_use]
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.push_ca(CaSource::File(path.into()));
        self
    }

    /// Trust the CA certificates in a PEM buffer.
    #[must_use]
    pub fn ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.push_ca(CaSource::Pem(pem.into()));
        self
    }

    fn push_ca(&mut self, source: CaSource) {
        match &mut self.config.tls {
            TlsTrust::Custom(sources) => sources.push(source),
            other => *other = TlsTrust::Custom(vec![source]),
        }
    }

    /// Route connections through an HTTP `CONNECT` proxy
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    /// Advertise gzip and transparently decompress responses
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Log request/response metadata on the wire target
    #[must_use]
    pub fn wire_log(mut self, enabled: bool) -> Self {
        self.config.wire_log = enabled;
        self
    }

    /// Add a header sent with every request
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Set the idle connection timeout for the connection pool
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Build the HTTP client with all configured layers
    ///
    /// # Errors
    /// Returns an error if the TLS context cannot be built (unreadable or
    /// malformed CA material), the proxy URL is invalid, or a default header
    /// is not a valid header.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "plain HTTP allowed (TransportSecurity::AllowInsecureHttp); \
                 traffic to http:// URLs is not encrypted"
            );
        }

        let tls_config = tls::client_config(&self.config.tls)?;
        let headers =
            DefaultHeadersLayer::try_new(&self.config.user_agent, &self.config.default_headers)?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(self.config.connect_timeout);

        let service = match &self.config.proxy {
            None => {
                let https = https_connector(tls_config, self.config.transport, http);
                service_stack(&self.config, https, headers)
            }
            Some(proxy) => {
                let tunnel = ProxyConnector::new(proxy, http)?;
                let https = https_connector(tls_config, self.config.transport, tunnel);
                service_stack(&self.config, https, headers)
            }
        };

        Ok(HttpClient {
            service: Arc::new(ArcSwapOption::from_pointee(service)),
            max_body_size: self.config.max_body_size,
            transport_security: self.config.transport,
        })
    }
}

// =======================================================================
// Tower Layer Stack (outer to inner)
// =======================================================================
//
//   Timeout → DefaultHeaders → Decompression → [WireLog?] → hyper_client
//
//   - send() returns Ok(Response) for ALL HTTP statuses (including 4xx/5xx)
//   - send() returns Err only for transport/timeout/TLS errors
//   - nothing in the stack retries or follows redirects
//
// =======================================================================
fn service_stack<C>(
    config: &HttpClientConfig,
    connector: C,
    headers: DefaultHeadersLayer,
) -> InnerService
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let mut client_builder = Client::builder(TokioExecutor::new());

    // pool_timer is required for pool_idle_timeout to take effect
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host);
    if let Some(idle_timeout) = config.pool_idle_timeout {
        client_builder.pool_idle_timeout(idle_timeout);
    }

    let hyper_client = client_builder.build::<_, Full<Bytes>>(connector);

    let timeout = config.request_timeout;
    let decompression = DecompressionLayer::new().gzip(config.compression);

    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(headers)
        .layer(decompression)
        .option_layer(config.wire_log.then(WireLogLayer::new))
        .service(hyper_client)
        .map_response(map_decompression_response)
        .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

    BoxCloneSyncService::new(service)
}

fn https_connector<C>(
    tls_config: rustls::ClientConfig,
    transport: TransportSecurity,
    connector: C,
) -> HttpsConnector<C> {
    let builder = HttpsConnectorBuilder::new().with_tls_config(tls_config);
    if transport == TransportSecurity::AllowInsecureHttp {
        builder
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(connector)
    } else {
        builder
            .https_only()
            .enable_all_versions()
            .wrap_connector(connector)
    }
}

/// Map tower errors to `HttpError` with the actual timeout duration
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the (possibly decompressed) body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}
