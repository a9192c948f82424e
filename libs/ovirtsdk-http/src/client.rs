use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use http_body_util::Full;
use std::sync::Arc;
use tower::util::BoxCloneSyncService;

/// Type-erased middleware stack around the pooled hyper client.
pub type InnerService =
    BoxCloneSyncService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

/// Handle shared by every clone of a client; `None` once closed.
pub type SharedService = Arc<ArcSwapOption<InnerService>>;

/// HTTP client with a tower middleware stack and a shared connection pool.
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`. Clones share one connection pool and
/// one closed state; no external locking is needed.
///
/// # Closing
///
/// [`close()`](Self::close) drops the shared stack, which releases pooled
/// sockets once in-flight exchanges finish. Requests sent afterwards fail
/// with [`HttpError::Closed`].
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: SharedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("closed", &self.is_closed())
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create a request builder for an arbitrary method.
    ///
    /// The URL must be absolute. Query strings are composed by the caller.
    pub fn request(&self, method: http::Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            Arc::clone(&self.service),
            self.max_body_size,
            method,
            url.to_owned(),
            self.transport_security,
        )
    }

    /// Create a GET request builder
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::GET, url)
    }

    /// Create a POST request builder
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::POST, url)
    }

    /// Create a PUT request builder
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::PUT, url)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::DELETE, url)
    }

    /// Release the connection pool. Idempotent.
    ///
    /// Returns `true` if this call performed the close.
    pub fn close(&self) -> bool {
        let closed_now = self.service.swap(None).is_some();
        if closed_now {
            tracing::debug!("HTTP client closed");
        }
        closed_now
    }

    /// Whether [`close()`](Self::close) has been called on any clone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.service.load().is_none()
    }
}
