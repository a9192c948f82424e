use crate::client::SharedService;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::Request;
use http::header::{HeaderName, HeaderValue};
use http_body_util::Full;
use tower::ServiceExt;

/// Body type for the request builder
#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Form(Bytes),
}

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::request`](crate::HttpClient::request) and the
/// per-method shortcuts. Header errors are deferred to [`send()`](Self::send).
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: SharedService,
    max_body_size: usize,
    method: http::Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: BodyKind,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
    transport_security: TransportSecurity,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: SharedService,
        max_body_size: usize,
        method: http::Method,
        url: String,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            max_body_size,
            method,
            url,
            headers: Vec::new(),
            body: BodyKind::Empty,
            error: None,
            transport_security,
        }
    }

    /// Add a single header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Add an already-validated header (e.g. a sensitive `Authorization` value)
    pub fn header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Add multiple already-validated headers, preserving order and duplicates
    pub fn headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (HeaderName, HeaderValue)>,
    {
        self.headers.extend(headers);
        self
    }

    /// Set request body as form URL-encoded
    /// (`Content-Type: application/x-www-form-urlencoded` unless set)
    ///
    /// # Errors
    ///
    /// Returns `Err(HttpError::FormEncode)` if encoding fails.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let form_string = serde_urlencoded::to_string(fields)?;
        self.body = BodyKind::Form(Bytes::from(form_string));
        Ok(self)
    }

    /// Set request body as raw bytes
    pub fn body_bytes(mut self, body: Bytes) -> Self {
        self.body = BodyKind::Bytes(body);
        self
    }

    /// Validate URL and scheme against transport security configuration.
    fn validate_url(&self) -> Result<http::Uri, HttpError> {
        let uri: http::Uri =
            self.url
                .parse()
                .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                    url: self.url.clone(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(uri),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    /// Send the request and return the response
    ///
    /// Every HTTP status, including 4xx/5xx, is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - Request building failed (invalid headers, URL, etc.)
    /// - URL scheme is invalid for the transport security mode
    /// - The client was closed before the request started
    /// - Network/TLS/timeout error
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let uri = self.validate_url()?;

        let mut builder = Request::builder().method(self.method).uri(uri);

        let has_content_type = self
            .headers
            .iter()
            .any(|(name, _)| name == http::header::CONTENT_TYPE);
        if !has_content_type && matches!(self.body, BodyKind::Form(_)) {
            builder = builder.header(
                http::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            );
        }

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        let body_bytes = match self.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) | BodyKind::Form(b) => b,
        };

        let request = builder.body(Full::new(body_bytes))?;

        // Only the handle is captured; closing the client after this point
        // lets the exchange finish on its own clone of the stack.
        let service = self.service.load_full().ok_or(HttpError::Closed)?;
        let inner = service.as_ref().clone().oneshot(request).await?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}
