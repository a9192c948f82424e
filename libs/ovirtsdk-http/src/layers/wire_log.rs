use bytes::Bytes;
use http::header::{AUTHORIZATION, COOKIE, HeaderMap, PROXY_AUTHORIZATION, SET_COOKIE};
use http::{Request, Response};
use http_body::Body as _;
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tracing target for wire-level events.
pub const WIRE_LOG_TARGET: &str = "ovirtsdk_http::wire";

/// Tower layer that logs each exchange as `DEBUG` events on [`WIRE_LOG_TARGET`].
///
/// Logged: method, URI, request headers, request body length, response status
/// and headers, elapsed time. Credential-bearing header values are replaced
/// with `[REDACTED]`. Bodies are never logged.
#[derive(Clone, Debug, Default)]
pub struct WireLogLayer;

impl WireLogLayer {
    /// Create a new wire logging layer
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for WireLogLayer {
    type Service = WireLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WireLogService { inner }
    }
}

/// Service that logs request/response metadata
#[derive(Clone, Debug)]
pub struct WireLogService<S> {
    inner: S,
}

impl<S, ResBody> Service<Request<Full<Bytes>>> for WireLogService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let body_len = req.body().size_hint().exact().unwrap_or_default();

        tracing::debug!(
            target: WIRE_LOG_TARGET,
            %method,
            %uri,
            headers = %render_headers(req.headers()),
            body_len,
            "request"
        );

        // Call the instance that was poll_ready'd, leaving a fresh clone for
        // the next poll_ready cycle.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let started = std::time::Instant::now();
            let result = inner.call(req).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match &result {
                Ok(response) => tracing::debug!(
                    target: WIRE_LOG_TARGET,
                    %method,
                    %uri,
                    status = response.status().as_u16(),
                    headers = %render_headers(response.headers()),
                    elapsed_ms,
                    "response"
                ),
                Err(e) => tracing::debug!(
                    target: WIRE_LOG_TARGET,
                    %method,
                    %uri,
                    error = %e,
                    elapsed_ms,
                    "exchange failed"
                ),
            }

            result
        })
    }
}

fn is_sensitive(name: &http::HeaderName) -> bool {
    name == AUTHORIZATION || name == PROXY_AUTHORIZATION || name == COOKIE || name == SET_COOKIE
}

/// Render headers as `name: value` lines with credentials redacted.
fn render_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(name.as_str());
        out.push_str(": ");
        if is_sensitive(name) || value.is_sensitive() {
            out.push_str("[REDACTED]");
        } else {
            out.push_str(value.to_str().unwrap_or("<binary>"));
        }
    }
    out
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_credentials_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(COOKIE, HeaderValue::from_static("JSESSIONID=xyz"));
        headers.insert("version", HeaderValue::from_static("4"));

        let rendered = render_headers(&headers);
        assert!(!rendered.contains("abc123"));
        assert!(!rendered.contains("xyz"));
        assert!(rendered.contains("authorization: [REDACTED]"));
        assert!(rendered.contains("version: 4"));
    }

    #[test]
    fn test_sensitive_flag_honoured() {
        let mut value = HeaderValue::from_static("secret-value");
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", value);

        assert_eq!(render_headers(&headers), "x-api-key: [REDACTED]");
    }
}
