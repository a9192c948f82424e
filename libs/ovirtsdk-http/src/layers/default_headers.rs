use crate::error::HttpError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that adds a fixed set of headers to all requests.
///
/// A header already present on the request is left untouched, so per-request
/// values win over defaults.
#[derive(Clone, Debug, Default)]
pub struct DefaultHeadersLayer {
    headers: HeaderMap,
}

impl DefaultHeadersLayer {
    /// Create a layer from a User-Agent and extra `(name, value)` pairs.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` / `InvalidHeaderValue` if any
    /// pair is not a valid header.
    pub fn try_new(user_agent: &str, extra: &[(String, String)]) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::USER_AGENT, HeaderValue::from_str(user_agent)?);
        for (name, value) in extra {
            let name = HeaderName::try_from(name.as_str())?;
            let value = HeaderValue::try_from(value.as_str())?;
            headers.append(name, value);
        }
        Ok(Self { headers })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service that adds default headers to requests
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for name in self.headers.keys() {
            if req.headers().contains_key(name) {
                continue;
            }
            for value in self.headers.get_all(name) {
                req.headers_mut().append(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
