//! Turns a [`Request`] plus credentials into one wire exchange.

use crate::config::MediaType;
use crate::error::Error;
use crate::fault::Fault;
use crate::request::Request;
use crate::response::Response;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use ovirtsdk_http::HttpClient;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::form_urlencoded;

/// Everything but RFC 3986 unreserved characters, so `;`, `=` and spaces in
/// matrix parameters cannot break the path segment.
const MATRIX_PARAM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const VERSION_HEADER: HeaderName = HeaderName::from_static("version");
const API_VERSION: &str = "4";

/// Stateless request builder and sender.
///
/// Header order on the wire: `Version`, `Accept`, `Content-Type` (with a
/// body), configured headers, request headers, `Authorization`.
pub struct Dispatcher {
    http: HttpClient,
    base_url: String,
    base_path: String,
    media_type: MediaType,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Dispatcher {
    pub fn new(
        http: HttpClient,
        base_url: String,
        base_path: String,
        media_type: MediaType,
        headers: Vec<(HeaderName, HeaderValue)>,
    ) -> Self {
        Self {
            http,
            base_url,
            base_path,
            media_type,
            headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Path of an absolute or server-relative `href` below the API root.
    ///
    /// `https://host/ovirt-engine/api/vms/1` and `/ovirt-engine/api/vms/1`
    /// both map to `/vms/1`; anything outside the root is `None`.
    pub fn relative_path<'a>(&self, href: &'a str) -> Option<&'a str> {
        let rest = href
            .strip_prefix(self.base_url.as_str())
            .or_else(|| href.strip_prefix('/').and(href.strip_prefix(self.base_path.as_str())))?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    /// Absolute URL: base, path, `;matrix` parameters, then the query.
    pub fn url_for(&self, request: &Request) -> String {
        let mut url = self.base_url.clone();
        let path = request.path().trim_start_matches('/');
        if !path.is_empty() {
            url.push('/');
            url.push_str(path);
        }
        for (name, value) in request.matrix_params() {
            url.push(';');
            url.extend(utf8_percent_encode(name, MATRIX_PARAM));
            url.push('=');
            url.extend(utf8_percent_encode(value, MATRIX_PARAM));
        }
        if !request.query_params().is_empty() {
            url.push('?');
            url.push_str(
                &form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(request.query_params())
                    .finish(),
            );
        }
        url
    }

    /// Send `request` with `authorization` and read the whole response.
    ///
    /// Every status comes back as `Ok`; classification is up to the caller.
    pub async fn execute(
        &self,
        request: &Request,
        authorization: &HeaderValue,
    ) -> Result<Response, Error> {
        let url = self.url_for(request);
        let media_type = HeaderValue::from_static(self.media_type.as_str());
        let overrides = |name: &HeaderName| request.headers().iter().any(|(n, _)| n == name);

        let mut builder = self
            .http
            .request(request.method().clone(), &url)
            .header_value(VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        if !overrides(&ACCEPT) {
            builder = builder.header_value(ACCEPT, media_type.clone());
        }
        if request.body_bytes().is_some() && !overrides(&CONTENT_TYPE) {
            builder = builder.header_value(CONTENT_TYPE, media_type);
        }
        builder = builder
            .headers(self.headers.iter().cloned())
            .headers(
                request
                    .headers()
                    .iter()
                    .filter(|(name, _)| *name != AUTHORIZATION)
                    .cloned(),
            )
            .header_value(AUTHORIZATION, authorization.clone());
        if let Some(body) = request.body_bytes() {
            builder = builder.body_bytes(body.clone());
        }

        tracing::debug!(method = %request.method(), url = %url, "dispatching request");
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        tracing::debug!(%status, body_len = body.len(), "response received");
        Ok(Response::new(status, headers, body))
    }
}

/// 2xx passes through; anything else becomes a [`Fault`].
pub fn check_status(response: Response) -> Result<Response, Error> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Fault::from_response(&response).into())
    }
}
