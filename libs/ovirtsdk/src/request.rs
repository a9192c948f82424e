use bytes::Bytes;
use http::Method;
use http::header::{HeaderName, HeaderValue};

/// A logical API request, relative to the connection's base URL.
///
/// Query and matrix parameters keep insertion order and may repeat.
///
/// ```ignore
/// let request = Request::get("vms")
///     .query("search", "name=web*")
///     .query("max", "10");
/// let response = connection.send(&request).await?;
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    matrix: Vec<(String, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            matrix: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append a matrix parameter (`;name=value` after the path).
    pub fn matrix(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.matrix.push((name.into(), value.into()));
        self
    }

    /// Append a header. `Authorization` is always set by the connection and
    /// is ignored here.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Set the body, already encoded in the connection's media type.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn matrix_params(&self) -> &[(String, String)] {
        &self.matrix
    }

    #[must_use]
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    #[must_use]
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}
