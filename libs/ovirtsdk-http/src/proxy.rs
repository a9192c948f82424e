//! HTTP `CONNECT` proxy connector.

use crate::config::ProxyConfig;
use crate::error::HttpError;
use crate::secret::SecretString;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::Uri;
use http::header::HeaderValue;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::proxy::Tunnel;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use zeroize::Zeroizing;

type ConnectFuture<T> = Pin<Box<dyn Future<Output = Result<T, tower::BoxError>> + Send>>;

/// Connector that opens a `CONNECT` tunnel through the configured proxy for
/// every new connection. TLS to the destination runs inside the tunnel.
#[derive(Clone, Debug)]
pub struct ProxyConnector {
    http: HttpConnector,
    proxy: Uri,
    auth: Option<HeaderValue>,
}

impl ProxyConnector {
    pub(crate) fn new(config: &ProxyConfig, http: HttpConnector) -> Result<Self, HttpError> {
        let proxy: Uri = config
            .url
            .parse()
            .map_err(|e| HttpError::Config(format!("invalid proxy URL '{}': {e}", config.url)))?;
        if proxy.host().is_none() {
            return Err(HttpError::Config(format!(
                "invalid proxy URL '{}': missing host",
                config.url
            )));
        }

        let auth = match &config.username {
            Some(username) => Some(basic_auth(
                username,
                config.password.as_ref().map_or("", SecretString::expose),
            )?),
            None => None,
        };

        Ok(Self { http, proxy, auth })
    }
}

fn basic_auth(username: &str, password: &str) -> Result<HeaderValue, HttpError> {
    let credentials = Zeroizing::new(format!("{username}:{password}"));
    let encoded = Zeroizing::new(BASE64.encode(credentials.as_bytes()));
    let mut value = HeaderValue::try_from(format!("Basic {}", &*encoded))?;
    value.set_sensitive(true);
    Ok(value)
}

impl Service<Uri> for ProxyConnector {
    type Response = <HttpConnector as Service<Uri>>::Response;
    type Error = tower::BoxError;
    type Future = ConnectFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let mut tunnel = Tunnel::new(self.proxy.clone(), self.http.clone());
        if let Some(auth) = &self.auth {
            tunnel = tunnel.with_auth(auth.clone());
        }
        Box::pin(async move { tunnel.oneshot(dst).await.map_err(Into::into) })
    }
}
