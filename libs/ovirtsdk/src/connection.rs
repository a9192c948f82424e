use crate::auth::{AccessToken, SsoClient, TokenManager};
use crate::builder::ConnectionBuilder;
use crate::config::{ConnectionConfig, Settings};
use crate::dispatcher::{Dispatcher, check_status};
use crate::error::{AuthError, Error};
use crate::fault::Fault;
use crate::request::Request;
use crate::response::Response;
use crate::services::{EntityService, SystemService};
use http::StatusCode;
use ovirtsdk_http::HttpClient;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct Inner {
    http: HttpClient,
    dispatcher: Dispatcher,
    tokens: TokenManager,
    closed: AtomicBool,
}

/// Entry point to the engine API.
///
/// Cheap to clone; clones share the connection pool, the token cache and the
/// closed flag. Authentication is lazy: the first call that needs a token
/// performs the SSO exchange.
///
/// ```ignore
/// let connection = Connection::builder()
///     .url("https://engine.example.com/ovirt-engine/api")
///     .username("admin@internal")
///     .password("secret")
///     .ca_file("/etc/pki/ovirt-engine/ca.pem")
///     .build()?;
///
/// let vms = connection
///     .system_service()
///     .vms()
///     .list(&ListOptions { search: Some("status=up".into()), ..Default::default() })
///     .await?;
///
/// connection.close().await;
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Validate `config` and set up the transport. No network I/O happens here.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid or contradictory options,
    /// including unreadable or malformed CA material.
    pub fn new(config: &ConnectionConfig) -> Result<Self, Error> {
        let Settings {
            base_url,
            base_path,
            credentials,
            sso_token_url,
            sso_revoke_url,
            headers,
            media_type,
            token_expiry_margin,
            transport,
        } = config.validate()?;

        let http = transport
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP transport: {e}")))?;

        let tokens = TokenManager::new(credentials, token_expiry_margin, |grant| {
            SsoClient::new(http.clone(), sso_token_url, sso_revoke_url, grant)
        });
        tracing::debug!(url = %base_url, "connection created");
        let dispatcher = Dispatcher::new(http.clone(), base_url, base_path, media_type, headers);

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                dispatcher,
                tokens,
                closed: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Obtain a bearer token now instead of on the first request.
    ///
    /// Returns the cached token when one is valid.
    ///
    /// # Errors
    /// [`Error::Auth`] when the SSO service rejects the credentials,
    /// [`Error::Transport`] when it cannot be reached,
    /// [`Error::ConnectionClosed`] after [`close()`](Self::close).
    pub async fn authenticate(&self) -> Result<AccessToken, Error> {
        self.ensure_open()?;
        let token = self.inner.tokens.token().await?;
        Ok(AccessToken::clone(&token))
    }

    /// Send `request` and return its 2xx response.
    ///
    /// A 401 on a refreshable token invalidates it and retries exactly once
    /// with a fresh one.
    ///
    /// # Errors
    /// [`Error::Fault`] for other non-2xx responses, [`AuthError::Unauthorized`]
    /// when the retry is rejected too (or the credentials cannot be refreshed),
    /// [`Error::Transport`] for network failures (never retried).
    pub async fn send(&self, request: &Request) -> Result<Response, Error> {
        self.ensure_open()?;
        let credential = self.inner.tokens.credential().await?;
        let response = self
            .inner
            .dispatcher
            .execute(request, &credential.header)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response);
        }

        let Some(generation) = credential.generation else {
            return Err(unauthorized(&response));
        };
        tracing::debug!(
            generation,
            path = request.path(),
            "request unauthorized; re-authenticating once"
        );
        self.inner.tokens.invalidate(generation);

        self.ensure_open()?;
        let credential = self.inner.tokens.credential().await?;
        let response = self
            .inner
            .dispatcher
            .execute(request, &credential.header)
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(unauthorized(&response));
        }
        check_status(response)
    }

    /// GET the API root.
    ///
    /// # Errors
    /// Whatever [`send`](Self::send) returns.
    pub async fn test(&self) -> Result<(), Error> {
        self.send(&Request::get("")).await.map(drop)
    }

    /// GET the resource an `href` attribute points to.
    ///
    /// # Errors
    /// [`Error::InvalidLink`] when `href` is not below the API root, otherwise
    /// whatever [`send`](Self::send) returns.
    pub async fn follow_link(&self, href: &str) -> Result<Response, Error> {
        let path = self
            .inner
            .dispatcher
            .relative_path(href)
            .ok_or_else(|| Error::InvalidLink(href.to_owned()))?;
        self.send(&Request::get(path)).await
    }

    /// Root of the resource service tree.
    #[must_use]
    pub fn system_service(&self) -> SystemService {
        SystemService::new(self.clone())
    }

    /// Generic service for `path`, relative to the API root.
    #[must_use]
    pub fn service(&self, path: &str) -> EntityService {
        EntityService::new(self.clone(), path.trim_matches('/'))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Revoke the SSO token and release the transport.
    ///
    /// Idempotent. Requests already in flight finish normally; every call
    /// started afterwards fails with [`Error::ConnectionClosed`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.tokens.revoke().await;
        self.inner.http.close();
        tracing::info!(url = %self.inner.dispatcher.base_url(), "connection closed");
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

fn unauthorized(response: &Response) -> Error {
    AuthError::Unauthorized(Box::new(Fault::from_response(response))).into()
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.dispatcher.base_url())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use ovirtsdk_http::SecretString;

    fn token_connection(url: &str) -> Connection {
        Connection::new(&ConnectionConfig {
            url: url.to_owned(),
            token: Some(SecretString::new("T1")),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_config_fails_without_io() {
        let err = Connection::new(&ConnectionConfig {
            url: "https://engine.example.com/ovirt-engine/api".to_owned(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_ca_is_config_error() {
        let err = Connection::new(&ConnectionConfig {
            url: "https://engine.example.com/ovirt-engine/api".to_owned(),
            token: Some(SecretString::new("T1")),
            ca_certs: vec!["not a certificate".to_owned()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("transport")), "{err:?}");
    }

    #[tokio::test]
    async fn test_static_token_401_is_not_retried() {
        let server = MockServer::start();
        let api = server.mock(|when, then| {
            when.method(GET).path("/ovirt-engine/api/vms");
            then.status(401)
                .header("content-type", "application/xml")
                .body("<fault><reason>Unauthorized</reason></fault>");
        });

        let connection = token_connection(&server.url("/ovirt-engine/api"));
        let err = connection.send(&Request::get("vms")).await.unwrap_err();
        match err {
            Error::Auth(AuthError::Unauthorized(fault)) => {
                assert_eq!(fault.status(), StatusCode::UNAUTHORIZED);
                assert_eq!(fault.reason(), Some("Unauthorized"));
            }
            other => panic!("expected unauthorized, got {other:?}"),
        }
        api.assert_calls(1);
    }

    #[tokio::test]
    async fn test_403_is_a_fault_without_retry() {
        let server = MockServer::start();
        let api = server.mock(|when, then| {
            when.method(GET).path("/ovirt-engine/api/hosts");
            then.status(403);
        });

        let connection = token_connection(&server.url("/ovirt-engine/api"));
        let err = connection.send(&Request::get("hosts")).await.unwrap_err();
        assert_eq!(err.fault().map(Fault::status), Some(StatusCode::FORBIDDEN));
        api.assert_calls(1);
    }

    #[tokio::test]
    async fn test_clones_share_closed_state() {
        let connection = token_connection("https://engine.example.com/ovirt-engine/api");
        let clone = connection.clone();
        connection.close().await;
        assert!(clone.is_closed());
        assert!(matches!(
            clone.send(&Request::get("")).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            clone.authenticate().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_follow_link_outside_root() {
        let connection = token_connection("https://engine.example.com/ovirt-engine/api");
        let err = connection.follow_link("/somewhere/else").await.unwrap_err();
        assert!(matches!(err, Error::InvalidLink(ref href) if href == "/somewhere/else"));
    }

    #[test]
    fn test_debug_shows_url_only() {
        let connection = token_connection("https://engine.example.com/ovirt-engine/api");
        let rendered = format!("{connection:?}");
        assert!(rendered.contains("engine.example.com"));
        assert!(!rendered.contains("T1"));
    }
}
