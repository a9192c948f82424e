//! Bearer token cache with single-flight acquisition.
//!
//! State machine:
//!
//! ```text
//! Empty ──ensure──► Pending ──ok──► Ready ──expired / invalidate──► Empty
//! Pending ──err──► Empty
//! (any) ──revoke──► Revoked
//! ```
//!
//! Every acquisition gets a generation number. Waiters on one flight share
//! its result, and [`TokenManager::invalidate`] only clears the cache when
//! the caller saw the generation that is currently cached, so a burst of
//! 401s on one stale token triggers a single re-authentication.

use super::Credentials;
use super::sso::{Grant, SsoClient};
use super::token::AccessToken;
use crate::error::{AuthError, Error};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use http::header::HeaderValue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

type Flight = Shared<BoxFuture<'static, Result<Arc<AccessToken>, Error>>>;

enum Slot {
    Empty,
    Pending { generation: u64, flight: Flight },
    Ready { generation: u64, token: Arc<AccessToken> },
    Revoked,
}

enum Strategy {
    Sso(SsoClient),
    Static(Arc<AccessToken>),
    Basic(HeaderValue),
}

/// `Authorization` value for one dispatch.
pub struct Credential {
    pub header: HeaderValue,
    /// Generation to pass to [`TokenManager::invalidate`] after a 401;
    /// `None` when the credentials cannot be refreshed.
    pub generation: Option<u64>,
}

pub struct TokenManager {
    strategy: Strategy,
    margin: Duration,
    slot: Mutex<Slot>,
    next_generation: AtomicU64,
}

impl TokenManager {
    /// `sso` builds the SSO client for credentials that need one.
    pub fn new(
        credentials: Credentials,
        margin: Duration,
        sso: impl FnOnce(Grant) -> SsoClient,
    ) -> Self {
        let strategy = match credentials {
            Credentials::Password { username, password } => {
                Strategy::Sso(sso(Grant::Password { username, password }))
            }
            Credentials::Kerberos(provider) => {
                Strategy::Sso(sso(Grant::Kerberos(provider)))
            }
            Credentials::Token(token) => Strategy::Static(Arc::new(token)),
            Credentials::Basic(header) => Strategy::Basic(header),
        };
        Self {
            strategy,
            margin,
            slot: Mutex::new(Slot::Empty),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Current bearer token, authenticating first if none is cached or the
    /// cached one is known to be expired.
    pub async fn token(&self) -> Result<Arc<AccessToken>, Error> {
        self.ensure().await.map(|(token, _)| token)
    }

    /// `Authorization` header for the next business request.
    pub async fn credential(&self) -> Result<Credential, Error> {
        if let Strategy::Basic(header) = &self.strategy {
            self.check_open()?;
            return Ok(Credential {
                header: header.clone(),
                generation: None,
            });
        }
        let (token, generation) = self.ensure().await?;
        Ok(Credential {
            header: token.authorization().clone(),
            generation,
        })
    }

    async fn ensure(&self) -> Result<(Arc<AccessToken>, Option<u64>), Error> {
        let sso = match &self.strategy {
            Strategy::Sso(sso) => sso,
            Strategy::Static(token) => {
                self.check_open()?;
                return Ok((Arc::clone(token), None));
            }
            Strategy::Basic(_) => return Err(AuthError::NoToken("basic").into()),
        };

        let (generation, flight) = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Revoked => return Err(Error::ConnectionClosed),
                Slot::Ready { generation, token } if !token.is_expired(self.margin) => {
                    tracing::debug!(generation, "reusing cached SSO token");
                    return Ok((Arc::clone(token), Some(*generation)));
                }
                Slot::Pending { generation, flight } => {
                    tracing::debug!(generation, "waiting for in-flight SSO authentication");
                    (*generation, flight.clone())
                }
                Slot::Empty | Slot::Ready { .. } => {
                    let generation = self.bump_generation();
                    let sso = sso.clone();
                    let flight: Flight = async move { sso.request_token().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    tracing::debug!(generation, "starting SSO authentication");
                    *slot = Slot::Pending {
                        generation,
                        flight: flight.clone(),
                    };
                    (generation, flight)
                }
            }
        };

        let result = flight.await;

        {
            let mut slot = self.slot.lock();
            if matches!(&*slot, Slot::Pending { generation: pending, .. } if *pending == generation)
            {
                *slot = match &result {
                    Ok(token) => {
                        if token.lifetime().is_some_and(|lifetime| lifetime / 2 < self.margin) {
                            tracing::debug!(
                                generation,
                                lifetime = ?token.lifetime(),
                                margin = ?self.margin,
                                "SSO token lifetime is short; expiry margin capped at half of it"
                            );
                        }
                        Slot::Ready {
                            generation,
                            token: Arc::clone(token),
                        }
                    }
                    Err(e) => {
                        tracing::debug!(generation, error = %e, "SSO authentication failed");
                        Slot::Empty
                    }
                };
            }
        }

        result.map(|token| (token, Some(generation)))
    }

    /// Drop the cached token if it is still the one issued as `generation`.
    pub fn invalidate(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if matches!(&*slot, Slot::Ready { generation: cached, .. } if *cached == generation) {
            tracing::debug!(generation, "invalidating SSO token");
            *slot = Slot::Empty;
        }
    }

    /// Enter the terminal state and revoke an SSO-issued token.
    ///
    /// Caller-supplied tokens and basic credentials are never revoked.
    pub async fn revoke(&self) {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Revoked);
        let Strategy::Sso(sso) = &self.strategy else {
            return;
        };
        match previous {
            Slot::Ready { token, .. } => sso.revoke(&token).await,
            Slot::Pending { generation, .. } => {
                tracing::debug!(generation, "discarding in-flight SSO authentication");
            }
            Slot::Empty | Slot::Revoked => {}
        }
    }

    fn check_open(&self) -> Result<(), Error> {
        match *self.slot.lock() {
            Slot::Revoked => Err(Error::ConnectionClosed),
            _ => Ok(()),
        }
    }

    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use ovirtsdk_http::{HttpClient, HttpClientBuilder, HttpClientConfig, SecretString};

    fn http() -> HttpClient {
        HttpClientBuilder::with_config(HttpClientConfig::for_testing())
            .build()
            .unwrap()
    }

    fn password_manager(server: &MockServer, margin: Duration) -> TokenManager {
        let token_url = server.url("/ovirt-engine/sso/oauth/token");
        let revoke_url = server.url("/ovirt-engine/services/sso-logout");
        TokenManager::new(
            Credentials::Password {
                username: "admin@internal".to_owned(),
                password: SecretString::new("redhat123"),
            },
            margin,
            move |grant: Grant| SsoClient::new(http(), token_url, revoke_url, grant),
        )
    }

    #[tokio::test]
    async fn test_token_cached_after_first_exchange() {
        let server = MockServer::start();
        let sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "T1", "token_type": "bearer"}));
        });

        let manager = password_manager(&server, Duration::from_secs(30));
        assert_eq!(manager.token().await.unwrap().expose(), "T1");
        assert_eq!(manager.token().await.unwrap().expose(), "T1");
        sso.assert_calls(1);
    }

    #[tokio::test]
    async fn test_invalidate_only_matching_generation() {
        let server = MockServer::start();
        let sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "T1"}));
        });

        let manager = password_manager(&server, Duration::from_secs(30));
        let first = manager.credential().await.unwrap();
        let stale = first.generation.unwrap();

        manager.invalidate(stale);
        let second = manager.credential().await.unwrap();
        assert_ne!(second.generation, first.generation);

        // A late 401 carrying the old generation must not drop the new token
        manager.invalidate(stale);
        let third = manager.credential().await.unwrap();
        assert_eq!(third.generation, second.generation);
        sso.assert_calls(2);
    }

    #[tokio::test]
    async fn test_failed_exchange_is_not_cached() {
        let server = MockServer::start();
        let sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(401).json_body(serde_json::json!({
                "error": "access_denied",
                "error_description": "Cannot authenticate user"
            }));
        });

        let manager = password_manager(&server, Duration::from_secs(30));
        for _ in 0..2 {
            let err = manager.token().await.unwrap_err();
            assert!(matches!(err, Error::Auth(AuthError::Sso { .. })), "got {err:?}");
        }
        sso.assert_calls(2);
    }

    #[tokio::test]
    async fn test_expired_token_reacquired() {
        let server = MockServer::start();
        let sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "T1", "expires_in": 0}));
        });

        let manager = password_manager(&server, Duration::ZERO);
        manager.token().await.unwrap();
        manager.token().await.unwrap();
        sso.assert_calls(2);
    }

    #[tokio::test]
    async fn test_short_lived_token_still_cached() {
        let server = MockServer::start();
        let sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "T1", "expires_in": 20}));
        });

        let manager = password_manager(&server, Duration::from_secs(30));
        manager.token().await.unwrap();
        manager.token().await.unwrap();
        sso.assert_calls(1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_exchange() {
        let server = MockServer::start();
        let sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .delay(Duration::from_millis(200))
                .json_body(serde_json::json!({"access_token": "T1"}));
        });

        let manager = Arc::new(password_manager(&server, Duration::from_secs(30)));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.credential().await.map(|c| c.generation) })
            })
            .collect();

        let mut generations = Vec::new();
        for task in tasks {
            generations.push(task.await.unwrap().unwrap());
        }
        assert!(generations.windows(2).all(|pair| pair[0] == pair[1]));
        sso.assert_calls(1);
    }

    #[tokio::test]
    async fn test_revoke_sends_cached_token_once() {
        let server = MockServer::start();
        let _sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "T1"}));
        });
        let logout = server.mock(|when, then| {
            when.method(POST)
                .path("/ovirt-engine/services/sso-logout")
                .body_includes("token=T1");
            then.status(200).body("{}");
        });

        let manager = password_manager(&server, Duration::from_secs(30));
        manager.token().await.unwrap();
        manager.revoke().await;
        manager.revoke().await;
        logout.assert_calls(1);

        assert!(matches!(manager.token().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_revoke_failure_is_swallowed() {
        let server = MockServer::start();
        let _sso = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/sso/oauth/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "T1"}));
        });
        let logout = server.mock(|when, then| {
            when.method(POST).path("/ovirt-engine/services/sso-logout");
            then.status(500);
        });

        let manager = password_manager(&server, Duration::from_secs(30));
        manager.token().await.unwrap();
        manager.revoke().await;
        logout.assert_calls(1);
    }

    #[tokio::test]
    async fn test_static_token_is_not_refreshable() {
        let manager = TokenManager::new(
            Credentials::Token(AccessToken::from_static("abc").unwrap()),
            Duration::from_secs(30),
            |_| unreachable!("static tokens need no SSO client"),
        );
        let credential = manager.credential().await.unwrap();
        assert_eq!(credential.header, "Bearer abc");
        assert_eq!(credential.generation, None);

        manager.revoke().await;
        assert!(matches!(
            manager.credential().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_basic_credentials_have_no_token() {
        let manager = TokenManager::new(
            Credentials::Basic(HeaderValue::from_static("Basic YTpi")),
            Duration::from_secs(30),
            |_| unreachable!("basic credentials need no SSO client"),
        );
        assert_eq!(manager.credential().await.unwrap().header, "Basic YTpi");
        assert!(matches!(
            manager.token().await,
            Err(Error::Auth(AuthError::NoToken("basic")))
        ));
    }
}
