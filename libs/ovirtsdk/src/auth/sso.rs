//! Token exchange with the engine's SSO service.

use super::negotiate::NegotiateProvider;
use super::token::AccessToken;
use crate::error::{AuthError, Error};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::StatusCode;
use http::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use ovirtsdk_http::{HttpClient, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const SCOPE: &str = "ovirt-app-api";
const KERBEROS_GRANT_TYPE: &str = "urn:ovirt:params:oauth:grant-type:http";

fn accept_json() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

/// Credentials exchanged for a bearer token.
#[derive(Clone)]
pub enum Grant {
    Password {
        username: String,
        password: SecretString,
    },
    Kerberos(Arc<dyn NegotiateProvider>),
}

/// Client for the SSO token and revoke endpoints.
#[derive(Clone)]
pub struct SsoClient {
    http: HttpClient,
    token_url: String,
    revoke_url: String,
    grant: Grant,
}

impl SsoClient {
    pub fn new(http: HttpClient, token_url: String, revoke_url: String, grant: Grant) -> Self {
        Self {
            http,
            token_url,
            revoke_url,
            grant,
        }
    }

    /// Perform one authentication exchange.
    pub async fn request_token(&self) -> Result<AccessToken, Error> {
        let builder = self
            .http
            .post(&self.token_url)
            .header_value(ACCEPT, accept_json());

        let builder = match &self.grant {
            Grant::Password { username, password } => {
                tracing::debug!(url = %self.token_url, user = %username, "requesting SSO token");
                builder.form(&[
                    ("grant_type", "password"),
                    ("scope", SCOPE),
                    ("username", username.as_str()),
                    ("password", password.expose()),
                ])?
            }
            Grant::Kerberos(provider) => {
                tracing::debug!(url = %self.token_url, "requesting SSO token with Kerberos");
                let negotiate = provider
                    .initial_token(&self.token_url)
                    .await
                    .map_err(|e| AuthError::Negotiate(e.to_string()))?;
                let mut value =
                    HeaderValue::try_from(format!("Negotiate {}", BASE64.encode(negotiate)))
                        .map_err(|e| AuthError::Negotiate(e.to_string()))?;
                value.set_sensitive(true);
                builder
                    .header_value(AUTHORIZATION, value)
                    .form(&[("grant_type", KERBEROS_GRANT_TYPE), ("scope", SCOPE)])?
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(parse_token_response(status, &body)?)
    }

    /// Best-effort token revocation. Failures are logged, never returned.
    pub async fn revoke(&self, token: &AccessToken) {
        let request = self
            .http
            .post(&self.revoke_url)
            .header_value(ACCEPT, accept_json())
            .form(&[("scope", ""), ("token", token.expose())]);

        let result = match request {
            Ok(request) => request.send().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(response) if response.status().is_success() => {
                let status = response.status();
                match response.bytes().await {
                    Ok(body) => match parse_error(&body) {
                        Some(error) => {
                            tracing::warn!(%status, error = %error, "SSO token revocation rejected");
                        }
                        None => tracing::debug!("SSO token revoked"),
                    },
                    Err(e) => tracing::warn!(error = %e, "reading SSO revoke response failed"),
                }
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "SSO token revocation failed");
            }
            Err(e) => tracing::warn!(error = %e, "SSO token revocation failed"),
        }
    }
}

/// Deserialized SSO response. `Deserialize`-only so the token cannot leak
/// through serialization.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<Seconds>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// `expires_in` arrives as a number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    fn duration(&self) -> Option<Duration> {
        match self {
            Self::Number(secs) => Some(Duration::from_secs(*secs)),
            Self::Text(text) => text.trim().parse().ok().map(Duration::from_secs),
        }
    }
}

/// The SSO service answers single objects, or arrays whose first element is
/// the answer.
fn decode(body: &[u8]) -> Result<TokenResponse, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let value = match value {
        serde_json::Value::Array(items) => items.into_iter().next().unwrap_or_default(),
        other => other,
    };
    serde_json::from_value(value)
}

fn parse_error(body: &[u8]) -> Option<String> {
    let response = decode(body).ok()?;
    let code = response.error?;
    Some(match response.error_description {
        Some(description) => format!("{code}: {description}"),
        None => code,
    })
}

fn status_error(status: StatusCode) -> AuthError {
    AuthError::Sso {
        code: status.as_u16().to_string(),
        description: status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_owned(),
    }
}

pub fn parse_token_response(status: StatusCode, body: &[u8]) -> Result<AccessToken, AuthError> {
    let response = match decode(body) {
        Ok(response) => response,
        Err(_) if !status.is_success() => return Err(status_error(status)),
        Err(e) => return Err(AuthError::InvalidResponse(e.to_string())),
    };

    if let Some(code) = response.error {
        return Err(AuthError::Sso {
            code,
            description: response.error_description.unwrap_or_default(),
        });
    }
    if !status.is_success() {
        return Err(status_error(status));
    }

    let access_token = response
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse("missing access_token".to_owned()))?;

    if let Some(token_type) = response.token_type
        && !token_type.eq_ignore_ascii_case("bearer")
    {
        return Err(AuthError::UnsupportedTokenType(token_type));
    }

    AccessToken::issued(
        &access_token,
        response.expires_in.as_ref().and_then(Seconds::duration),
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_plain_token() {
        let token =
            parse_token_response(StatusCode::OK, br#"{"access_token":"T1","token_type":"bearer"}"#)
                .unwrap();
        assert_eq!(token.expose(), "T1");
        assert!(token.expires_at().is_none());
    }

    #[test]
    fn test_array_response_uses_first_element() {
        let token =
            parse_token_response(StatusCode::OK, br#"[{"access_token":"T1"},{"access_token":"T2"}]"#)
                .unwrap();
        assert_eq!(token.expose(), "T1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_in_number_and_string() {
        let numeric =
            parse_token_response(StatusCode::OK, br#"{"access_token":"T1","expires_in":3600}"#)
                .unwrap();
        let textual =
            parse_token_response(StatusCode::OK, br#"{"access_token":"T1","expires_in":"3600"}"#)
                .unwrap();
        let expected = tokio::time::Instant::now() + Duration::from_secs(3600);
        assert_eq!(numeric.expires_at(), Some(expected));
        assert_eq!(textual.expires_at(), Some(expected));
    }

    #[test]
    fn test_error_payload() {
        let err = parse_token_response(
            StatusCode::BAD_REQUEST,
            br#"{"error":"access_denied","error_description":"Cannot authenticate user 'admin@internal'"}"#,
        )
        .unwrap_err();
        match err {
            AuthError::Sso { code, description } => {
                assert_eq!(code, "access_denied");
                assert_eq!(description, "Cannot authenticate user 'admin@internal'");
            }
            other => panic!("expected SSO error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_payload_with_success_status() {
        let err = parse_token_response(StatusCode::OK, br#"{"error":"invalid_grant"}"#).unwrap_err();
        assert!(matches!(err, AuthError::Sso { ref code, .. } if code == "invalid_grant"));
    }

    #[test]
    fn test_error_status_without_payload() {
        let err =
            parse_token_response(StatusCode::SERVICE_UNAVAILABLE, b"<html>down</html>").unwrap_err();
        match err {
            AuthError::Sso { code, description } => {
                assert_eq!(code, "503");
                assert_eq!(description, "Service Unavailable");
            }
            other => panic!("expected SSO error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_access_token() {
        let err = parse_token_response(StatusCode::OK, br#"{"token_type":"bearer"}"#).unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(ref m) if m.contains("access_token")));

        let err = parse_token_response(StatusCode::OK, b"not json").unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    #[test]
    fn test_non_bearer_token_rejected() {
        let err = parse_token_response(
            StatusCode::OK,
            br#"{"access_token":"T1","token_type":"mac"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedTokenType(ref t) if t == "mac"));
    }

    #[test]
    fn test_parse_error_for_revocation() {
        assert_eq!(
            parse_error(br#"{"error":"server_error","error_description":"boom"}"#).as_deref(),
            Some("server_error: boom")
        );
        assert_eq!(parse_error(b"{}"), None);
        assert_eq!(parse_error(b""), None);
    }
}
