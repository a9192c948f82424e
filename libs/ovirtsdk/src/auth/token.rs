use crate::error::AuthError;
use http::header::HeaderValue;
use ovirtsdk_http::SecretString;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Bearer token plus expiry metadata.
///
/// The raw value is only reachable through [`expose()`](Self::expose);
/// `Debug` prints `[REDACTED]`.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    authorization: HeaderValue,
    lifetime: Option<Duration>,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// Token issued by the SSO service, valid for `lifetime` if known.
    pub(crate) fn issued(value: &str, lifetime: Option<Duration>) -> Result<Self, AuthError> {
        let authorization = bearer(value).ok_or_else(|| {
            AuthError::InvalidResponse("access token is not a valid header value".to_owned())
        })?;
        Ok(Self {
            value: SecretString::new(value),
            authorization,
            lifetime,
            expires_at: lifetime.and_then(|lifetime| Instant::now().checked_add(lifetime)),
        })
    }

    /// Caller-supplied token that never expires from the SDK's point of view.
    ///
    /// `None` if the value cannot be carried in a header.
    pub(crate) fn from_static(value: &str) -> Option<Self> {
        Some(Self {
            value: SecretString::new(value),
            authorization: bearer(value)?,
            lifetime: None,
            expires_at: None,
        })
    }

    /// The raw bearer token.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose()
    }

    /// When the token stops being valid, if the SSO service said so.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Lifetime announced by the SSO service.
    #[must_use]
    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Whether the token expires within `margin` from now.
    ///
    /// The margin is capped at half the token's lifetime, so short-lived
    /// tokens are still reused for a while.
    #[must_use]
    pub fn is_expired(&self, margin: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let margin = self
            .lifetime
            .map_or(margin, |lifetime| margin.min(lifetime / 2));
        Instant::now()
            .checked_add(margin)
            .is_none_or(|deadline| deadline >= expires_at)
    }

    pub(crate) fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }
}

fn bearer(value: &str) -> Option<HeaderValue> {
    let mut authorization = HeaderValue::try_from(format!("Bearer {value}")).ok()?;
    authorization.set_sensitive(true);
    Some(authorization)
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_static_token_never_expires() {
        let token = AccessToken::from_static("abc").unwrap();
        assert_eq!(token.expose(), "abc");
        assert!(token.expires_at().is_none());
        assert!(!token.is_expired(Duration::from_secs(3600)));
        assert_eq!(token.authorization(), "Bearer abc");
        assert!(token.authorization().is_sensitive());
    }

    #[test]
    fn test_header_breaking_token_rejected() {
        assert!(AccessToken::from_static("abc\r\nX-Injected: 1").is_none());
        assert!(matches!(
            AccessToken::issued("abc\n", None),
            Err(AuthError::InvalidResponse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_respects_margin() {
        let token = AccessToken::issued("abc", Some(Duration::from_secs(120))).unwrap();
        assert!(!token.is_expired(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(token.is_expired(Duration::from_secs(30)));
        assert!(!token.is_expired(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_margin_capped_at_half_lifetime() {
        let token = AccessToken::issued("abc", Some(Duration::from_secs(60))).unwrap();
        assert!(!token.is_expired(Duration::from_secs(300)));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(token.is_expired(Duration::from_secs(300)));
    }

    #[test]
    fn test_huge_margin_does_not_overflow() {
        let token = AccessToken::issued("abc", Some(Duration::from_secs(3600))).unwrap();
        assert!(!token.is_expired(Duration::MAX));

        let unbounded = AccessToken {
            lifetime: None,
            ..token
        };
        assert!(unbounded.is_expired(Duration::MAX));
    }

    #[test]
    fn test_zero_lifetime_is_expired() {
        let token = AccessToken::issued("abc", Some(Duration::ZERO)).unwrap();
        assert!(token.is_expired(Duration::ZERO));
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = AccessToken::from_static("super-secret").unwrap();
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
