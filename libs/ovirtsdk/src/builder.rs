use crate::auth::NegotiateProvider;
use crate::config::{AuthMode, ConnectionConfig, MediaType, TrustStore};
use crate::connection::Connection;
use crate::error::Error;
use ovirtsdk_http::{ProxyConfig, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fluent construction of a [`Connection`].
///
/// Nothing is checked until [`build()`](Self::build).
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    #[must_use]
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// API entry point, e.g. `https://engine.example.com/ovirt-engine/api`
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(SecretString::new(password));
        self
    }

    /// Authenticate with Kerberos through `provider`
    #[must_use]
    pub fn kerberos(mut self, provider: Arc<dyn NegotiateProvider>) -> Self {
        self.config.kerberos = Some(provider);
        self
    }

    /// Use an externally obtained bearer token
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(SecretString::new(token));
        self
    }

    #[must_use]
    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.config.auth = auth;
        self
    }

    /// Trust the CA certificates in a PEM file
    #[must_use]
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_file = Some(path.into());
        self
    }

    /// Trust a PEM-encoded CA certificate. May be called repeatedly.
    #[must_use]
    pub fn ca_cert(mut self, pem: impl Into<String>) -> Self {
        self.config.ca_certs.push(pem.into());
        self
    }

    /// Disable TLS certificate verification
    #[must_use]
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.config.insecure = insecure;
        self
    }

    /// Roots used when no CA material is given
    #[must_use]
    pub fn trust_store(mut self, trust_store: TrustStore) -> Self {
        self.config.trust_store = trust_store;
        self
    }

    /// Enable wire logging
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn compress(mut self, compress: bool) -> Self {
        self.config.compress = compress;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    #[must_use]
    pub fn sso_url(mut self, url: impl Into<String>) -> Self {
        self.config.sso_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn sso_revoke_url(mut self, url: impl Into<String>) -> Self {
        self.config.sso_revoke_url = Some(url.into());
        self
    }

    /// Add a header sent with every business request
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.config.media_type = media_type;
        self
    }

    /// Treat tokens expiring within `margin` as already expired
    #[must_use]
    pub fn token_expiry_margin(mut self, margin: Duration) -> Self {
        self.config.token_expiry_margin = margin;
        self
    }

    /// The configuration collected so far
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Validate the options and create the connection.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for invalid or contradictory options.
    pub fn build(self) -> Result<Connection, Error> {
        Connection::new(&self.config)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_options() {
        let builder = Connection::builder()
            .url("https://engine.example.com/ovirt-engine/api")
            .username("admin@internal")
            .password("redhat123")
            .ca_cert("-----BEGIN CERTIFICATE-----")
            .ca_cert("-----BEGIN CERTIFICATE-----")
            .header("X-Request-Source", "inventory")
            .compress(true)
            .media_type(MediaType::Json)
            .timeout(Duration::from_secs(5));

        let config = builder.config();
        assert_eq!(config.username.as_deref(), Some("admin@internal"));
        assert_eq!(config.password.as_ref().map(SecretString::expose), Some("redhat123"));
        assert_eq!(config.ca_certs.len(), 2);
        assert_eq!(config.headers.len(), 1);
        assert!(config.compress);
        assert_eq!(config.media_type, MediaType::Json);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_build_validates() {
        let err = Connection::builder()
            .url("https://engine.example.com/ovirt-engine/api")
            .token("abc")
            .insecure(true)
            .ca_file("/etc/pki/ovirt-engine/ca.pem")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let connection = Connection::builder()
            .url("https://engine.example.com/ovirt-engine/api/v4")
            .token("abc")
            .build()
            .unwrap();
        assert!(!connection.is_closed());
    }
}
