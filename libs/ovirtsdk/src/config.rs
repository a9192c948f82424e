use crate::auth::{AccessToken, Credentials, NegotiateProvider};
use crate::error::Error;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use ovirtsdk_http::{
    CaSource, HttpClientBuilder, ProxyConfig, SecretString, TlsTrust, TransportSecurity,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// User agent sent by the connection.
pub const DEFAULT_USER_AGENT: &str = concat!("ovirtsdk/", env!("CARGO_PKG_VERSION"));

/// Engine operations such as storage domain creation can take minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Tokens this close to their expiry are treated as expired.
pub const DEFAULT_TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Largest accepted `token_expiry_margin`.
pub const MAX_TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(3600);

const SSO_TOKEN_PATH: &str = "/ovirt-engine/sso/oauth/token";
const SSO_KERBEROS_TOKEN_PATH: &str = "/ovirt-engine/sso/oauth/token-http-auth";
const SSO_REVOKE_PATH: &str = "/ovirt-engine/services/sso-logout";

/// How credentials are presented to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// Exchange credentials for a bearer token at the SSO service.
    #[default]
    Sso,
    /// Send `Authorization: Basic` with every request; no SSO exchange.
    Basic,
}

/// Root certificates used when no CA material is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustStore {
    /// Mozilla roots compiled into the SDK.
    #[default]
    Bundled,
    /// The operating system's CA store.
    System,
}

/// Representation negotiated for business request and response bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaType {
    #[default]
    Xml,
    Json,
}

impl MediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
        }
    }
}

/// Connection options.
///
/// Build it directly with `..Default::default()` or through
/// [`Connection::builder()`](crate::Connection::builder). Validation happens in
/// [`Connection::new`](crate::Connection::new), before any network I/O.
///
/// Exactly one credential strategy must be set: `username` + `password`,
/// `kerberos`, or `token`.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// API entry point, e.g. `https://engine.example.com/ovirt-engine/api`.
    /// A trailing `/v4` is accepted and stripped.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Kerberos/SPNEGO credential strategy.
    pub kerberos: Option<Arc<dyn NegotiateProvider>>,
    /// Externally obtained bearer token. Used as-is and never refreshed.
    pub token: Option<SecretString>,
    pub auth: AuthMode,
    /// PEM file with trusted CA certificates.
    pub ca_file: Option<PathBuf>,
    /// PEM-encoded trusted CA certificates.
    pub ca_certs: Vec<String>,
    /// Skip TLS certificate verification. Conflicts with `ca_file`/`ca_certs`.
    pub insecure: bool,
    /// Roots to verify against. [`TrustStore::System`] conflicts with
    /// `insecure`, `ca_file` and `ca_certs`.
    pub trust_store: TrustStore,
    /// Log request and response metadata on the `ovirtsdk_http::wire` target.
    pub debug: bool,
    /// Ask for gzip-compressed responses.
    pub compress: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
    /// Overrides the SSO token endpoint.
    pub sso_url: Option<String>,
    /// Overrides the SSO revoke endpoint.
    pub sso_revoke_url: Option<String>,
    /// Extra headers sent with every business request.
    pub headers: Vec<(String, String)>,
    pub media_type: MediaType,
    pub token_expiry_margin: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            password: None,
            kerberos: None,
            token: None,
            auth: AuthMode::Sso,
            ca_file: None,
            ca_certs: Vec::new(),
            insecure: false,
            trust_store: TrustStore::Bundled,
            debug: false,
            compress: false,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: None,
            proxy: None,
            sso_url: None,
            sso_revoke_url: None,
            headers: Vec::new(),
            media_type: MediaType::Xml,
            token_expiry_margin: DEFAULT_TOKEN_EXPIRY_MARGIN,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password)
            .field("kerberos", &self.kerberos.is_some())
            .field("token", &self.token)
            .field("auth", &self.auth)
            .field("ca_file", &self.ca_file)
            .field("ca_certs", &self.ca_certs.len())
            .field("insecure", &self.insecure)
            .field("trust_store", &self.trust_store)
            .field("debug", &self.debug)
            .field("compress", &self.compress)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("proxy", &self.proxy)
            .field("sso_url", &self.sso_url)
            .field("sso_revoke_url", &self.sso_revoke_url)
            .field("headers", &header_names)
            .field("media_type", &self.media_type)
            .field("token_expiry_margin", &self.token_expiry_margin)
            .finish()
    }
}

/// Validated, normalized form of [`ConnectionConfig`].
pub struct Settings {
    /// Base URL without trailing slash, e.g. `https://host/ovirt-engine/api`.
    pub base_url: String,
    /// Path part of `base_url`, e.g. `/ovirt-engine/api`.
    pub base_path: String,
    pub credentials: Credentials,
    pub sso_token_url: String,
    pub sso_revoke_url: String,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub media_type: MediaType,
    pub token_expiry_margin: Duration,
    pub transport: HttpClientBuilder,
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Config(message.into())
}

impl ConnectionConfig {
    /// Check every option and derive the runtime settings.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first offending option.
    pub(crate) fn validate(&self) -> Result<Settings, Error> {
        let url = normalize_url(&self.url)?;
        let credentials = self.credentials()?;

        if self.insecure && (self.ca_file.is_some() || !self.ca_certs.is_empty()) {
            return Err(invalid(
                "'insecure' cannot be combined with 'ca_file' or 'ca_certs'",
            ));
        }
        if self.trust_store == TrustStore::System
            && (self.insecure || self.ca_file.is_some() || !self.ca_certs.is_empty())
        {
            return Err(invalid(
                "'trust_store' System cannot be combined with 'insecure', 'ca_file' or 'ca_certs'",
            ));
        }
        if self.token_expiry_margin > MAX_TOKEN_EXPIRY_MARGIN {
            return Err(invalid(format!(
                "'token_expiry_margin' must not exceed {}s",
                MAX_TOKEN_EXPIRY_MARGIN.as_secs()
            )));
        }
        if self.timeout.is_zero() {
            return Err(invalid("'timeout' must be greater than zero"));
        }

        let headers = self
            .headers
            .iter()
            .map(|(name, value)| parse_header(name, value))
            .collect::<Result<Vec<_>, _>>()?;

        let default_token_path = match &credentials {
            Credentials::Kerberos(_) => SSO_KERBEROS_TOKEN_PATH,
            _ => SSO_TOKEN_PATH,
        };
        let sso_token_url = endpoint(&url, self.sso_url.as_deref(), default_token_path, "sso_url")?;
        let sso_revoke_url = endpoint(
            &url,
            self.sso_revoke_url.as_deref(),
            SSO_REVOKE_PATH,
            "sso_revoke_url",
        )?;

        let base_path = url.path().trim_end_matches('/').to_owned();
        let base_url = url.as_str().trim_end_matches('/').to_owned();
        let transport = self.transport(&url);

        Ok(Settings {
            base_url,
            base_path,
            credentials,
            sso_token_url,
            sso_revoke_url,
            headers,
            media_type: self.media_type,
            token_expiry_margin: self.token_expiry_margin,
            transport,
        })
    }

    fn credentials(&self) -> Result<Credentials, Error> {
        let password_grant = match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                if username.is_empty() {
                    return Err(invalid("'username' must not be empty"));
                }
                Some((username, password))
            }
            (None, None) => None,
            (Some(_), None) => return Err(invalid("'username' requires 'password'")),
            (None, Some(_)) => return Err(invalid("'password' requires 'username'")),
        };

        let strategies = usize::from(password_grant.is_some())
            + usize::from(self.kerberos.is_some())
            + usize::from(self.token.is_some());
        if strategies == 0 {
            return Err(invalid(
                "no credentials: set 'username' and 'password', 'kerberos', or 'token'",
            ));
        }
        if strategies > 1 {
            return Err(invalid(
                "only one of 'username'/'password', 'kerberos' or 'token' may be set",
            ));
        }

        if self.auth == AuthMode::Basic {
            let Some((username, password)) = password_grant else {
                return Err(invalid(
                    "basic authentication requires 'username' and 'password'",
                ));
            };
            return Ok(Credentials::Basic(basic_header(username, password)?));
        }

        if let Some((username, password)) = password_grant {
            return Ok(Credentials::Password {
                username: username.clone(),
                password: password.clone(),
            });
        }
        if let Some(provider) = &self.kerberos {
            return Ok(Credentials::Kerberos(Arc::clone(provider)));
        }
        match &self.token {
            Some(token) => AccessToken::from_static(token.expose())
                .map(Credentials::Token)
                .ok_or_else(|| invalid("'token' is not a valid header value")),
            None => Err(invalid("no credentials configured")),
        }
    }

    fn transport(&self, url: &Url) -> HttpClientBuilder {
        let mut builder = HttpClientBuilder::new()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(self.timeout)
            .compression(self.compress)
            .wire_log(self.debug);

        if url.scheme() == "http" {
            tracing::warn!(url = %url, "plain HTTP connection; credentials are sent unencrypted");
            builder = builder.transport(TransportSecurity::AllowInsecureHttp);
        }

        if self.insecure {
            builder = builder.tls(TlsTrust::Insecure);
        } else if self.trust_store == TrustStore::System {
            builder = builder.tls(TlsTrust::Native);
        } else {
            let mut sources: Vec<CaSource> = Vec::new();
            if let Some(path) = &self.ca_file {
                sources.push(CaSource::File(path.clone()));
            }
            sources.extend(
                self.ca_certs
                    .iter()
                    .map(|pem| CaSource::Pem(pem.as_bytes().to_vec())),
            );
            if !sources.is_empty() {
                builder = builder.tls(TlsTrust::Custom(sources));
            }
        }

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.clone());
        }
        builder
    }
}

/// Parse the API URL, dropping a trailing slash and a bare `/v4` segment.
fn normalize_url(raw: &str) -> Result<Url, Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(invalid("'url' is required"));
    }
    let mut url = Url::parse(raw).map_err(|e| invalid(format!("invalid url '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "unsupported url scheme '{}': use http or https",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(invalid(format!("url '{raw}' has no host")));
    }

    let trimmed = url.path().trim_end_matches('/');
    let path = trimmed.strip_suffix("/v4").unwrap_or(trimmed).to_owned();
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn endpoint(base: &Url, custom: Option<&str>, default_path: &str, option: &str) -> Result<String, Error> {
    let Some(custom) = custom else {
        let mut url = base.clone();
        url.set_path(default_path);
        return Ok(url.into());
    };
    let url =
        Url::parse(custom).map_err(|e| invalid(format!("invalid '{option}' '{custom}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("'{option}' must be an http or https URL")));
    }
    Ok(url.into())
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let name = HeaderName::try_from(name)
        .map_err(|e| invalid(format!("invalid header name '{name}': {e}")))?;
    if name == AUTHORIZATION {
        return Err(invalid(
            "the 'Authorization' header is set by the connection and cannot be configured",
        ));
    }
    let value = HeaderValue::try_from(value)
        .map_err(|e| invalid(format!("invalid value for header '{name}': {e}")))?;
    Ok((name, value))
}

fn basic_header(username: &str, password: &SecretString) -> Result<HeaderValue, Error> {
    let credentials = Zeroizing::new(format!("{username}:{}", password.expose()));
    let encoded = Zeroizing::new(BASE64.encode(credentials.as_bytes()));
    let mut value = HeaderValue::try_from(format!("Basic {}", &*encoded))
        .map_err(|_| invalid("credentials are not a valid header value"))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn password_config(url: &str) -> ConnectionConfig {
        ConnectionConfig {
            url: url.to_owned(),
            username: Some("admin@internal".to_owned()),
            password: Some(SecretString::new("redhat123")),
            ..Default::default()
        }
    }

    fn config_error(config: &ConnectionConfig) -> String {
        match config.validate() {
            Err(Error::Config(message)) => message,
            Err(other) => panic!("expected config error, got {other:?}"),
            Ok(_) => panic!("expected config error, got valid settings"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.token_expiry_margin, Duration::from_secs(30));
        assert_eq!(config.auth, AuthMode::Sso);
        assert_eq!(config.media_type, MediaType::Xml);
    }

    #[test]
    fn test_url_normalization() {
        for raw in [
            "https://engine.example.com/ovirt-engine/api",
            "https://engine.example.com/ovirt-engine/api/",
            "https://engine.example.com/ovirt-engine/api/v4",
            "https://engine.example.com/ovirt-engine/api/v4/",
        ] {
            let settings = password_config(raw).validate().unwrap();
            assert_eq!(settings.base_url, "https://engine.example.com/ovirt-engine/api");
            assert_eq!(settings.base_path, "/ovirt-engine/api");
        }
    }

    #[test]
    fn test_default_sso_endpoints() {
        let settings = password_config("https://engine.example.com:8443/ovirt-engine/api")
            .validate()
            .unwrap();
        assert_eq!(
            settings.sso_token_url,
            "https://engine.example.com:8443/ovirt-engine/sso/oauth/token"
        );
        assert_eq!(
            settings.sso_revoke_url,
            "https://engine.example.com:8443/ovirt-engine/services/sso-logout"
        );
    }

    #[test]
    fn test_sso_overrides() {
        let settings = ConnectionConfig {
            sso_url: Some("https://sso.example.com/token".to_owned()),
            sso_revoke_url: Some("https://sso.example.com/logout".to_owned()),
            ..password_config("https://engine.example.com/ovirt-engine/api")
        }
        .validate()
        .unwrap();
        assert_eq!(settings.sso_token_url, "https://sso.example.com/token");
        assert_eq!(settings.sso_revoke_url, "https://sso.example.com/logout");

        let message = config_error(&ConnectionConfig {
            sso_url: Some("not a url".to_owned()),
            ..password_config("https://engine.example.com/ovirt-engine/api")
        });
        assert!(message.contains("sso_url"), "{message}");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(config_error(&password_config("")).contains("required"));
        assert!(config_error(&password_config("engine/ovirt-engine/api")).contains("invalid url"));
        assert!(config_error(&password_config("ftp://engine/api")).contains("scheme"));
    }

    #[test]
    fn test_insecure_with_ca_material_rejected() {
        let with_file = ConnectionConfig {
            insecure: true,
            ca_file: Some(PathBuf::from("/etc/pki/ovirt-engine/ca.pem")),
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&with_file).contains("insecure"));

        let with_certs = ConnectionConfig {
            insecure: true,
            ca_certs: vec!["-----BEGIN CERTIFICATE-----".to_owned()],
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&with_certs).contains("insecure"));
    }

    #[test]
    fn test_credential_strategy_must_be_unique() {
        let none = ConnectionConfig {
            url: "https://engine.example.com/ovirt-engine/api".to_owned(),
            ..Default::default()
        };
        assert!(config_error(&none).contains("no credentials"));

        let both = ConnectionConfig {
            token: Some(SecretString::new("abc")),
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&both).contains("only one"));

        let missing_password = ConnectionConfig {
            password: None,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&missing_password).contains("requires 'password'"));
    }

    #[test]
    fn test_static_token_strategy() {
        let settings = ConnectionConfig {
            url: "https://engine.example.com/ovirt-engine/api".to_owned(),
            token: Some(SecretString::new("abc")),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(matches!(settings.credentials, Credentials::Token(_)));
    }

    #[test]
    fn test_basic_auth_requires_password_grant() {
        let settings = ConnectionConfig {
            auth: AuthMode::Basic,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        }
        .validate()
        .unwrap();
        let Credentials::Basic(header) = settings.credentials else {
            panic!("expected basic credentials");
        };
        assert_eq!(header, "Basic YWRtaW5AaW50ZXJuYWw6cmVkaGF0MTIz");
        assert!(header.is_sensitive());

        let token_basic = ConnectionConfig {
            url: "https://engine.example.com/ovirt-engine/api".to_owned(),
            token: Some(SecretString::new("abc")),
            auth: AuthMode::Basic,
            ..Default::default()
        };
        assert!(config_error(&token_basic).contains("basic authentication"));
    }

    #[test]
    fn test_headers_validated() {
        let settings = ConnectionConfig {
            headers: vec![("X-Request-Source".to_owned(), "inventory".to_owned())],
            ..password_config("https://engine.example.com/ovirt-engine/api")
        }
        .validate()
        .unwrap();
        assert_eq!(settings.headers.len(), 1);
        assert_eq!(settings.headers[0].0, "x-request-source");

        let bad_name = ConnectionConfig {
            headers: vec![("bad header".to_owned(), "x".to_owned())],
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&bad_name).contains("header name"));

        let authorization = ConnectionConfig {
            headers: vec![("Authorization".to_owned(), "Bearer x".to_owned())],
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&authorization).contains("Authorization"));
    }

    #[test]
    fn test_trust_mode_selection() {
        let default = password_config("https://engine.example.com/ovirt-engine/api")
            .validate()
            .unwrap();
        assert!(matches!(default.transport.config().tls, TlsTrust::WebPki));

        let system = ConnectionConfig {
            trust_store: TrustStore::System,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        }
        .validate()
        .unwrap();
        assert!(matches!(system.transport.config().tls, TlsTrust::Native));

        let insecure = ConnectionConfig {
            insecure: true,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        }
        .validate()
        .unwrap();
        assert!(matches!(insecure.transport.config().tls, TlsTrust::Insecure));

        let conflicting = ConnectionConfig {
            trust_store: TrustStore::System,
            ca_certs: vec!["-----BEGIN CERTIFICATE-----".to_owned()],
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&conflicting).contains("trust_store"));
    }

    #[test]
    fn test_expiry_margin_bounded() {
        let accepted = ConnectionConfig {
            token_expiry_margin: MAX_TOKEN_EXPIRY_MARGIN,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(accepted.validate().is_ok());

        let huge = ConnectionConfig {
            token_expiry_margin: Duration::MAX,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&huge).contains("token_expiry_margin"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ConnectionConfig {
            timeout: Duration::ZERO,
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        assert!(config_error(&config).contains("timeout"));
    }

    #[test]
    fn test_plain_http_warns_without_leaking_credentials() {
        use std::sync::Mutex;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct WarningCapture {
            warnings: Arc<Mutex<Vec<String>>>,
        }

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = FieldVisitor(String::new());
                    event.record(&mut visitor);
                    self.warnings.lock().unwrap().push(visitor.0);
                }
            }
        }

        struct FieldVisitor(String);
        impl tracing::field::Visit for FieldVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
                use std::fmt::Write as _;
                write!(self.0, "{}={value:?} ", field.name()).unwrap();
            }
        }

        let capture = WarningCapture::default();
        let warnings = Arc::clone(&capture.warnings);
        let subscriber = tracing_subscriber::registry().with(capture);

        tracing::subscriber::with_default(subscriber, || {
            password_config("http://engine.example.com/ovirt-engine/api")
                .validate()
                .unwrap();
        });

        let captured = warnings.lock().unwrap();
        assert!(
            captured.iter().any(|w| w.contains("plain HTTP")),
            "expected a plain HTTP warning, got: {:?}",
            *captured
        );
        assert!(captured.iter().all(|w| !w.contains("redhat123")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ConnectionConfig {
            token: None,
            headers: vec![("X-Secret".to_owned(), "hidden-value".to_owned())],
            ..password_config("https://engine.example.com/ovirt-engine/api")
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("redhat123"));
        assert!(!rendered.contains("hidden-value"));
        assert!(rendered.contains("X-Secret"));
    }
}
