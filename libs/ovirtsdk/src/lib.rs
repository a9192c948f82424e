#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! oVirt engine SDK core
//!
//! A [`Connection`] owns one pooled HTTPS transport and one bearer token
//! cache. Requests are authenticated lazily:
//! - username/password or Kerberos credentials are exchanged at the engine's
//!   SSO service the first time a token is needed, once for any number of
//!   concurrent callers
//! - a 401 on a cached token invalidates it and the request is retried exactly
//!   once with a fresh token
//! - a caller-supplied token or basic credentials are used as-is
//!
//! Non-2xx responses come back as [`Error::Fault`] with the engine's reason and
//! detail when the body carries them. Network failures keep their
//! [`TransportErrorKind`] so callers can apply their own retry policy; the SDK
//! does not retry them.
//!
//! # Example
//!
//! ```ignore
//! use ovirtsdk::{Connection, ListOptions};
//!
//! let connection = Connection::builder()
//!     .url("https://engine.example.com/ovirt-engine/api")
//!     .username("admin@internal")
//!     .password("secret")
//!     .ca_file("/etc/pki/ovirt-engine/ca.pem")
//!     .build()?;
//!
//! let vm = connection.system_service().vms().entity("123");
//! vm.action("start", "<action/>").await?;
//!
//! connection.close().await;
//! ```

mod auth;
mod builder;
mod config;
mod connection;
mod dispatcher;
mod error;
mod fault;
mod request;
mod response;
pub mod services;

pub use auth::{AccessToken, NegotiateError, NegotiateProvider};
pub use builder::ConnectionBuilder;
pub use config::{
    AuthMode, ConnectionConfig, DEFAULT_TIMEOUT, DEFAULT_TOKEN_EXPIRY_MARGIN, DEFAULT_USER_AGENT,
    MAX_TOKEN_EXPIRY_MARGIN, MediaType, TrustStore,
};
pub use connection::Connection;
pub use error::{AuthError, Error, TransportError};
pub use fault::Fault;
pub use request::Request;
pub use response::Response;
pub use services::{CollectionService, EntityService, GetOptions, ListOptions, SystemService};

pub use ovirtsdk_http::{ProxyConfig, SecretString, TransportErrorKind};
