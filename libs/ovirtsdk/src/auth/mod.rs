//! Credential strategies and the bearer token lifecycle.
//!
//! - [`TokenManager`] caches the token and serializes acquisition
//! - [`SsoClient`] talks to the SSO token and revoke endpoints
//! - [`NegotiateProvider`] plugs a Kerberos/GSSAPI binding into the SSO exchange

mod manager;
mod negotiate;
mod sso;
mod token;

pub use manager::TokenManager;
pub use negotiate::{NegotiateError, NegotiateProvider};
pub use sso::SsoClient;
pub use token::AccessToken;

use http::header::HeaderValue;
use ovirtsdk_http::SecretString;
use std::sync::Arc;

/// The single credential strategy chosen at construction.
pub enum Credentials {
    Password {
        username: String,
        password: SecretString,
    },
    Kerberos(Arc<dyn NegotiateProvider>),
    /// Caller-supplied bearer token.
    Token(AccessToken),
    /// Precomputed `Authorization: Basic` value.
    Basic(HeaderValue),
}
