#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the oVirt engine SDK
//!
//! This crate provides a hyper-based HTTP client with:
//! - TLS via rustls with web PKI, native, custom CA or disabled verification
//! - HTTPS only by default
//! - Connection pooling and a per-request timeout
//! - Optional `CONNECT` proxy with basic credentials
//! - Optional gzip negotiation with transparent decompression
//! - Optional wire logging of request/response metadata
//! - Failure classification ([`TransportErrorKind`]) for caller-side retry policies
//!
//! The client never retries and never follows redirects. Every HTTP status,
//! including 4xx/5xx, comes back as `Ok(HttpResponse)`.
//!
//! # Example
//!
//! ```ignore
//! use ovirtsdk_http::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(600))
//!     .ca_file("/etc/pki/ovirt-engine/ca.pem")
//!     .compression(true)
//!     .build()?;
//!
//! let body = client
//!     .get("https://engine.example.com/ovirt-engine/api")
//!     .header("Accept", "application/xml")
//!     .send()
//!     .await?
//!     .bytes()
//!     .await?;
//!
//! client.close();
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod proxy;
mod request;
mod response;
pub mod secret;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    CaSource, DEFAULT_USER_AGENT, HttpClientConfig, ProxyConfig, TlsTrust, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind, TransportErrorKind};
pub use layers::{
    DefaultHeadersLayer, DefaultHeadersService, WIRE_LOG_TARGET, WireLogLayer, WireLogService,
};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody, parse_retry_after};
pub use secret::SecretString;
