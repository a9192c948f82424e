//! Tower layers for the HTTP client middleware stack
//!
//! - [`DefaultHeadersLayer`] - Adds User-Agent and configured headers to all requests
//! - [`WireLogLayer`] - Emits request/response metadata as tracing events

mod default_headers;
mod wire_log;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
pub use wire_log::{WIRE_LOG_TARGET, WireLogLayer, WireLogService};
