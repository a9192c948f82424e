//! Server faults returned by business endpoints.
//!
//! The engine reports failures either as a bare `<fault>` document or as an
//! `<action>` wrapping one, and the JSON renderings follow the same shape.

use crate::response::Response;
use http::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// A non-2xx business response.
///
/// `reason` and `detail` are present when the body decoded as a fault
/// document; otherwise the fault carries only the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    status: StatusCode,
    reason: Option<String>,
    detail: Option<String>,
    retry_after: Option<Duration>,
}

impl Fault {
    /// Build a fault from a status code alone.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            detail: None,
            retry_after: None,
        }
    }

    /// Decode the fault carried by a non-2xx response.
    #[must_use]
    pub fn from_response(response: &Response) -> Self {
        let body = decode(response.content_type(), response.body());
        Self {
            status: response.status(),
            reason: body.reason,
            detail: body.detail,
            retry_after: ovirtsdk_http::parse_retry_after(response.headers()),
        }
    }

    /// HTTP status code of the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Short, server-provided failure reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Server-provided failure detail.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Parsed `Retry-After` header, if the server sent one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.reason {
            write!(f, "Fault reason is \"{reason}\". ")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "Fault detail is \"{detail}\". ")?;
        }
        write!(f, "HTTP response code is {}.", self.status.as_u16())?;
        if let Some(message) = self.status.canonical_reason() {
            write!(f, " HTTP response message is \"{message}\".")?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {}

/// `<fault>` / `{"reason", "detail"}`, or an `<action>` / object nesting one.
#[derive(Debug, Default, Deserialize)]
struct FaultBody {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    fault: Option<Box<FaultBody>>,
}

impl FaultBody {
    fn flatten(self) -> Self {
        match self.fault {
            Some(nested) if self.reason.is_none() && self.detail.is_none() => nested.flatten(),
            _ => Self {
                fault: None,
                ..self
            },
        }
    }

    fn is_empty(&self) -> bool {
        self.reason.is_none() && self.detail.is_none()
    }
}

/// Decode with the format named by `Content-Type` first, then the other one.
fn decode(content_type: Option<&str>, body: &[u8]) -> FaultBody {
    let json_first = content_type.is_some_and(|ct| ct.contains("json"));
    let attempts: [fn(&[u8]) -> Option<FaultBody>; 2] = if json_first {
        [decode_json, decode_xml]
    } else {
        [decode_xml, decode_json]
    };

    attempts
        .iter()
        .filter_map(|attempt| attempt(body))
        .map(FaultBody::flatten)
        .find(|fault| !fault.is_empty())
        .unwrap_or_default()
}

fn decode_xml(body: &[u8]) -> Option<FaultBody> {
    let text = std::str::from_utf8(body).ok()?;
    if !text.trim_start().starts_with('<') {
        return None;
    }
    quick_xml::de::from_str(text).ok()
}

fn decode_json(body: &[u8]) -> Option<FaultBody> {
    serde_json::from_slice(body).ok()
}
