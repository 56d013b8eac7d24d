//! Structured REST error payloads
//!
//! Non-success responses carry a JSON body `{ code, message, errors }`.
//! The body is attached unchanged to the error surfaced to the caller.

use serde::{Deserialize, Serialize};

/// Error body returned by the REST API
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Platform error code (0 when the body was not JSON)
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub message: String,
    /// Nested per-field validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// Decode a response body, keeping the raw text when it is not the expected JSON shape
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_else(|_| Self {
            code: 0,
            message: String::from_utf8_lossy(bytes).into_owned(),
            errors: None,
        })
    }
}

/// A failed REST response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP {status}: {} (code {})", body.message, body.code)]
pub struct ApiError {
    pub status: u16,
    pub body: ApiErrorBody,
}

impl ApiError {
    #[must_use]
    pub fn new(status: u16, body: ApiErrorBody) -> Self {
        Self { status, body }
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Unknown resource (404)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}
