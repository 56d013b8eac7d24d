//! Gateway error types

use thiserror::Error;

use crate::protocol::CloseCode;

/// Gateway connection errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection closed with a recoverable code
    #[error("Connection closed with code {0}")]
    Closed(u16),

    /// Connection closed with a code that no reconnect can fix
    #[error("Unrecoverable close {code}: {reason}")]
    FatalClose { code: u16, reason: &'static str },

    #[error("Timed out waiting for Hello")]
    HelloTimeout,

    #[error("Gave up after {attempts} failed connection attempts")]
    ReconnectsExhausted { attempts: u32 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection was closed locally
    #[error("Gateway shut down")]
    Shutdown,
}

impl GatewayError {
    /// Build the error for a fatal close code
    #[must_use]
    pub fn fatal_close(code: u16) -> Self {
        Self::FatalClose {
            code,
            reason: CloseCode::from_u16(code).map_or("unrecoverable close", CloseCode::description),
        }
    }

    /// Whether the connection terminated for good
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalClose { .. } | Self::ReconnectsExhausted { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}
