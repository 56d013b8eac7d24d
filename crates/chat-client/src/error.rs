//! Client error types

use chat_cache::{CacheError, ResolveError};
use chat_common::ConfigError;
use chat_core::DomainError;
use chat_gateway::GatewayError;
use chat_rest::RestError;
use thiserror::Error;

/// Errors surfaced by [`Client`](crate::Client) and the event router
#[derive(Debug, Error)]
pub enum ClientError {
    // =========================================================================
    // Lifecycle
    // =========================================================================
    #[error("Client is already running")]
    AlreadyStarted,

    #[error("Client has terminated and cannot be restarted")]
    Terminated,

    #[error("Client has not been started")]
    NotStarted,

    // =========================================================================
    // Subsystems
    // =========================================================================
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    // =========================================================================
    // Payloads
    // =========================================================================
    #[error("Malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request body: {0}")]
    InvalidBody(&'static str),
}

impl ClientError {
    /// Whether the client can no longer be used
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Terminated => true,
            Self::Gateway(err) => err.is_fatal(),
            _ => false,
        }
    }
}
