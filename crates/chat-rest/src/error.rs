//! REST dispatcher errors

use chat_common::ApiError;

/// Failure resolving a dispatched request
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// Non-retryable response; the structured body is attached
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<RestError>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 429 without a usable retry-after
    #[error("Rate limited on {route}")]
    RateLimited { route: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The dispatcher shut down before the request produced a result
    #[error("Request cancelled")]
    Cancelled,
}

impl RestError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The structured API error, looking through retry exhaustion
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            Self::RetriesExhausted { last, .. } => last.api_error(),
            _ => None,
        }
    }

    /// Whether another attempt may succeed
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Api(err) => err.is_server_error(),
            Self::Transport(_) | Self::RateLimited { .. } => true,
            _ => false,
        }
    }
}

/// Failure below HTTP semantics
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_common::ApiErrorBody;

    #[test]
    fn test_retryable_classification() {
        assert!(RestError::Api(ApiError::new(502, ApiErrorBody::default())).is_retryable());
        assert!(!RestError::Api(ApiError::new(403, ApiErrorBody::default())).is_retryable());
        assert!(RestError::Transport(TransportError::Timeout).is_retryable());
        assert!(!RestError::Cancelled.is_retryable());
    }

    #[test]
    fn test_api_error_through_exhaustion() {
        let err = RestError::RetriesExhausted {
            attempts: 4,
            last: Box::new(RestError::Api(ApiError::new(503, ApiErrorBody::default()))),
        };
        assert_eq!(err.api_error().map(|e| e.status), Some(503));
        assert!(!err.is_cancelled());
    }
}
