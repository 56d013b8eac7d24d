//! Bot token handling
//!
//! The token is a credential: it never appears in `Debug` output or logs.

use std::fmt;

/// Authentication token sent with every REST call and in the gateway identify
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Validate and wrap a raw token. A leading `Bot ` prefix is accepted and stripped.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, TokenError> {
        let trimmed = raw.as_ref().trim();
        let token = trimmed.strip_prefix("Bot ").unwrap_or(trimmed).trim();

        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        if token.chars().any(char::is_whitespace) {
            return Err(TokenError::Malformed);
        }
        Ok(Self(token.to_string()))
    }

    /// Raw token as sent in the identify payload
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bot {}", self.0)
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken(<redacted>)")
    }
}

/// Token validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Bot token is empty")]
    Empty,

    #[error("Bot token contains whitespace")]
    Malformed,
}
