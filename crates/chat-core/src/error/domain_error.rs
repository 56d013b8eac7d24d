//! Domain errors - error types for the domain layer

use thiserror::Error;

use crate::entities::EntityKind;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Capability Errors
    // =========================================================================
    #[error("User {0} has migrated to a unique username and has no legacy tag")]
    LegacyTagUnavailable(String),

    #[error("Invalid image size {0}: must be a power of two between 16 and 4096")]
    InvalidImageSize(u16),

    // =========================================================================
    // Cache Contract Errors
    // =========================================================================
    #[error("Invalid {kind} patch: {reason}")]
    InvalidPatch { kind: EntityKind, reason: String },

    #[error("{kind} {key} cannot be fetched on a cache miss")]
    Unresolvable { kind: EntityKind, key: String },
}

impl DomainError {
    /// Get an error code string for diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            Self::LegacyTagUnavailable(_) => "LEGACY_TAG_UNAVAILABLE",
            Self::InvalidImageSize(_) => "INVALID_IMAGE_SIZE",
            Self::InvalidPatch { .. } => "INVALID_PATCH",
            Self::Unresolvable { .. } => "UNRESOLVABLE_ENTITY",
        }
    }

    /// Check if this error came from a malformed or incomplete payload
    pub fn is_payload_error(&self) -> bool {
        matches!(self, Self::InvalidPatch { .. })
    }
}
