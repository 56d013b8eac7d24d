//! Cache error types

use chat_core::{DomainError, EntityKind};

/// Errors raised while applying a patch
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    InvalidPatch(#[from] DomainError),

    #[error("Patch for {kind} {expected} would change its identity to {found}")]
    KeyMismatch {
        kind: EntityKind,
        expected: String,
        found: String,
    },
}

/// Errors raised by fetch-and-insert on a cache miss
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to fetch {kind} {key}: {source}")]
    Fetch {
        kind: EntityKind,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Unresolvable(DomainError),

    #[error("Fetched {kind} could not be cached: {source}")]
    Insert {
        kind: EntityKind,
        #[source]
        source: CacheError,
    },
}

impl ResolveError {
    /// Wrap a transport or API failure from a resolver
    pub fn fetch<E>(kind: EntityKind, key: impl ToString, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Fetch {
            kind,
            key: key.to_string(),
            source: Box::new(source),
        }
    }

    /// Kind of entity that failed to resolve
    #[must_use]
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Fetch { kind, .. } | Self::Insert { kind, .. } => Some(*kind),
            Self::Unresolvable(DomainError::Unresolvable { kind, .. }) => Some(*kind),
            Self::Unresolvable(_) => None,
        }
    }
}
