//! Fetch-on-miss hook

use async_trait::async_trait;
use chat_core::Entity;
use serde_json::Value;

use crate::error::ResolveError;

/// Fetches the raw payload of an entity the cache has not seen yet.
///
/// Implementations return the remote representation; the cache normalizes and
/// inserts it.
#[async_trait]
pub trait Resolver<T: Entity>: Send + Sync {
    async fn resolve(&self, key: T::Key) -> Result<Value, ResolveError>;
}
