//! Cache storage: shared entry handles, per-kind namespaces, and the cache of record

mod cached;
mod entity_cache;
mod namespace;
mod resolver;

pub use cached::Cached;
pub use entity_cache::{CacheStats, EntityCache, Namespaced};
pub use namespace::CacheNamespace;
pub use resolver::Resolver;
