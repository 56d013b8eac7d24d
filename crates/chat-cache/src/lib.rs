//! # chat-cache
//!
//! In-memory mirror of remote entities, kept consistent with the gateway event stream.
//!
//! ## Features
//!
//! - **Namespaces**: one concurrent map per entity kind (users, guilds, channels, messages, members)
//! - **Shared references**: lookups hand out [`Cached`] handles that observe later patches in place
//! - **Field-level merge**: patches overwrite only the fields they carry, atomically per key
//! - **Lazy resolution**: a [`Resolver`] fetches and inserts entities on a cache miss
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::EntityCache;
//! use chat_core::{User, Snowflake};
//!
//! let cache = EntityCache::new();
//! cache.upsert::<User>(Snowflake::new(80), &json!({ "username": "nelly" }))?;
//!
//! let user = cache.get::<User>(Snowflake::new(80)).unwrap();
//! assert_eq!(user.read().username, "nelly");
//! ```

pub mod error;
pub mod store;

pub use error::{CacheError, ResolveError};
pub use store::{CacheNamespace, CacheStats, Cached, EntityCache, Namespaced, Resolver};
