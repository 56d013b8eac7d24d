//! # chat-core
//!
//! Domain layer containing the remote entity records, identifiers, gateway intents,
//! and the merge contract every cached entity satisfies.
//! This crate has zero dependencies on infrastructure (network, runtime, etc.).

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Channel, ChannelType, Entity, EntityKind, Guild, GuildMember, MemberKey, Message,
    MessageReference, User,
};
pub use error::DomainError;
pub use value_objects::{
    Cdn, ImageFormat, ImageOptions, Intents, Snowflake, SnowflakeParseError,
};
