//! Dispatch payloads that are not entity records
//!
//! Entity-shaped payloads (`GUILD_CREATE`, `MESSAGE_CREATE`, ...) go straight
//! into the cache as raw JSON. These cover the rest.

use chat_core::Snowflake;
use serde::Deserialize;
use serde_json::Value;

/// `READY` payload
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyEvent {
    /// The current user
    pub user: Value,
    /// Guilds the bot is in, initially unavailable
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub session_id: String,
}

/// Guild stub in `READY` and `GUILD_DELETE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

/// `MESSAGE_DELETE` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MessageDeleteEvent {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

/// Identity-only object, e.g. the `user` of `GUILD_MEMBER_REMOVE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IdOnly {
    pub id: Snowflake,
}

/// `GUILD_MEMBER_REMOVE` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildMemberRemoveEvent {
    pub guild_id: Snowflake,
    pub user: IdOnly,
}
