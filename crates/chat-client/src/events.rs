//! Public events
//!
//! Every event is emitted after the cache mutation it describes has been
//! applied. Entities are handed out as [`Cached`] references, so a handler
//! that keeps one sees later updates to the same entity.

use chat_cache::Cached;
use chat_core::{Channel, Guild, GuildMember, Message, Snowflake, User};

#[derive(Debug, Clone)]
pub enum Event {
    /// Session established; the cache was rebuilt from scratch
    Ready {
        user: Cached<User>,
        /// Guilds that will arrive as `GuildCreate`
        guilds: Vec<Snowflake>,
    },
    /// Session resumed; missed events were replayed before this one
    Resumed,

    GuildCreate(Cached<Guild>),
    GuildUpdate(Cached<Guild>),
    /// Left the guild, or the guild became unavailable during an outage
    GuildDelete {
        guild_id: Snowflake,
        unavailable: bool,
        /// Last known state
        guild: Option<Cached<Guild>>,
    },

    ChannelCreate(Cached<Channel>),
    ChannelUpdate(Cached<Channel>),
    ChannelDelete {
        channel_id: Snowflake,
        channel: Option<Cached<Channel>>,
    },

    /// A new message, with its author already in the cache
    MessageCreate {
        message: Cached<Message>,
        author: Cached<User>,
    },
    MessageUpdate(Cached<Message>),
    MessageDelete {
        id: Snowflake,
        channel_id: Snowflake,
        guild_id: Option<Snowflake>,
        message: Option<Cached<Message>>,
    },

    MemberAdd {
        member: Cached<GuildMember>,
        user: Cached<User>,
    },
    MemberUpdate {
        member: Cached<GuildMember>,
        user: Cached<User>,
    },
    MemberRemove {
        guild_id: Snowflake,
        user: Cached<User>,
        member: Option<Cached<GuildMember>>,
    },

    UserUpdate(Cached<User>),
}

impl Event {
    /// Event name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Resumed => "resumed",
            Self::GuildCreate(_) => "guild_create",
            Self::GuildUpdate(_) => "guild_update",
            Self::GuildDelete { .. } => "guild_delete",
            Self::ChannelCreate(_) => "channel_create",
            Self::ChannelUpdate(_) => "channel_update",
            Self::ChannelDelete { .. } => "channel_delete",
            Self::MessageCreate { .. } => "message_create",
            Self::MessageUpdate(_) => "message_update",
            Self::MessageDelete { .. } => "message_delete",
            Self::MemberAdd { .. } => "member_add",
            Self::MemberUpdate { .. } => "member_update",
            Self::MemberRemove { .. } => "member_remove",
            Self::UserUpdate(_) => "user_update",
        }
    }
}
