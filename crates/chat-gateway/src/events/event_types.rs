//! Dispatch event names
//!
//! The `t` field of a dispatch frame. Names not listed here are forwarded but
//! not routed.

use std::fmt;

/// Dispatch events the client routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    Ready,
    Resumed,
    GuildCreate,
    GuildUpdate,
    GuildDelete,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    GuildMemberAdd,
    GuildMemberUpdate,
    GuildMemberRemove,
    /// The connected user changed
    UserUpdate,
}

/// Wire name of every routed event
const NAMES: [(GatewayEventType, &str); 15] = [
    (GatewayEventType::Ready, "READY"),
    (GatewayEventType::Resumed, "RESUMED"),
    (GatewayEventType::GuildCreate, "GUILD_CREATE"),
    (GatewayEventType::GuildUpdate, "GUILD_UPDATE"),
    (GatewayEventType::GuildDelete, "GUILD_DELETE"),
    (GatewayEventType::ChannelCreate, "CHANNEL_CREATE"),
    (GatewayEventType::ChannelUpdate, "CHANNEL_UPDATE"),
    (GatewayEventType::ChannelDelete, "CHANNEL_DELETE"),
    (GatewayEventType::MessageCreate, "MESSAGE_CREATE"),
    (GatewayEventType::MessageUpdate, "MESSAGE_UPDATE"),
    (GatewayEventType::MessageDelete, "MESSAGE_DELETE"),
    (GatewayEventType::GuildMemberAdd, "GUILD_MEMBER_ADD"),
    (GatewayEventType::GuildMemberUpdate, "GUILD_MEMBER_UPDATE"),
    (GatewayEventType::GuildMemberRemove, "GUILD_MEMBER_REMOVE"),
    (GatewayEventType::UserUpdate, "USER_UPDATE"),
];

impl GatewayEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        NAMES
            .iter()
            .find(|(event, _)| *event == self)
            .map_or("UNKNOWN", |(_, name)| name)
    }

    /// Look up a wire name. Unrouted events are `None`.
    #[must_use]
    pub fn from_str(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(event, _)| *event)
    }

    /// Events that establish or restore the session
    #[must_use]
    pub fn is_session_event(self) -> bool {
        matches!(self, Self::Ready | Self::Resumed)
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
