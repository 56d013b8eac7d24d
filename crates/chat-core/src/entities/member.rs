//! Member entity - a user's membership in a guild

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{flatten_relation, snowflake_field, Entity, EntityKind};
use super::user::User;
use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Identity of a membership: one user in one guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
}

impl MemberKey {
    #[must_use]
    pub const fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self { guild_id, user_id }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.guild_id, self.user_id)
    }
}

/// Guild member record (junction between User and Guild)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildMember {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub roles: Vec<Snowflake>,
    pub joined_at: Option<DateTime<Utc>>,
    pub premium_since: Option<DateTime<Utc>>,
    pub deaf: bool,
    pub mute: bool,
    pub pending: bool,
}

impl GuildMember {
    /// Nickname if set, otherwise the user's display name
    pub fn display_name<'a>(&'a self, user: &'a User) -> &'a str {
        self.nick.as_deref().unwrap_or_else(|| user.display_name())
    }

    /// Check if member has a specific role
    #[inline]
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.roles.contains(&role_id)
    }
}

impl Entity for GuildMember {
    type Key = MemberKey;
    const KIND: EntityKind = EntityKind::Member;

    fn key(&self) -> MemberKey {
        MemberKey::new(self.guild_id, self.user_id)
    }

    fn seed(key: MemberKey) -> Self {
        Self {
            guild_id: key.guild_id,
            user_id: key.user_id,
            ..Self::default()
        }
    }

    fn key_of(patch: &Map<String, Value>) -> Result<MemberKey, DomainError> {
        Ok(MemberKey::new(
            snowflake_field::<Self>(patch, "guild_id")?,
            snowflake_field::<Self>(patch, "user_id")?,
        ))
    }

    fn normalize(patch: &mut Map<String, Value>) -> Result<(), DomainError> {
        flatten_relation::<Self>(patch, "user", "user_id")
    }
}
