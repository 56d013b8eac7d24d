//! Guild entity - a server the client is a member of

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{snowflake_field, Entity, EntityKind};
use crate::error::DomainError;
use crate::value_objects::{Cdn, ImageOptions, Snowflake};

/// Guild (server) record.
///
/// Channels and members live in their own namespaces and reference the guild by id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub owner_id: Snowflake,
    pub member_count: Option<u64>,
    /// Set while the guild is in an outage and only its id is known
    pub unavailable: bool,
}

impl Guild {
    /// Check if a user is the guild owner
    #[inline]
    pub fn is_owner(&self, user_id: Snowflake) -> bool {
        self.owner_id == user_id
    }

    /// Guild icon URL, if one is set
    pub fn icon_url(&self, cdn: &Cdn, options: ImageOptions) -> Result<Option<String>, DomainError> {
        self.icon
            .as_deref()
            .map(|hash| cdn.icon(self.id, hash, options))
            .transpose()
    }
}

impl Entity for Guild {
    type Key = Snowflake;
    const KIND: EntityKind = EntityKind::Guild;

    fn key(&self) -> Snowflake {
        self.id
    }

    fn seed(key: Snowflake) -> Self {
        Self {
            id: key,
            ..Self::default()
        }
    }

    fn key_of(patch: &Map<String, Value>) -> Result<Snowflake, DomainError> {
        snowflake_field::<Self>(patch, "id")
    }

    // Full GUILD_CREATE payloads embed channels and members; those are cached separately
    fn normalize(patch: &mut Map<String, Value>) -> Result<(), DomainError> {
        for embedded in ["channels", "threads", "members", "roles", "presences", "voice_states"] {
            patch.remove(embedded);
        }
        Ok(())
    }
}
