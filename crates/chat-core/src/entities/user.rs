//! User entity - a platform account as last seen by this client

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{snowflake_field, Entity, EntityKind};
use crate::error::DomainError;
use crate::value_objects::{Cdn, ImageOptions, Snowflake};

/// Discriminator carried by accounts that moved to unique usernames
const MIGRATED_DISCRIMINATOR: &str = "0";

/// User record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub discriminator: String,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub accent_color: Option<u32>,
    pub bot: bool,
    pub system: bool,
    pub flags: Option<u64>,
    pub public_flags: Option<u64>,
}

impl User {
    /// Whether this account uses the unique-username scheme
    #[inline]
    pub fn is_migrated(&self) -> bool {
        self.discriminator.is_empty() || self.discriminator == MIGRATED_DISCRIMINATOR
    }

    /// Legacy `username#discriminator` tag.
    ///
    /// Only accounts still carrying a discriminator have one.
    pub fn tag(&self) -> Result<String, DomainError> {
        if self.is_migrated() {
            return Err(DomainError::LegacyTagUnavailable(self.username.clone()));
        }
        Ok(format!("{}#{}", self.username, self.discriminator))
    }

    /// Global display name, falling back to the username
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Index of the built-in avatar used when no custom avatar is set
    pub fn default_avatar_index(&self) -> u64 {
        if self.is_migrated() {
            (self.id.get() >> 22) % 6
        } else {
            self.discriminator.parse::<u64>().unwrap_or(0) % 5
        }
    }

    /// Custom avatar URL, or the built-in avatar when none is set
    pub fn display_avatar_url(
        &self,
        cdn: &Cdn,
        options: ImageOptions,
    ) -> Result<String, DomainError> {
        match &self.avatar {
            Some(hash) => cdn.avatar(self.id, hash, options),
            None => Ok(cdn.default_avatar(self.default_avatar_index())),
        }
    }

    /// Profile banner URL, if the user has one
    pub fn banner_url(
        &self,
        cdn: &Cdn,
        options: ImageOptions,
    ) -> Result<Option<String>, DomainError> {
        self.banner
            .as_deref()
            .map(|hash| cdn.banner(self.id, hash, options))
            .transpose()
    }
}

impl Entity for User {
    type Key = Snowflake;
    const KIND: EntityKind = EntityKind::User;

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
}
