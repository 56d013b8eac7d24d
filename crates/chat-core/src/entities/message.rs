//! Message entity - a message in a guild channel or DM

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{flatten_relation, snowflake_field, Entity, EntityKind};
use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Pointer to another message, used by replies
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
}

/// Message record. The author and channel are held by id and resolved through the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub author_id: Snowflake,
    /// Empty unless the client declared the message content intent
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub edited_timestamp: Option<DateTime<Utc>>,
    pub tts: bool,
    pub mention_everyone: bool,
    pub pinned: bool,
    pub webhook_id: Option<Snowflake>,
    pub message_reference: Option<MessageReference>,
}

impl Message {
    /// Whether this message was sent in a guild
    #[inline]
    pub fn in_guild(&self) -> bool {
        self.guild_id.is_some()
    }

    /// Check if message has been edited
    #[inline]
    pub fn is_edited(&self) -> bool {
        self.edited_timestamp.is_some()
    }

    /// Check if message is a reply
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.message_reference
            .as_ref()
            .is_some_and(|r| r.message_id.is_some())
    }

    /// Reference that makes a new message a reply to this one
    pub fn reply_reference(&self) -> MessageReference {
        MessageReference {
            message_id: Some(self.id),
            channel_id: Some(self.channel_id),
            guild_id: self.guild_id,
        }
    }
}

impl Entity for Message {
    type Key = Snowflake;
    const KIND: EntityKind = EntityKind::Message;

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

    fn normalize(patch: &mut Map<String, Value>) -> Result<(), DomainError> {
        flatten_relation::<Self>(patch, "author", "author_id")?;
        // The partial member object is cached in the member namespace
        patch.remove("member");
        Ok(())
    }
}
