//! Entity actions
//!
//! Message operations and cache-first fetches. Request bodies are accepted as
//! anything serializable; responses that describe entities are merged into
//! the cache before they are returned.

use chat_cache::Cached;
use chat_core::{Channel, Guild, GuildMember, MemberKey, Message, Snowflake, User};
use chat_rest::{Request, Route};
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::Client;
use crate::error::ClientError;

impl Client {
    // =========================================================================
    // Messages
    // =========================================================================

    /// Post a message. `body` is the create-message payload.
    pub async fn send_message<B>(&self, channel_id: Snowflake, body: &B) -> Result<Cached<Message>, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let request = Request::from(Route::CreateMessage { channel_id }).json(body)?;
        let payload: Value = self.inner.rest.request(request).await?;
        self.store_message(&payload)
    }

    /// Post a plain text message
    pub async fn say(&self, channel_id: Snowflake, content: &str) -> Result<Cached<Message>, ClientError> {
        self.send_message(channel_id, &json!({ "content": content })).await
    }

    /// Post a message that replies to `message`
    pub async fn reply<B>(&self, message: &Message, body: &B) -> Result<Cached<Message>, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let mut body = serde_json::to_value(body)?;
        let Value::Object(map) = &mut body else {
            return Err(ClientError::InvalidBody("reply body must be a JSON object"));
        };
        map.insert(
            "message_reference".to_string(),
            serde_json::to_value(message.reply_reference())?,
        );
        self.send_message(message.channel_id, &body).await
    }

    /// Edit a message; the cached copy is updated with the response.
    ///
    /// A message that is not cached, or was deleted while the edit was in
    /// flight, is returned without being cached.
    pub async fn edit_message<B>(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        body: &B,
    ) -> Result<Cached<Message>, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let request = Request::from(Route::EditMessage {
            channel_id,
            message_id,
        })
        .json(body)?;
        let payload: Value = self.inner.rest.request(request).await?;
        self.store_author(&payload)?;
        Ok(self.inner.cache.update_payload::<Message>(&payload)?)
    }

    pub async fn delete_message(&self, channel_id: Snowflake, message_id: Snowflake) -> Result<(), ClientError> {
        self.inner
            .rest
            .execute(Route::DeleteMessage {
                channel_id,
                message_id,
            })
            .await?;
        self.inner.cache.remove::<Message>(message_id);
        Ok(())
    }

    /// React as the current user. `emoji` is a unicode emoji or `name:id`.
    pub async fn react(&self, channel_id: Snowflake, message_id: Snowflake, emoji: &str) -> Result<(), ClientError> {
        self.inner
            .rest
            .execute(Route::CreateReaction {
                channel_id,
                message_id,
                emoji: emoji.to_string(),
            })
            .await?;
        Ok(())
    }

    pub async fn pin_message(&self, channel_id: Snowflake, message_id: Snowflake) -> Result<(), ClientError> {
        self.inner
            .rest
            .execute(Route::PinMessage {
                channel_id,
                message_id,
            })
            .await?;
        self.mark_pinned(message_id, true)
    }

    pub async fn unpin_message(&self, channel_id: Snowflake, message_id: Snowflake) -> Result<(), ClientError> {
        self.inner
            .rest
            .execute(Route::UnpinMessage {
                channel_id,
                message_id,
            })
            .await?;
        self.mark_pinned(message_id, false)
    }

    // =========================================================================
    // Cache-first fetches
    // =========================================================================

    pub async fn fetch_user(&self, user_id: Snowflake) -> Result<Cached<User>, ClientError> {
        Ok(self
            .inner
            .cache
            .get_or_resolve::<User, _>(user_id, &self.inner.resolver)
            .await?)
    }

    pub async fn fetch_channel(&self, channel_id: Snowflake) -> Result<Cached<Channel>, ClientError> {
        Ok(self
            .inner
            .cache
            .get_or_resolve::<Channel, _>(channel_id, &self.inner.resolver)
            .await?)
    }

    pub async fn fetch_guild(&self, guild_id: Snowflake) -> Result<Cached<Guild>, ClientError> {
        Ok(self
            .inner
            .cache
            .get_or_resolve::<Guild, _>(guild_id, &self.inner.resolver)
            .await?)
    }

    pub async fn fetch_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Result<Cached<GuildMember>, ClientError> {
        Ok(self
            .inner
            .cache
            .get_or_resolve::<GuildMember, _>(MemberKey::new(guild_id, user_id), &self.inner.resolver)
            .await?)
    }

    /// Cached message, or fetch it from its channel
    pub async fn fetch_message(&self, channel_id: Snowflake, message_id: Snowflake) -> Result<Cached<Message>, ClientError> {
        if let Some(message) = self.inner.cache.get::<Message>(message_id) {
            return Ok(message);
        }
        let payload: Value = self
            .inner
            .rest
            .request(Route::GetMessage {
                channel_id,
                message_id,
            })
            .await?;
        self.store_message(&payload)
    }

    /// Cache a message payload along with its embedded author
    fn store_message(&self, payload: &Value) -> Result<Cached<Message>, ClientError> {
        self.inner.cache.validate::<Message>(payload)?;
        self.store_author(payload)?;
        Ok(self.inner.cache.upsert_payload::<Message>(payload)?)
    }

    fn store_author(&self, payload: &Value) -> Result<(), ClientError> {
        if let Some(author) = payload.get("author") {
            self.inner.cache.upsert_payload::<User>(author)?;
        }
        Ok(())
    }

    fn mark_pinned(&self, message_id: Snowflake, pinned: bool) -> Result<(), ClientError> {
        self.inner
            .cache
            .update_payload::<Message>(&json!({ "id": message_id, "pinned": pinned }))?;
        Ok(())
    }
}
