//! Cache-miss resolution over REST

use async_trait::async_trait;
use chat_cache::{ResolveError, Resolver};
use chat_core::{Channel, DomainError, Entity, EntityKind, Guild, GuildMember, MemberKey, Message, Snowflake, User};
use chat_rest::{RestClient, Route};
use serde_json::Value;

/// Fetches missing entities through the rate-limited REST client
#[derive(Debug, Clone)]
pub struct RestResolver {
    rest: RestClient,
}

impl RestResolver {
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    async fn fetch(&self, kind: EntityKind, key: impl ToString, route: Route) -> Result<Value, ResolveError> {
        let key = key.to_string();
        tracing::debug!(kind = %kind, key = %key, "Fetching over REST");
        self.rest
            .request(route)
            .await
            .map_err(|err| ResolveError::fetch(kind, key, err))
    }
}

#[async_trait]
impl Resolver<User> for RestResolver {
    async fn resolve(&self, user_id: Snowflake) -> Result<Value, ResolveError> {
        self.fetch(User::KIND, user_id, Route::GetUser { user_id }).await
    }
}

#[async_trait]
impl Resolver<Guild> for RestResolver {
    async fn resolve(&self, guild_id: Snowflake) -> Result<Value, ResolveError> {
        self.fetch(Guild::KIND, guild_id, Route::GetGuild { guild_id }).await
    }
}

#[async_trait]
impl Resolver<Channel> for RestResolver {
    async fn resolve(&self, channel_id: Snowflake) -> Result<Value, ResolveError> {
        self.fetch(Channel::KIND, channel_id, Route::GetChannel { channel_id }).await
    }
}

#[async_trait]
impl Resolver<GuildMember> for RestResolver {
    async fn resolve(&self, key: MemberKey) -> Result<Value, ResolveError> {
        self.fetch(
            GuildMember::KIND,
            key,
            Route::GetGuildMember {
                guild_id: key.guild_id,
                user_id: key.user_id,
            },
        )
        .await
    }
}

/// Messages are keyed by id alone, but fetching one needs its channel too
#[async_trait]
impl Resolver<Message> for RestResolver {
    async fn resolve(&self, message_id: Snowflake) -> Result<Value, ResolveError> {
        Err(ResolveError::Unresolvable(DomainError::Unresolvable {
            kind: Message::KIND,
            key: message_id.to_string(),
        }))
    }
}
