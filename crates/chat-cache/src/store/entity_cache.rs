//! The cache of record
//!
//! Holds one namespace per entity kind. Relations between entities are stored as
//! identifiers and resolved here at read time.

use chat_core::{Channel, Entity, Guild, GuildMember, MemberKey, Message, User};
use serde_json::Value;

use super::cached::Cached;
use super::namespace::CacheNamespace;
use super::resolver::Resolver;
use crate::error::{CacheError, ResolveError};

/// Entity types that have a namespace in [`EntityCache`]
pub trait Namespaced: Entity {
    fn namespace(cache: &EntityCache) -> &CacheNamespace<Self>;
}

macro_rules! namespaced {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl Namespaced for $ty {
                fn namespace(cache: &EntityCache) -> &CacheNamespace<Self> {
                    &cache.$field
                }
            }
        )*
    };
}

namespaced! {
    User => users,
    Guild => guilds,
    Channel => channels,
    Message => messages,
    GuildMember => members,
}

/// Entry counts per namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub users: usize,
    pub guilds: usize,
    pub channels: usize,
    pub messages: usize,
    pub members: usize,
}

/// In-memory mirror of remote entities
#[derive(Default)]
pub struct EntityCache {
    users: CacheNamespace<User>,
    guilds: CacheNamespace<Guild>,
    channels: CacheNamespace<Channel>,
    messages: CacheNamespace<Message>,
    members: CacheNamespace<GuildMember>,
}

impl EntityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> &CacheNamespace<User> {
        &self.users
    }

    pub fn guilds(&self) -> &CacheNamespace<Guild> {
        &self.guilds
    }

    pub fn channels(&self) -> &CacheNamespace<Channel> {
        &self.channels
    }

    pub fn messages(&self) -> &CacheNamespace<Message> {
        &self.messages
    }

    pub fn members(&self) -> &CacheNamespace<GuildMember> {
        &self.members
    }

    /// Look up an entity of kind `T`
    pub fn get<T: Namespaced>(&self, key: T::Key) -> Option<Cached<T>> {
        T::namespace(self).get(key)
    }

    /// Merge a patch into the entity at `key`, creating it if absent
    pub fn upsert<T: Namespaced>(&self, key: T::Key, patch: &Value) -> Result<Cached<T>, CacheError> {
        T::namespace(self).upsert(key, patch)
    }

    /// Merge a raw payload, reading its identity from the payload
    pub fn upsert_payload<T: Namespaced>(&self, payload: &Value) -> Result<Cached<T>, CacheError> {
        T::namespace(self).upsert_payload(payload)
    }

    /// Merge a raw payload into an existing entity only; see
    /// [`CacheNamespace::update_payload`]
    pub fn update_payload<T: Namespaced>(&self, payload: &Value) -> Result<Cached<T>, CacheError> {
        T::namespace(self).update_payload(payload)
    }

    /// Check a raw payload without caching it. Returns its identity.
    pub fn validate<T: Namespaced>(&self, payload: &Value) -> Result<T::Key, CacheError> {
        T::namespace(self).validate(payload)
    }

    pub fn insert<T: Namespaced>(&self, record: T) -> Cached<T> {
        T::namespace(self).insert(record)
    }

    pub fn remove<T: Namespaced>(&self, key: T::Key) -> Option<Cached<T>> {
        T::namespace(self).remove(key)
    }

    /// Return the cached entity, or fetch it through `resolver` and insert it.
    ///
    /// No cache lock is held while the fetch is in flight. If the entity shows
    /// up in the meantime the fetched payload is merged into it.
    pub async fn get_or_resolve<T, R>(&self, key: T::Key, resolver: &R) -> Result<Cached<T>, ResolveError>
    where
        T: Namespaced,
        R: Resolver<T> + ?Sized,
    {
        if let Some(hit) = self.get::<T>(key) {
            return Ok(hit);
        }

        tracing::debug!(kind = %T::KIND, key = %key, "Cache miss, resolving");
        let payload = resolver.resolve(key).await?;
        self.upsert::<T>(key, &payload)
            .map_err(|source| ResolveError::Insert { kind: T::KIND, source })
    }

    /// Drop everything. Used when a fresh session makes the mirror stale.
    pub fn clear(&self) {
        self.users.clear();
        self.guilds.clear();
        self.channels.clear();
        self.messages.clear();
        self.members.clear();
        tracing::debug!("Entity cache cleared");
    }

    /// Remove a guild along with its channels, members, and messages
    pub fn remove_guild(&self, guild_id: chat_core::Snowflake) -> Option<Cached<Guild>> {
        let removed = self.guilds.remove(guild_id);
        let channels = self.channels.remove_where(|c| c.guild_id == Some(guild_id));
        let members = self.members.remove_where(|m| m.guild_id == guild_id);
        let messages = self.messages.remove_where(|m| m.guild_id == Some(guild_id));
        tracing::debug!(
            guild_id = %guild_id,
            channels,
            members,
            messages,
            "Guild evicted from cache"
        );
        removed
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            users: self.users.len(),
            guilds: self.guilds.len(),
            channels: self.channels.len(),
            messages: self.messages.len(),
            members: self.members.len(),
        }
    }

    // =========================================================================
    // Relations resolved at read time
    // =========================================================================

    /// Author of a message
    pub fn author_of(&self, message: &Message) -> Option<Cached<User>> {
        self.users.get(message.author_id)
    }

    /// Channel a message was sent in
    pub fn channel_of(&self, message: &Message) -> Option<Cached<Channel>> {
        self.channels.get(message.channel_id)
    }

    /// Guild a message was sent in, if any
    pub fn guild_of(&self, message: &Message) -> Option<Cached<Guild>> {
        message.guild_id.and_then(|id| self.guilds.get(id))
    }

    /// Guild membership of a message's author
    pub fn member_of(&self, message: &Message) -> Option<Cached<GuildMember>> {
        message
            .guild_id
            .and_then(|guild_id| self.members.get(MemberKey::new(guild_id, message.author_id)))
    }

    /// User behind a membership
    pub fn member_user(&self, member: &GuildMember) -> Option<Cached<User>> {
        self.users.get(member.user_id)
    }
}
