//! Event router
//!
//! Consumes gateway dispatches one at a time, in delivery order. Each
//! dispatch is classified by name, applied to the cache, and then emitted as
//! a public [`Event`]. When an event references an entity the cache does not
//! have (a message author), the entity is fetched over REST and inserted
//! before the event goes out. If that fetch fails the event is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_cache::{Cached, EntityCache};
use chat_core::{Channel, Guild, GuildMember, MemberKey, Message, Snowflake, User};
use chat_gateway::events::{GuildMemberRemoveEvent, IdOnly, MessageDeleteEvent, ReadyEvent, UnavailableGuild};
use chat_gateway::{Dispatch, GatewayEventType};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::emitter::EventEmitter;
use crate::error::ClientError;
use crate::events::Event;
use crate::resolver::RestResolver;

/// Router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Dispatches processed
    pub routed: u64,
    /// Events handed to the emitter
    pub emitted: u64,
    /// Dispatches dropped because they could not be applied
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    routed: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

/// Applies dispatches to the cache and emits public events
pub struct EventRouter {
    cache: Arc<EntityCache>,
    resolver: RestResolver,
    emitter: Arc<EventEmitter>,
    current_user: RwLock<Option<Snowflake>>,
    counters: Counters,
}

impl EventRouter {
    pub fn new(cache: Arc<EntityCache>, resolver: RestResolver, emitter: Arc<EventEmitter>) -> Self {
        Self {
            cache,
            resolver,
            emitter,
            current_user: RwLock::new(None),
            counters: Counters::default(),
        }
    }

    /// Route dispatches until the gateway closes its channel
    pub async fn run(self: Arc<Self>, mut dispatches: mpsc::UnboundedReceiver<Dispatch>) {
        while let Some(dispatch) = dispatches.recv().await {
            self.route(dispatch).await;
        }
        tracing::debug!("Dispatch stream ended");
    }

    /// Apply one dispatch and emit its event. Returns the emitted event.
    pub async fn route(&self, dispatch: Dispatch) -> Option<Event> {
        self.counters.routed.fetch_add(1, Ordering::Relaxed);

        let Some(kind) = GatewayEventType::from_str(&dispatch.event) else {
            tracing::trace!(event = %dispatch.event, "Unhandled dispatch");
            return None;
        };

        match self.apply(kind, dispatch.data).await {
            Ok(Some(event)) => {
                if kind.is_session_event() {
                    tracing::info!(event = %kind, cached = ?self.cache.stats(), "Session event routed");
                }
                self.emitter.emit(event.clone());
                self.counters.emitted.fetch_add(1, Ordering::Relaxed);
                Some(event)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(
                    event = %kind,
                    seq = ?dispatch.sequence,
                    error = %err,
                    "Dropping event"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Id of the connected user, known after `READY`
    pub fn current_user(&self) -> Option<Snowflake> {
        *self.current_user.read()
    }

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.counters.routed.load(Ordering::Relaxed),
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    async fn apply(&self, kind: GatewayEventType, data: Value) -> Result<Option<Event>, ClientError> {
        let event = match kind {
            GatewayEventType::Ready => self.ready(&data)?,
            GatewayEventType::Resumed => Event::Resumed,

            GatewayEventType::GuildCreate => Event::GuildCreate(self.guild_create(&data)?),
            GatewayEventType::GuildUpdate => Event::GuildUpdate(self.cache.upsert_payload::<Guild>(&data)?),
            GatewayEventType::GuildDelete => self.guild_delete(data)?,

            GatewayEventType::ChannelCreate => Event::ChannelCreate(self.cache.upsert_payload::<Channel>(&data)?),
            GatewayEventType::ChannelUpdate => Event::ChannelUpdate(self.cache.upsert_payload::<Channel>(&data)?),
            GatewayEventType::ChannelDelete => self.channel_delete(data)?,

            GatewayEventType::MessageCreate => self.message_create(&data).await?,
            GatewayEventType::MessageUpdate => match self.message_update(&data)? {
                Some(message) => Event::MessageUpdate(message),
                None => return Ok(None),
            },
            GatewayEventType::MessageDelete => self.message_delete(data)?,

            GatewayEventType::GuildMemberAdd => {
                let (member, user) = self.member_upsert(&data)?;
                Event::MemberAdd { member, user }
            }
            GatewayEventType::GuildMemberUpdate => {
                let (member, user) = self.member_upsert(&data)?;
                Event::MemberUpdate { member, user }
            }
            GatewayEventType::GuildMemberRemove => self.member_remove(&data)?,

            GatewayEventType::UserUpdate => Event::UserUpdate(self.cache.upsert_payload::<User>(&data)?),
        };
        Ok(Some(event))
    }

    /// A fresh session: the mirror is stale, rebuild it
    fn ready(&self, data: &Value) -> Result<Event, ClientError> {
        let ready: ReadyEvent = serde_json::from_value(data.clone())?;
        self.cache.clear();

        let user = self.cache.upsert_payload::<User>(&ready.user)?;
        let user_id = user.read().id;
        *self.current_user.write() = Some(user_id);

        let mut guilds = Vec::with_capacity(ready.guilds.len());
        for stub in &ready.guilds {
            self.cache
                .upsert::<Guild>(stub.id, &json!({ "unavailable": stub.unavailable }))?;
            guilds.push(stub.id);
        }

        tracing::info!(
            session_id = %ready.session_id,
            user_id = %user_id,
            guilds = guilds.len(),
            "Ready"
        );
        Ok(Event::Ready { user, guilds })
    }

    /// Full guild payload: the guild, its channels, and its members
    fn guild_create(&self, data: &Value) -> Result<Cached<Guild>, ClientError> {
        let guild = self.cache.upsert_payload::<Guild>(data)?;
        let guild_id = guild.read().id;

        let mut channels = 0;
        for list in ["channels", "threads"] {
            for channel in embedded(data, list) {
                self.cache
                    .upsert_payload::<Channel>(&with_guild(channel, guild_id))?;
                channels += 1;
            }
        }

        let mut members = 0;
        for member in embedded(data, "members") {
            if let Some(user) = member.get("user") {
                self.cache.upsert_payload::<User>(user)?;
            }
            self.cache
                .upsert_payload::<GuildMember>(&with_guild(member, guild_id))?;
            members += 1;
        }

        tracing::debug!(guild_id = %guild_id, channels, members, "Guild cached");
        Ok(guild)
    }

    fn guild_delete(&self, data: Value) -> Result<Event, ClientError> {
        let stub: UnavailableGuild = serde_json::from_value(data)?;
        let guild = if stub.unavailable {
            tracing::warn!(guild_id = %stub.id, "Guild unavailable");
            Some(self.cache.upsert::<Guild>(stub.id, &json!({ "unavailable": true }))?)
        } else {
            self.cache.remove_guild(stub.id)
        };
        Ok(Event::GuildDelete {
            guild_id: stub.id,
            unavailable: stub.unavailable,
            guild,
        })
    }

    fn channel_delete(&self, data: Value) -> Result<Event, ClientError> {
        let IdOnly { id } = serde_json::from_value(data)?;
        let channel = self.cache.remove::<Channel>(id);
        let messages = self.cache.messages().remove_where(|m| m.channel_id == id);
        tracing::debug!(channel_id = %id, messages, "Channel removed");
        Ok(Event::ChannelDelete { channel_id: id, channel })
    }

    /// Resolve the author first, then cache the message. A malformed message
    /// is rejected before any related entry changes.
    async fn message_create(&self, data: &Value) -> Result<Event, ClientError> {
        self.cache.validate::<Message>(data)?;
        let author_id: Snowflake = serde_json::from_value(
            data.pointer("/author/id").cloned().unwrap_or(Value::Null),
        )?;

        let author = match self.cache.get::<User>(author_id) {
            Some(cached) => {
                // Cached authors pick up the embedded copy's fields
                if let Some(embedded) = data.get("author") {
                    self.cache.upsert::<User>(author_id, embedded)?;
                }
                cached
            }
            None => {
                self.cache
                    .get_or_resolve::<User, _>(author_id, &self.resolver)
                    .await?
            }
        };

        let guild_id: Option<Snowflake> =
            serde_json::from_value(data.get("guild_id").cloned().unwrap_or(Value::Null))?;
        if let (Some(guild_id), Some(member)) = (guild_id, data.get("member")) {
            self.cache
                .upsert::<GuildMember>(MemberKey::new(guild_id, author_id), member)?;
        }

        let message = self.cache.upsert_payload::<Message>(data)?;
        let (id, channel_id) = {
            let message = message.read();
            (message.id, message.channel_id)
        };
        if self.cache.channels().contains(channel_id) {
            self.cache
                .upsert::<Channel>(channel_id, &json!({ "last_message_id": id }))?;
        }

        Ok(Event::MessageCreate { message, author })
    }

    /// Partial updates only apply to messages already cached
    fn message_update(&self, data: &Value) -> Result<Option<Cached<Message>>, ClientError> {
        let IdOnly { id } = serde_json::from_value(data.clone())?;
        if !self.cache.messages().contains(id) && data.get("author").is_none() {
            tracing::debug!(message_id = %id, "Update for uncached message ignored");
            return Ok(None);
        }
        self.cache.validate::<Message>(data)?;
        if let Some(author) = data.get("author") {
            self.cache.upsert_payload::<User>(author)?;
        }
        Ok(Some(self.cache.upsert_payload::<Message>(data)?))
    }

    fn message_delete(&self, data: Value) -> Result<Event, ClientError> {
        let deleted: MessageDeleteEvent = serde_json::from_value(data)?;
        Ok(Event::MessageDelete {
            id: deleted.id,
            channel_id: deleted.channel_id,
            guild_id: deleted.guild_id,
            message: self.cache.remove::<Message>(deleted.id),
        })
    }

    /// Member add and update carry the full user object
    fn member_upsert(&self, data: &Value) -> Result<(Cached<GuildMember>, Cached<User>), ClientError> {
        let user = self
            .cache
            .upsert_payload::<User>(data.get("user").unwrap_or(&Value::Null))?;
        let member = self.cache.upsert_payload::<GuildMember>(data)?;
        Ok((member, user))
    }

    fn member_remove(&self, data: &Value) -> Result<Event, ClientError> {
        let removed: GuildMemberRemoveEvent = serde_json::from_value(data.clone())?;
        let user = self
            .cache
            .upsert_payload::<User>(data.get("user").unwrap_or(&Value::Null))?;
        let member = self
            .cache
            .remove::<GuildMember>(MemberKey::new(removed.guild_id, removed.user.id));
        Ok(Event::MemberRemove {
            guild_id: removed.guild_id,
            user,
            member,
        })
    }
}

/// Objects in an embedded array field
fn embedded<'a>(data: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    data.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Copy of an embedded object with its guild id filled in
fn with_guild(value: &Value, guild_id: Snowflake) -> Value {
    let mut value = value.clone();
    if let Value::Object(map) = &mut value {
        map.entry("guild_id").or_insert_with(|| json!(guild_id));
    }
    value
}
