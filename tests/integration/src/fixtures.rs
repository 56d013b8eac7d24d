//! Test fixtures and payload builders
//!
//! Provides wire payloads shaped the way the platform sends them.

use serde_json::{json, Value};

use crate::helpers::MockReply;

/// Id of the user every test client connects as
pub const SELF_USER_ID: u64 = 1;

pub fn user(id: u64, username: &str) -> Value {
    json!({
        "id": id.to_string(),
        "username": username,
        "discriminator": "0",
        "global_name": null,
        "avatar": null,
        "bot": false
    })
}

pub fn self_user() -> Value {
    let mut user = user(SELF_USER_ID, "integration-bot");
    user["bot"] = Value::Bool(true);
    user
}

pub fn text_channel(id: u64, guild_id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "type": 0,
        "guild_id": guild_id.to_string(),
        "name": name,
        "position": 0,
        "nsfw": false
    })
}

/// `GUILD_CREATE` payload with embedded channels
pub fn guild(id: u64, name: &str, channels: &[Value]) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "owner_id": SELF_USER_ID.to_string(),
        "member_count": 1,
        "channels": channels,
        "members": [],
        "threads": []
    })
}

pub fn message(id: u64, channel_id: u64, guild_id: Option<u64>, author: &Value, content: &str) -> Value {
    let mut message = json!({
        "id": id.to_string(),
        "channel_id": channel_id.to_string(),
        "author": author,
        "content": content,
        "timestamp": "2024-01-01T00:00:00.000000+00:00",
        "edited_timestamp": null,
        "tts": false,
        "mention_everyone": false,
        "pinned": false
    });
    if let Some(guild_id) = guild_id {
        message["guild_id"] = Value::String(guild_id.to_string());
    }
    message
}

/// `READY` payload listing guilds as unavailable stubs
pub fn ready(session_id: &str, guild_ids: &[u64]) -> Value {
    let guilds: Vec<Value> = guild_ids
        .iter()
        .map(|id| json!({ "id": id.to_string(), "unavailable": true }))
        .collect();
    json!({
        "v": 10,
        "user": self_user(),
        "guilds": guilds,
        "session_id": session_id
    })
}

pub fn gateway_bot(url: &str) -> Value {
    json!({
        "url": url,
        "shards": 1,
        "session_start_limit": {
            "total": 1000,
            "remaining": 999,
            "reset_after": 14_400_000,
            "max_concurrency": 1
        }
    })
}

/// A 200 that also reports bucket state
pub fn with_bucket(reply: MockReply, bucket: &str, remaining: u32, reset_after_secs: f64) -> MockReply {
    reply
        .header("x-ratelimit-bucket", bucket)
        .header("x-ratelimit-limit", 5)
        .header("x-ratelimit-remaining", remaining)
        .header("x-ratelimit-reset-after", reset_after_secs)
}

/// A route-scoped 429
pub fn rate_limited(bucket: &str, retry_after_secs: f64) -> MockReply {
    MockReply::json(
        429,
        json!({
            "message": "You are being rate limited.",
            "retry_after": retry_after_secs,
            "global": false
        }),
    )
    .header("x-ratelimit-bucket", bucket)
    .header("x-ratelimit-limit", 5)
    .header("x-ratelimit-remaining", 0)
    .header("x-ratelimit-reset-after", retry_after_secs)
    .header("x-ratelimit-scope", "user")
    .header("retry-after", retry_after_secs)
}
