//! REST route catalog and request/response shapes

use std::fmt;

use chat_core::Snowflake;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RestError;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Endpoints used by the client runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    GetGatewayBot,
    GetCurrentUser,
    GetUser {
        user_id: Snowflake,
    },
    GetGuild {
        guild_id: Snowflake,
    },
    GetGuildMember {
        guild_id: Snowflake,
        user_id: Snowflake,
    },
    GetChannel {
        channel_id: Snowflake,
    },
    GetMessage {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
    CreateMessage {
        channel_id: Snowflake,
    },
    EditMessage {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
    DeleteMessage {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
    /// Add the current user's reaction. `emoji` is a unicode emoji or `name:id`.
    CreateReaction {
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: String,
    },
    PinMessage {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
    UnpinMessage {
        channel_id: Snowflake,
        message_id: Snowflake,
    },
}

impl Route {
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::GetGatewayBot
            | Self::GetCurrentUser
            | Self::GetUser { .. }
            | Self::GetGuild { .. }
            | Self::GetGuildMember { .. }
            | Self::GetChannel { .. }
            | Self::GetMessage { .. } => Method::Get,
            Self::CreateMessage { .. } => Method::Post,
            Self::EditMessage { .. } => Method::Patch,
            Self::DeleteMessage { .. } | Self::UnpinMessage { .. } => Method::Delete,
            Self::CreateReaction { .. } | Self::PinMessage { .. } => Method::Put,
        }
    }

    /// Path relative to the API base, with parameters substituted
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::GetGatewayBot => "/gateway/bot".to_string(),
            Self::GetCurrentUser => "/users/@me".to_string(),
            Self::GetUser { user_id } => format!("/users/{user_id}"),
            Self::GetGuild { guild_id } => format!("/guilds/{guild_id}"),
            Self::GetGuildMember { guild_id, user_id } => {
                format!("/guilds/{guild_id}/members/{user_id}")
            }
            Self::GetChannel { channel_id } => format!("/channels/{channel_id}"),
            Self::CreateMessage { channel_id } => format!("/channels/{channel_id}/messages"),
            Self::GetMessage {
                channel_id,
                message_id,
            }
            | Self::EditMessage {
                channel_id,
                message_id,
            }
            | Self::DeleteMessage {
                channel_id,
                message_id,
            } => format!("/channels/{channel_id}/messages/{message_id}"),
            Self::CreateReaction {
                channel_id,
                message_id,
                emoji,
            } => {
                let encoded: String = url::form_urlencoded::byte_serialize(emoji.as_bytes()).collect();
                format!("/channels/{channel_id}/messages/{message_id}/reactions/{encoded}/@me")
            }
            Self::PinMessage {
                channel_id,
                message_id,
            }
            | Self::UnpinMessage {
                channel_id,
                message_id,
            } => format!("/channels/{channel_id}/pins/{message_id}"),
        }
    }

    /// Request without a body
    #[must_use]
    pub fn request(&self) -> Request {
        Request::new(self.method(), self.path())
    }
}

/// One outbound REST call. The body is opaque JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Audit log reason header
    pub reason: Option<String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            reason: None,
        }
    }

    /// Attach a JSON body produced by any serializable builder
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, RestError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<Route> for Request {
    fn from(route: Route) -> Self {
        route.request()
    }
}

/// A completed response (any status)
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RestResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body. An empty body (204) decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RestError> {
        if self.body.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// `GET /gateway/bot` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    #[serde(default)]
    pub shards: u32,
    pub session_start_limit: Option<SessionStartLimit>,
}

/// Identify budget for the current window
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    pub reset_after: u64,
    pub max_concurrency: u32,
}
