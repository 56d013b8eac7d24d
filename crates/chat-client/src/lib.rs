//! # chat-client
//!
//! Ties the REST dispatcher, entity cache, and gateway connection together.
//! Gateway dispatches are routed into the cache and re-emitted as typed
//! [`Event`]s carrying shared references to the cached entities.
//!
//! ```no_run
//! use chat_client::{Client, Event};
//! use chat_common::{BotToken, ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::new(BotToken::new("token")?))?;
//!
//! let replier = client.clone();
//! client.on(move |event| {
//!     if let Event::MessageCreate { message, .. } = event {
//!         let message = message.snapshot();
//!         if message.content == "!ping" {
//!             let client = replier.clone();
//!             tokio::spawn(async move { client.say(message.channel_id, "pong").await });
//!         }
//!     }
//! });
//!
//! client.start().await?;
//! client.wait().await?;
//! # Ok(())
//! # }
//! ```

mod actions;
pub mod client;
pub mod emitter;
pub mod error;
pub mod events;
pub mod resolver;
pub mod router;

#[cfg(test)]
mod testing;

pub use client::{Client, ClientBuilder, ClientState};
pub use emitter::EventEmitter;
pub use error::ClientError;
pub use events::Event;
pub use resolver::RestResolver;
pub use router::{EventRouter, RouterStats};
