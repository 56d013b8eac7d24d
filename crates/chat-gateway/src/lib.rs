//! # chat-gateway
//!
//! Client side of the real-time gateway: frame protocol, session tracking,
//! heartbeating, and a connection that resumes or re-identifies on its own.
//!
//! ```no_run
//! use chat_common::BotToken;
//! use chat_gateway::{GatewayConnection, GatewayOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let token = BotToken::new("token")?;
//! let (connection, handle, mut dispatches) =
//!     GatewayConnection::new(GatewayOptions::new("wss://gateway.discord.gg", token));
//! tokio::spawn(connection.run());
//!
//! while let Some(dispatch) = dispatches.recv().await {
//!     println!("{} #{:?}", dispatch.event, dispatch.sequence);
//! }
//! handle.close();
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;

pub use connection::{
    ConnectionStatus, Dispatch, GatewayConnection, GatewayHandle, GatewayOptions, GatewayStats, Session,
};
pub use error::GatewayError;
pub use events::GatewayEventType;
pub use protocol::{GatewayMessage, OpCode};
