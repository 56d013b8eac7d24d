//! # chat-common
//!
//! Shared utilities including configuration, REST error bodies, bot credentials,
//! retry backoff, and telemetry.

pub mod auth;
pub mod backoff;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{BotToken, TokenError};
pub use backoff::Backoff;
pub use config::{AppSettings, ClientConfig, ConfigError, Environment, GatewayConfig, RestConfig};
pub use error::{ApiError, ApiErrorBody};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
