//! Client configuration
//!
//! Loads configuration from environment variables or a config file layered with
//! `CHAT__`-prefixed environment overrides.

use std::env;
use std::path::Path;
use std::time::Duration;

use chat_core::Intents;
use serde::Deserialize;

use crate::auth::{BotToken, TokenError};

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub token: BotToken,
    pub rest: RestConfig,
    pub gateway: GatewayConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
    pub cdn_url: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: Environment::default(),
            cdn_url: default_cdn_url(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// REST dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub api_base_url: String,
    pub user_agent: String,
    /// Retries for 5xx, transport errors, and 429s without a retry-after
    pub max_retries: u32,
    pub timeout_ms: u64,
    /// Account-wide request budget per second
    pub global_per_second: u32,
    /// Resources whose id stays in the bucket key
    pub major_parameters: Vec<String>,
    /// Resources whose following segment collapses into the bucket key
    pub opaque_parameters: Vec<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            global_per_second: default_global_per_second(),
            major_parameters: default_major_parameters(),
            opaque_parameters: default_opaque_parameters(),
        }
    }
}

impl RestConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Gateway connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Fixed gateway URL. When unset the URL is discovered over REST.
    pub url: Option<String>,
    pub intents: Intents,
    /// Consecutive failed connection attempts before giving up
    pub max_reconnects: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub hello_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            intents: Intents::default(),
            max_reconnects: default_max_reconnects(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            hello_timeout_ms: default_hello_timeout_ms(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }
}

// Default value functions
fn default_app_name() -> String {
    "chat-client".to_string()
}

fn default_cdn_url() -> String {
    chat_core::value_objects::DEFAULT_CDN_URL.to_string()
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/seung/chat-client, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_global_per_second() -> u32 {
    50
}

fn default_major_parameters() -> Vec<String> {
    vec!["channels".into(), "guilds".into(), "users".into(), "webhooks".into()]
}

fn default_opaque_parameters() -> Vec<String> {
    vec!["reactions".into()]
}

fn default_max_reconnects() -> u32 {
    10
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_hello_timeout_ms() -> u64 {
    30_000
}

fn list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}

/// Parse an optional numeric variable, rejecting values that are present but invalid
fn parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

/// Shape of a config file; the token is validated after deserialization
#[derive(Deserialize)]
struct FileConfig {
    token: String,
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    rest: RestConfig,
    #[serde(default)]
    gateway: GatewayConfig,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: BotToken) -> Self {
        Self {
            app: AppSettings::default(),
            token,
            rest: RestConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `BOT_TOKEN` is missing or a variable has an invalid value
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingVar("BOT_TOKEN"))?;

        let intents = match env::var("GATEWAY_INTENTS") {
            Ok(raw) => Intents::parse(&raw)
                .map_err(|_| ConfigError::InvalidValue("GATEWAY_INTENTS", raw))?,
            Err(_) => Intents::default(),
        };

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: match env::var("APP_ENV") {
                    Ok(raw) => Environment::parse(&raw)
                        .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
                    Err(_) => Environment::default(),
                },
                cdn_url: env::var("CDN_BASE_URL").unwrap_or_else(|_| default_cdn_url()),
            },
            token: BotToken::new(token)?,
            rest: RestConfig {
                api_base_url: env::var("API_BASE_URL")
                    .unwrap_or_else(|_| default_api_base_url()),
                user_agent: env::var("REST_USER_AGENT").unwrap_or_else(|_| default_user_agent()),
                max_retries: parsed("REST_MAX_RETRIES")?.unwrap_or_else(default_max_retries),
                timeout_ms: parsed("REST_TIMEOUT_MS")?.unwrap_or_else(default_timeout_ms),
                global_per_second: parsed("REST_GLOBAL_PER_SECOND")?
                    .unwrap_or_else(default_global_per_second),
                major_parameters: env::var("REST_MAJOR_PARAMETERS")
                    .map(|s| list(&s))
                    .unwrap_or_else(|_| default_major_parameters()),
                opaque_parameters: env::var("REST_OPAQUE_PARAMETERS")
                    .map(|s| list(&s))
                    .unwrap_or_else(|_| default_opaque_parameters()),
            },
            gateway: GatewayConfig {
                url: env::var("GATEWAY_URL").ok().filter(|s| !s.trim().is_empty()),
                intents,
                max_reconnects: parsed("GATEWAY_MAX_RECONNECTS")?
                    .unwrap_or_else(default_max_reconnects),
                backoff_base_ms: parsed("GATEWAY_BACKOFF_BASE_MS")?
                    .unwrap_or_else(default_backoff_base_ms),
                backoff_max_ms: parsed("GATEWAY_BACKOFF_MAX_MS")?
                    .unwrap_or_else(default_backoff_max_ms),
                hello_timeout_ms: parsed("GATEWAY_HELLO_TIMEOUT_MS")?
                    .unwrap_or_else(default_hello_timeout_ms),
            },
        })
    }

    /// Load configuration from a file (TOML, YAML, or JSON by extension), with
    /// `CHAT__SECTION__KEY` environment variables taking precedence
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CHAT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let file: FileConfig = settings.try_deserialize()?;

        Ok(Self {
            app: file.app,
            token: BotToken::new(file.token)?,
            rest: file.rest,
            gateway: file.gateway,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid bot token: {0}")]
    Token(#[from] TokenError),

    #[error("Config file error: {0}")]
    File(#[from] config::ConfigError),
}
