//! Value objects - immutable types that represent domain concepts

mod cdn;
mod intents;
mod snowflake;

pub use cdn::{Cdn, ImageFormat, ImageOptions, DEFAULT_CDN_URL};
pub use intents::Intents;
pub use snowflake::{Snowflake, SnowflakeParseError};
