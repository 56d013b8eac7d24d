//! Bot credentials

mod token;

pub use token::{BotToken, TokenError};
