//! Remote entity records held by the cache

mod channel;
mod entity;
mod guild;
mod member;
mod message;
mod user;

pub use channel::{Channel, ChannelType};
pub use entity::{Entity, EntityKind};
pub use guild::Guild;
pub use member::{GuildMember, MemberKey};
pub use message::{Message, MessageReference};
pub use user::User;
