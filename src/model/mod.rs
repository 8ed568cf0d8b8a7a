//! Domain entities, independent of how they are stored.

mod channel;
mod message;
mod session;
mod user;

pub use channel::{Channel, ChannelKind, ChannelMember, MemberRole};
pub use message::{Mention, Message, MessageOutbox, OutboxStatus};
pub use session::{DeviceSession, PresenceStatus, UserChannelReadStatus};
pub use user::{User, UserKind};
