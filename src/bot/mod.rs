/// Album (media group) buffering
pub mod album;
/// Reply delivery
pub mod dispatcher;
/// Update endpoints
pub mod handlers;
/// Telegram conversions and Bot API adapters
pub mod telegram;

pub use album::AlbumCollector;
pub use dispatcher::{ChatSink, ReplyDispatcher, ReplyTarget, SendError};
