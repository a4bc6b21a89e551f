//! Canonical inbound chat message
//!
//! Transport-agnostic representation of one inbound Telegram event. Built
//! fresh per update by `bot::telegram` and never mutated afterwards:
//! enrichment produces a new value.

mod slot;

pub use slot::Slot;

use crate::geo::LocationRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Content kinds the bot distinguishes when routing updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Plain text message
    Text,
    /// Animated emoji with a random value
    Dice,
    /// Poll
    Poll,
    /// Shared location
    Location,
    /// Photo (possibly part of an album)
    Photo,
    /// Sticker of any format
    Sticker,
    /// Voice note
    Voice,
    /// Audio file (possibly part of an album)
    Audio,
    /// Anything the bot does not handle
    Other,
}

/// Chat the message was posted in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatInfo {
    /// Telegram chat id
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl ChatInfo {
    /// Minimal chat description with only an id and a type.
    #[must_use]
    pub fn new(id: i64, kind: &str) -> Self {
        Self {
            id,
            kind: kind.to_string(),
            title: None,
            username: None,
            first_name: None,
            last_name: None,
        }
    }
}

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sender {
    pub id: u64,
    pub is_bot: bool,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_premium: bool,
}

/// Audio file metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFile {
    #[serde(skip)]
    pub file_id: String,
    pub file_unique_id: String,
    pub duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// MIME type declared by the sender
    #[serde(skip)]
    pub mime_type: Option<String>,
}

/// One size variant of a photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoFile {
    #[serde(skip)]
    pub file_id: String,
    pub file_unique_id: String,
}

/// Encoding of a sticker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StickerFormat {
    /// WEBP/PNG raster
    #[default]
    Static,
    /// Gzipped Lottie animation (`.tgs`)
    Animated,
    /// WEBM video
    Video,
}

/// Sticker metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StickerFile {
    #[serde(skip)]
    pub file_id: String,
    pub file_unique_id: String,
    /// `regular`, `mask` or `custom_emoji`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    #[serde(skip)]
    pub format: StickerFormat,
}

/// Voice note metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceFile {
    #[serde(skip)]
    pub file_id: String,
    pub file_unique_id: String,
    pub duration: u32,
}

/// The single downloadable attachment a message may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    Audio(AudioFile),
    /// All size variants, smallest first
    Photo(Vec<PhotoFile>),
    Sticker(StickerFile),
    Voice(VoiceFile),
}

impl Attachment {
    /// File id of the variant to download (the largest photo size).
    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::Audio(a) => Some(&a.file_id),
            Self::Photo(sizes) => sizes.last().map(|p| p.file_id.as_str()),
            Self::Sticker(s) => Some(&s.file_id),
            Self::Voice(v) => Some(&v.file_id),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ContentKind {
        match self {
            Self::Audio(_) => ContentKind::Audio,
            Self::Photo(_) => ContentKind::Photo,
            Self::Sticker(_) => ContentKind::Sticker,
            Self::Voice(_) => ContentKind::Voice,
        }
    }
}

/// Raw coordinates as shared by the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
}

/// Location carried by a message, before or after reverse geocoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageLocation {
    Point(GeoPoint),
    Resolved(LocationRecord),
}

/// One inbound chat event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub message_id: i32,
    pub date: DateTime<Utc>,
    pub chat: ChatInfo,
    /// Forum topic the message belongs to
    pub thread_id: Option<i32>,
    pub from_user: Option<Sender>,
    pub reply_to: Option<Box<ChatMessage>>,
    /// Bot API `MessageOrigin` payload
    pub forward_origin: Option<Value>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub attachment: Option<Attachment>,
    /// Bot API `Dice` payload
    pub dice: Option<Value>,
    /// Bot API `Poll` payload
    pub poll: Option<Value>,
    pub location: Option<MessageLocation>,
    pub media_group_id: Option<String>,
}

impl ChatMessage {
    /// Empty message shell; callers fill in the fields they have.
    #[must_use]
    pub const fn new(message_id: i32, chat: ChatInfo, date: DateTime<Utc>) -> Self {
        Self {
            message_id,
            date,
            chat,
            thread_id: None,
            from_user: None,
            reply_to: None,
            forward_origin: None,
            text: None,
            caption: None,
            attachment: None,
            dice: None,
            poll: None,
            location: None,
            media_group_id: None,
        }
    }

    /// Routing kind of the message.
    #[must_use]
    pub fn content_kind(&self) -> ContentKind {
        if let Some(attachment) = &self.attachment {
            return attachment.kind();
        }
        if self.dice.is_some() {
            ContentKind::Dice
        } else if self.poll.is_some() {
            ContentKind::Poll
        } else if self.location.is_some() {
            ContentKind::Location
        } else if self.text.is_some() {
            ContentKind::Text
        } else {
            ContentKind::Other
        }
    }

    /// Copy of this message with its location replaced by a resolved record.
    #[must_use]
    pub fn with_resolved_location(self, record: LocationRecord) -> Self {
        Self {
            location: Some(MessageLocation::Resolved(record)),
            ..self
        }
    }

    /// Raw coordinates, if the message still carries an unresolved point.
    #[must_use]
    pub const fn geo_point(&self) -> Option<&GeoPoint> {
        match &self.location {
            Some(MessageLocation::Point(point)) => Some(point),
            _ => None,
        }
    }
}
