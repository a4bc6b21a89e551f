//! Message adapter
//!
//! Merges out-of-band enrichments into a [`ChatMessage`] and projects it into
//! the compact JSON document the model receives. Pure, no I/O.

use crate::chat::{
    Attachment, AudioFile, ChatInfo, ChatMessage, MessageLocation, PhotoFile, Sender, Slot,
    StickerFile, VoiceFile,
};
use crate::geo::LocationRecord;
use crate::media::MediaBlob;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Side-channel input accompanying a message for one turn.
#[derive(Debug, Clone)]
pub enum TurnInput {
    /// Resolved location; rewrites the message instead of being sent as a part
    Location(LocationRecord),
    /// Normalized media sent alongside the message
    Media(MediaBlob),
    /// Literal text sent alongside the message
    Text(String),
}

/// Extra content sent to the model before the serialized message.
#[derive(Debug, Clone)]
pub enum InputPart {
    Media(MediaBlob),
    Text(String),
}

/// Apply enrichments to `message` and collect what is left as extra parts.
///
/// Location records replace the message location and are consumed; every
/// other input passes through in its original order.
#[must_use]
pub fn merge_inputs(message: ChatMessage, inputs: Vec<TurnInput>) -> (ChatMessage, Vec<InputPart>) {
    inputs
        .into_iter()
        .fold((message, Vec::new()), |(message, mut parts), input| match input {
            TurnInput::Location(record) => (message.with_resolved_location(record), parts),
            TurnInput::Media(blob) => {
                parts.push(InputPart::Media(blob));
                (message, parts)
            }
            TurnInput::Text(text) => {
                parts.push(InputPart::Text(text));
                (message, parts)
            }
        })
}

/// JSON projection of a [`ChatMessage`] as seen by the model.
///
/// Every optional field is a [`Slot`]; unset and null fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub message_id: i32,
    pub date: DateTime<Utc>,
    pub chat: ChatInfo,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub message_thread_id: Slot<i32>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub from_user: Slot<Sender>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub reply_to_message: Slot<Box<ModelRequest>>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub forward_origin: Slot<Value>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub text: Slot<String>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub audio: Slot<AudioFile>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub photo: Slot<Vec<PhotoFile>>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub sticker: Slot<StickerFile>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub voice: Slot<VoiceFile>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub caption: Slot<String>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub dice: Slot<Value>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub poll: Slot<Value>,
    #[serde(skip_serializing_if = "Slot::is_omitted")]
    pub location: Slot<MessageLocation>,
}

impl From<&ChatMessage> for ModelRequest {
    fn from(message: &ChatMessage) -> Self {
        let mut request = Self {
            message_id: message.message_id,
            date: message.date,
            chat: message.chat.clone(),
            message_thread_id: message.thread_id.into(),
            from_user: message.from_user.clone().into(),
            reply_to_message: message
                .reply_to
                .as_deref()
                .map(|parent| Box::new(Self::from(parent)))
                .into(),
            forward_origin: opaque(message.forward_origin.as_ref()),
            text: message.text.clone().into(),
            audio: Slot::Unset,
            photo: Slot::Unset,
            sticker: Slot::Unset,
            voice: Slot::Unset,
            caption: Slot::Unset,
            dice: opaque(message.dice.as_ref()),
            poll: opaque(message.poll.as_ref()),
            location: message.location.clone().into(),
        };

        // Captions only exist on media messages.
        if let Some(attachment) = &message.attachment {
            request.caption = message.caption.clone().into();
            match attachment {
                Attachment::Audio(audio) => request.audio = Slot::Value(audio.clone()),
                Attachment::Photo(sizes) => request.photo = Slot::Value(sizes.clone()),
                Attachment::Sticker(sticker) => request.sticker = Slot::Value(sticker.clone()),
                Attachment::Voice(voice) => request.voice = Slot::Value(voice.clone()),
            }
        }
        request
    }
}

fn opaque(payload: Option<&Value>) -> Slot<Value> {
    payload.cloned().and_then(prune_nulls).into()
}

/// Recursively drop `null` members and elements from a JSON value.
///
/// Returns `None` if the value itself is `null`.
#[must_use]
pub fn prune_nulls(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(prune_nulls).collect(),
        )),
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(key, value)| prune_nulls(value).map(|value| (key, value)))
                .collect(),
        )),
        other => Some(other),
    }
}

/// Serialize a message into the compact JSON sent to the model.
///
/// # Errors
///
/// Returns the serializer error; only possible with non-finite floats.
pub fn serialize_request(message: &ChatMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ModelRequest::from(message))
}
