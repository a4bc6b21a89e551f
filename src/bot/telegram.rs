//! Telegram transport glue
//!
//! Converts teloxide updates into [`ChatMessage`]s and implements the media
//! and reply traits on top of the Bot API client.

use super::dispatcher::{ChatSink, ReplyTarget, SendError};
use crate::chat::{
    Attachment, AudioFile, ChatInfo, ChatMessage, ContentKind, GeoPoint, MessageLocation,
    PhotoFile, Sender, StickerFile, StickerFormat, VoiceFile,
};
use crate::media::{FileSource, MediaError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use teloxide::net::Download;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{
    Chat, FileId, MessageId, ParseMode, ReplyParameters, Sticker, ThreadId, User,
};
use teloxide::{ApiError, RequestError};
use tracing::warn;

/// Routing kind of a raw Telegram message.
#[must_use]
pub fn content_kind(msg: &Message) -> ContentKind {
    if msg.text().is_some() {
        ContentKind::Text
    } else if msg.dice().is_some() {
        ContentKind::Dice
    } else if msg.poll().is_some() {
        ContentKind::Poll
    } else if msg.location().is_some() {
        ContentKind::Location
    } else if msg.photo().is_some() {
        ContentKind::Photo
    } else if msg.sticker().is_some() {
        ContentKind::Sticker
    } else if msg.voice().is_some() {
        ContentKind::Voice
    } else if msg.audio().is_some() {
        ContentKind::Audio
    } else {
        ContentKind::Other
    }
}

/// Whether the message is one item of a photo or audio album.
#[must_use]
pub fn is_album_item(msg: &Message) -> bool {
    msg.media_group_id().is_some()
        && matches!(content_kind(msg), ContentKind::Photo | ContentKind::Audio)
}

/// Build the canonical message from a Telegram update.
#[must_use]
pub fn chat_message(msg: &Message) -> ChatMessage {
    let mut message = ChatMessage::new(msg.id.0, chat_info(&msg.chat), msg.date);
    message.thread_id = msg
        .thread_id
        .filter(|_| msg.is_topic_message)
        .map(|ThreadId(MessageId(id))| id);
    message.from_user = msg.from.as_ref().map(sender);
    message.reply_to = msg.reply_to_message().map(|parent| Box::new(chat_message(parent)));
    message.forward_origin = msg.forward_origin().and_then(to_payload);
    message.text = msg.text().map(ToString::to_string);
    message.caption = msg.caption().map(ToString::to_string);
    message.attachment = attachment(msg);
    message.dice = msg.dice().and_then(to_payload);
    message.poll = msg.poll().and_then(to_payload);
    message.location = msg.location().map(|location| {
        MessageLocation::Point(GeoPoint {
            latitude: location.latitude,
            longitude: location.longitude,
            horizontal_accuracy: location.horizontal_accuracy,
        })
    });
    message.media_group_id = msg.media_group_id().map(ToString::to_string);
    message
}

fn to_payload<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

fn chat_info(chat: &Chat) -> ChatInfo {
    let kind = if chat.is_private() {
        "private"
    } else if chat.is_channel() {
        "channel"
    } else if chat.is_supergroup() {
        "supergroup"
    } else {
        "group"
    };
    ChatInfo {
        id: chat.id.0,
        kind: kind.to_string(),
        title: chat.title().map(ToString::to_string),
        username: chat.username().map(ToString::to_string),
        first_name: chat.first_name().map(ToString::to_string),
        last_name: chat.last_name().map(ToString::to_string),
    }
}

fn sender(user: &User) -> Sender {
    Sender {
        id: user.id.0,
        is_bot: user.is_bot,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
        language_code: user.language_code.clone(),
        is_premium: user.is_premium,
    }
}

fn attachment(msg: &Message) -> Option<Attachment> {
    if let Some(audio) = msg.audio() {
        return Some(Attachment::Audio(AudioFile {
            file_id: audio.file.id.0.clone(),
            file_unique_id: audio.file.unique_id.0.clone(),
            duration: audio.duration.seconds(),
            performer: audio.performer.clone(),
            title: audio.title.clone(),
            file_name: audio.file_name.clone(),
            mime_type: audio.mime_type.as_ref().map(ToString::to_string),
        }));
    }
    if let Some(sizes) = msg.photo() {
        return Some(Attachment::Photo(
            sizes
                .iter()
                .map(|size| PhotoFile {
                    file_id: size.file.id.0.clone(),
                    file_unique_id: size.file.unique_id.0.clone(),
                })
                .collect(),
        ));
    }
    if let Some(sticker) = msg.sticker() {
        return Some(Attachment::Sticker(sticker_file(sticker)));
    }
    msg.voice().map(|voice| {
        Attachment::Voice(VoiceFile {
            file_id: voice.file.id.0.clone(),
            file_unique_id: voice.file.unique_id.0.clone(),
            duration: voice.duration.seconds(),
        })
    })
}

fn sticker_file(sticker: &Sticker) -> StickerFile {
    let kind = if sticker.is_mask() {
        "mask"
    } else if sticker.is_custom_emoji() {
        "custom_emoji"
    } else {
        "regular"
    };
    let format = if sticker.is_animated() {
        StickerFormat::Animated
    } else if sticker.is_video() {
        StickerFormat::Video
    } else {
        StickerFormat::Static
    };
    StickerFile {
        file_id: sticker.file.id.0.clone(),
        file_unique_id: sticker.file.unique_id.0.clone(),
        kind: kind.to_string(),
        emoji: sticker.emoji.clone(),
        set_name: sticker.set_name.clone(),
        format,
    }
}

#[async_trait]
impl FileSource for Bot {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, MediaError> {
        let file = self
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?;
        let mut buf = Vec::new();
        self.download_file(&file.path, &mut buf)
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?;
        Ok(buf)
    }
}

/// Whether Telegram refused the message markup.
fn is_markup_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::CantParseEntities(_)))
        || error.to_string().contains("can't parse entities")
}

async fn send_reply(
    bot: &Bot,
    target: ReplyTarget,
    text: &str,
    reply_to: Option<i32>,
    parse_mode: Option<ParseMode>,
) -> Result<(), RequestError> {
    let mut request = bot.send_message(ChatId(target.chat_id), text);
    if let Some(mode) = parse_mode {
        request = request.parse_mode(mode);
    }
    if let Some(thread_id) = target.thread_id {
        request = request.message_thread_id(ThreadId(MessageId(thread_id)));
    }
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(
            ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply(),
        );
    }
    request.await.map(|_| ())
}

#[async_trait]
impl ChatSink for Bot {
    /// Sends with legacy Markdown, retrying as plain text if the markup is rejected.
    #[allow(deprecated)]
    async fn send_text(
        &self,
        target: ReplyTarget,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<(), SendError> {
        match send_reply(self, target, text, reply_to, Some(ParseMode::Markdown)).await {
            Err(e) if is_markup_error(&e) => {
                warn!(chat_id = target.chat_id, "Markdown rejected, sending as plain text: {e}");
                send_reply(self, target, text, reply_to, None).await
            }
            other => other,
        }
        .map_err(|e| SendError::Telegram(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn telegram_message(extra: Value) -> Result<Message, serde_json::Error> {
        let mut base = json!({
            "message_id": 77,
            "date": 1_725_000_000,
            "chat": {"id": -1001, "type": "supergroup", "title": "Lounge", "is_forum": true},
            "from": {"id": 5, "is_bot": false, "first_name": "Ann", "username": "ann", "language_code": "en"}
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base)
    }

    #[test]
    fn text_message_is_converted() -> Result<(), serde_json::Error> {
        let msg = telegram_message(json!({"text": "hello"}))?;
        assert_eq!(content_kind(&msg), ContentKind::Text);

        let message = chat_message(&msg);
        assert_eq!(message.message_id, 77);
        assert_eq!(message.chat.id, -1001);
        assert_eq!(message.chat.kind, "supergroup");
        assert_eq!(message.chat.title.as_deref(), Some("Lounge"));
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert_eq!(message.from_user.as_ref().map(|u| u.id), Some(5));
        assert_eq!(message.thread_id, None);
        assert_eq!(message.content_kind(), ContentKind::Text);
        Ok(())
    }

    #[test]
    fn topic_reply_keeps_thread_and_parent() -> Result<(), serde_json::Error> {
        let msg = telegram_message(json!({
            "text": "in topic",
            "message_thread_id": 9,
            "is_topic_message": true,
            "reply_to_message": {
                "message_id": 70,
                "date": 1_724_999_000,
                "chat": {"id": -1001, "type": "supergroup", "title": "Lounge", "is_forum": true},
                "text": "earlier"
            }
        }))?;

        let message = chat_message(&msg);
        assert_eq!(message.thread_id, Some(9));
        let parent = message.reply_to.as_deref();
        assert_eq!(parent.map(|p| p.message_id), Some(70));
        assert_eq!(parent.and_then(|p| p.text.as_deref()), Some("earlier"));
        assert_eq!(ReplyTarget::from(&message).thread_id, Some(9));
        Ok(())
    }

    #[test]
    fn animated_sticker_is_tagged() -> Result<(), serde_json::Error> {
        let msg = telegram_message(json!({
            "sticker": {
                "file_id": "CAAC-file",
                "file_unique_id": "AgAD",
                "type": "regular",
                "width": 512,
                "height": 512,
                "is_animated": true,
                "is_video": false,
                "emoji": "🐱",
                "set_name": "cats"
            }
        }))?;
        assert_eq!(content_kind(&msg), ContentKind::Sticker);

        match chat_message(&msg).attachment {
            Some(Attachment::Sticker(sticker)) => {
                assert_eq!(sticker.file_id, "CAAC-file");
                assert_eq!(sticker.format, StickerFormat::Animated);
                assert_eq!(sticker.kind, "regular");
                assert_eq!(sticker.set_name.as_deref(), Some("cats"));
            }
            other => panic!("expected sticker, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn album_photo_is_detected() -> Result<(), serde_json::Error> {
        let msg = telegram_message(json!({
            "media_group_id": "1357",
            "caption": "trip",
            "photo": [
                {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 60},
                {"file_id": "big", "file_unique_id": "b", "width": 1280, "height": 853}
            ]
        }))?;
        assert!(is_album_item(&msg));

        let message = chat_message(&msg);
        assert_eq!(message.media_group_id.as_deref(), Some("1357"));
        assert_eq!(message.caption.as_deref(), Some("trip"));
        assert_eq!(message.attachment.as_ref().and_then(Attachment::file_id), Some("big"));
        Ok(())
    }

    #[test]
    fn voice_and_location_are_converted() -> Result<(), serde_json::Error> {
        let voice = telegram_message(json!({
            "voice": {"file_id": "v", "file_unique_id": "vu", "duration": 4, "mime_type": "audio/ogg"}
        }))?;
        assert!(!is_album_item(&voice));
        assert!(matches!(
            chat_message(&voice).attachment,
            Some(Attachment::Voice(VoiceFile { duration: 4, .. }))
        ));

        let location = telegram_message(json!({
            "location": {"latitude": 48.85, "longitude": 2.35}
        }))?;
        assert_eq!(content_kind(&location), ContentKind::Location);
        let point = chat_message(&location).geo_point().cloned();
        assert_eq!(point.map(|p| p.latitude), Some(48.85));
        Ok(())
    }

    #[test]
    fn dice_payload_is_kept_as_json() -> Result<(), serde_json::Error> {
        let msg = telegram_message(json!({"dice": {"emoji": "🎲", "value": 6}}))?;
        assert_eq!(content_kind(&msg), ContentKind::Dice);
        let message = chat_message(&msg);
        assert_eq!(message.dice.as_ref().map(|d| d["value"].clone()), Some(json!(6)));
        Ok(())
    }

    mod sink {
        use super::*;
        use wiremock::matchers::{body_partial_json, method, path_regex};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const SEND_MESSAGE: &str = "(?i)^/bot[^/]+/sendmessage$";

        fn sent_message() -> Value {
            json!({"ok": true, "result": {
                "message_id": 501,
                "date": 1_725_000_100,
                "chat": {"id": -1001, "type": "supergroup", "title": "Lounge"},
                "text": "2*3"
            }})
        }

        fn bot_for(server: &MockServer) -> Result<Bot, Box<dyn std::error::Error>> {
            Ok(Bot::new("123456:test-token").set_api_url(server.uri().parse()?))
        }

        #[tokio::test]
        async fn markdown_is_the_default() -> Result<(), Box<dyn std::error::Error>> {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path_regex(SEND_MESSAGE))
                .and(body_partial_json(json!({"parse_mode": "Markdown", "chat_id": -1001})))
                .respond_with(ResponseTemplate::new(200).set_body_json(sent_message()))
                .expect(1)
                .mount(&server)
                .await;

            let target = ReplyTarget { chat_id: -1001, thread_id: None };
            bot_for(&server)?.send_text(target, "*hi*", Some(77)).await?;
            Ok(())
        }

        #[tokio::test]
        async fn rejected_markup_falls_back_to_plain_text() -> Result<(), Box<dyn std::error::Error>> {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path_regex(SEND_MESSAGE))
                .and(body_partial_json(json!({"parse_mode": "Markdown"})))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 1"
                })))
                .with_priority(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path_regex(SEND_MESSAGE))
                .respond_with(ResponseTemplate::new(200).set_body_json(sent_message()))
                .with_priority(2)
                .mount(&server)
                .await;

            let target = ReplyTarget { chat_id: -1001, thread_id: Some(9) };
            bot_for(&server)?.send_text(target, "2*3", Some(77)).await?;

            let requests = server.received_requests().await.unwrap_or_default();
            assert_eq!(requests.len(), 2);
            let retry: Value = serde_json::from_slice(&requests[1].body)?;
            assert!(retry.get("parse_mode").is_none());
            assert_eq!(retry["text"], "2*3");
            assert_eq!(retry["message_thread_id"], 9);
            Ok(())
        }

        #[tokio::test]
        async fn other_failures_are_not_retried() -> Result<(), Box<dyn std::error::Error>> {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path_regex(SEND_MESSAGE))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: chat not found"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let target = ReplyTarget { chat_id: -1001, thread_id: None };
            let result = bot_for(&server)?.send_text(target, "hello", None).await;
            assert!(matches!(result, Err(SendError::Telegram(_))));
            Ok(())
        }
    }
}
