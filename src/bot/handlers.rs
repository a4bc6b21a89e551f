//! Update endpoints
//!
//! Every endpoint converts the update, gathers its side inputs and runs one
//! turn. Errors never escape: they are logged and the update is acknowledged.

use super::album::AlbumCollector;
use super::dispatcher::ReplyDispatcher;
use super::telegram::chat_message;
use crate::adapter::TurnInput;
use crate::chat::ChatMessage;
use crate::geo::Geocoder;
use crate::llm::ConversationSession;
use crate::media::{AttachmentRef, FileSource, MediaNormalizer};
use crate::pipeline;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, warn};

/// Text, dice and polls: the message is the whole input.
///
/// # Errors
///
/// Never fails; the signature matches the dispatcher's endpoint contract.
pub async fn handle_text(
    msg: Message,
    session: Arc<ConversationSession>,
    replies: ReplyDispatcher,
) -> ResponseResult<()> {
    pipeline::answer(&session, &replies, chat_message(&msg), Vec::new()).await;
    respond(())
}

/// Shared location: reverse geocode, then answer with the resolved place.
///
/// # Errors
///
/// Never fails; the signature matches the dispatcher's endpoint contract.
pub async fn handle_location(
    msg: Message,
    session: Arc<ConversationSession>,
    replies: ReplyDispatcher,
    geocoder: Arc<dyn Geocoder>,
) -> ResponseResult<()> {
    let message = chat_message(&msg);
    let inputs = location_inputs(geocoder.as_ref(), &message).await;
    pipeline::answer(&session, &replies, message, inputs).await;
    respond(())
}

/// Single photo, sticker, voice note or audio file.
///
/// # Errors
///
/// Never fails; the signature matches the dispatcher's endpoint contract.
pub async fn handle_media(
    bot: Bot,
    msg: Message,
    session: Arc<ConversationSession>,
    replies: ReplyDispatcher,
    normalizer: MediaNormalizer,
) -> ResponseResult<()> {
    let message = chat_message(&msg);
    let inputs = media_inputs(&bot, &normalizer, std::slice::from_ref(&message)).await;
    pipeline::answer(&session, &replies, message, inputs).await;
    respond(())
}

/// Album item: buffered until the group is complete, then answered once.
///
/// # Errors
///
/// Never fails; the signature matches the dispatcher's endpoint contract.
pub async fn handle_album(
    bot: Bot,
    msg: Message,
    session: Arc<ConversationSession>,
    replies: ReplyDispatcher,
    normalizer: MediaNormalizer,
    albums: Arc<AlbumCollector>,
) -> ResponseResult<()> {
    let message = chat_message(&msg);
    let Some(group_id) = message.media_group_id.clone() else {
        return respond(());
    };

    // Updates of one chat are handled sequentially, so the flush must not block this one.
    if albums.push(&group_id, message).await {
        tokio::spawn(async move {
            let items = albums.flush_after_window(&group_id).await;
            debug!(group_id = %group_id, items = items.len(), "Album collected");
            answer_album(&bot, &normalizer, &session, &replies, items).await;
        });
    }
    respond(())
}

/// Answer a collected album as one turn anchored at its first item.
pub async fn answer_album(
    source: &dyn FileSource,
    normalizer: &MediaNormalizer,
    session: &ConversationSession,
    replies: &ReplyDispatcher,
    items: Vec<ChatMessage>,
) {
    let inputs = media_inputs(source, normalizer, &items).await;
    if let Some(anchor) = items.into_iter().next() {
        pipeline::answer(session, replies, anchor, inputs).await;
    }
}

/// Resolve the message location, falling back to the raw point on failure.
pub async fn location_inputs(geocoder: &dyn Geocoder, message: &ChatMessage) -> Vec<TurnInput> {
    let Some(point) = message.geo_point() else {
        return Vec::new();
    };
    match geocoder.reverse(point.latitude, point.longitude).await {
        Ok(record) => vec![TurnInput::Location(record)],
        Err(e) => {
            warn!(
                lat = point.latitude,
                lon = point.longitude,
                "Reverse geocoding failed, sending raw coordinates: {e}"
            );
            Vec::new()
        }
    }
}

/// Download and normalize the attachment of every message; failed items are skipped.
pub async fn media_inputs(
    source: &dyn FileSource,
    normalizer: &MediaNormalizer,
    messages: &[ChatMessage],
) -> Vec<TurnInput> {
    let mut inputs = Vec::with_capacity(messages.len());
    for message in messages {
        let Some(attachment) = message
            .attachment
            .as_ref()
            .and_then(AttachmentRef::from_attachment)
        else {
            continue;
        };
        if let Some(blob) = normalizer.normalize(source, &attachment).await {
            inputs.push(TurnInput::Media(blob));
        }
    }
    inputs
}
