//! One conversational turn, from canonical message to sent replies.

use crate::adapter::{merge_inputs, serialize_request, TurnInput};
use crate::bot::dispatcher::ReplyDispatcher;
use crate::chat::ChatMessage;
use crate::llm::ConversationSession;
use crate::response::{self, ModelResponse};
use tracing::{debug, error};

/// Run a turn: merge enrichments, ask the model, parse and dispatch the reply.
///
/// Returns the parsed response, or `None` if any stage failed. Failures are
/// logged by the stage that detected them.
pub async fn answer(
    session: &ConversationSession,
    replies: &ReplyDispatcher,
    message: ChatMessage,
    inputs: Vec<TurnInput>,
) -> Option<ModelResponse> {
    let (message, extra) = merge_inputs(message, inputs);
    let request = serialize_request(&message)
        .inspect_err(|e| error!(message_id = message.message_id, "Failed to serialize message: {e}"))
        .ok()?;

    let raw = session.send(&request, extra).await?;
    let response = response::parse(&raw)?;
    let sent = replies.dispatch(&message, &response).await;
    debug!(message_id = message.message_id, sent, "Turn answered");
    Some(response)
}
