//! Conversation with the model
//!
//! [`ConversationSession`] owns the exchange history and is the only path to
//! the model. Providers implement [`LlmProvider`] and receive the full history
//! on every call.

pub mod gemini;
pub mod http_utils;
pub mod prompt;

use crate::adapter::InputPart;
use crate::media::{MediaBlob, PNG_MIME};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Errors that can occur when talking to the model
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Candidate finished for a reason other than a normal stop
    #[error("Content generation stopped: {0}")]
    GenerationStopped(String),
    /// Prompt rejected by the safety filter
    #[error("Blocked prompt: {0}")]
    PromptBlocked(String),
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Author of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Inline binary payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 encoded bytes
    pub data: String,
}

/// One piece of a [`Content`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(bytes),
            },
        }
    }

    /// Convert adapter output into a wire part; images are sent as PNG.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Unknown` if an image cannot be encoded.
    pub fn from_input(input: InputPart) -> Result<Self, LlmError> {
        match input {
            InputPart::Text(text) => Ok(Self::text(text)),
            InputPart::Media(MediaBlob::Data { mime_type, bytes }) => {
                Ok(Self::inline(&mime_type, &bytes))
            }
            InputPart::Media(MediaBlob::Image(image)) => {
                let mut png = Cursor::new(Vec::new());
                image
                    .write_to(&mut png, ImageFormat::Png)
                    .map_err(|e| LlmError::Unknown(format!("Image encoding failed: {e}")))?;
                Ok(Self::inline(PNG_MIME, png.get_ref()))
            }
        }
    }
}

/// One turn of the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    #[must_use]
    pub const fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }
}

/// Interface for model backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate the next model turn for `contents`, returning its text.
    async fn generate_content(&self, contents: &[Content]) -> Result<String, LlmError>;
}

/// Long-lived conversation with the model.
///
/// The history mutex is held for the whole model call, so turns are
/// serialized and a failed turn leaves no trace in the history.
pub struct ConversationSession {
    provider: Arc<dyn LlmProvider>,
    history: Mutex<Vec<Content>>,
}

impl ConversationSession {
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Send one user turn and return the model's text.
    ///
    /// `extra` parts precede the serialized message. Every failure is logged
    /// together with the input and yields `None`.
    pub async fn send(&self, request_json: &str, extra: Vec<InputPart>) -> Option<String> {
        match self.send_detailed(request_json, extra).await {
            Ok(text) => Some(text),
            Err(LlmError::GenerationStopped(reason)) => {
                error!("Content generation stopped: {reason} | Input: {request_json}");
                None
            }
            Err(LlmError::PromptBlocked(reason)) => {
                error!("Blocked prompt error for input: {request_json} | Error: {reason}");
                None
            }
            Err(e) => {
                error!("Unexpected error during content generation. Exception: {e} | Input: {request_json}");
                None
            }
        }
    }

    /// Like [`send`](Self::send) but returns the classified failure.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or `LlmError::Unknown` if an extra part
    /// cannot be encoded. The history is only extended on success.
    pub async fn send_detailed(
        &self,
        request_json: &str,
        extra: Vec<InputPart>,
    ) -> Result<String, LlmError> {
        let mut parts = extra
            .into_iter()
            .map(Part::from_input)
            .collect::<Result<Vec<_>, _>>()?;
        parts.push(Part::text(request_json));
        let user_turn = Content::new(Role::User, parts);

        let mut history = self.history.lock().await;
        history.push(user_turn);
        match self.provider.generate_content(&history).await {
            Ok(text) => {
                history.push(Content::new(Role::Model, vec![Part::text(text.clone())]));
                debug!(turns = history.len(), "Model turn recorded");
                Ok(text)
            }
            Err(e) => {
                history.pop();
                Err(e)
            }
        }
    }

    /// Number of recorded history entries.
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}
