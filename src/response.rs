//! Model response parsing and validation.
//!
//! The model is constrained to answer with
//! `{"answers": [{"reply_to": <id|null>, "text": <str>}], "skip": <bool|null>}`
//! but occasionally wraps it in a Markdown code fence.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

/// Error returned when the raw model output is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Output is not valid JSON
    #[error("JSON parsing error: {message}. Line {line}, Column {column}")]
    Json {
        message: String,
        line: usize,
        column: usize,
    },
    /// Output is JSON but does not match the answer schema
    #[error("Response does not match schema: {0}")]
    Schema(String),
}

/// One outbound chat message requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAnswer {
    /// Message id to thread the reply under
    #[serde(default, deserialize_with = "message_id")]
    pub reply_to: Option<i32>,
    pub text: String,
}

/// Validated model output for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub answers: Option<Vec<ModelAnswer>>,
    /// Produce no output for this turn
    #[serde(default, deserialize_with = "null_as_false")]
    pub skip: bool,
}

// The response schema declares `reply_to` as a string, so models send both forms.
fn message_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdOrString {
        Id(i32),
        String(String),
    }

    match Option::<IdOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdOrString::Id(id)) => Ok(Some(id)),
        Some(IdOrString::String(s)) => s.trim().parse().map(Some).map_err(|_| {
            serde::de::Error::custom(format!("reply_to '{s}' is not a message id"))
        }),
    }
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Remove surrounding whitespace and a Markdown code fence, if any.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse raw model output into a [`ModelResponse`].
///
/// # Errors
///
/// Returns `ResponseError::Json` with the error position if the output is not
/// JSON, or `ResponseError::Schema` if it does not match the answer schema.
pub fn parse_response(raw: &str) -> Result<ModelResponse, ResponseError> {
    let cleaned = strip_code_fence(raw);
    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        let full = e.to_string();
        let position = format!(" at line {} column {}", e.line(), e.column());
        ResponseError::Json {
            message: full.strip_suffix(&position).unwrap_or(&full).to_string(),
            line: e.line(),
            column: e.column(),
        }
    })?;

    if !value.is_object() {
        return Err(ResponseError::Schema(format!(
            "expected an object, got {value}"
        )));
    }

    serde_json::from_value(value).map_err(|e| ResponseError::Schema(e.to_string()))
}

/// Parse raw model output, logging and discarding failures.
#[must_use]
pub fn parse(raw: &str) -> Option<ModelResponse> {
    parse_response(raw)
        .inspect_err(|e| error!("{e}"))
        .ok()
}
