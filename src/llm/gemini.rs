//! Google Gemini `generateContent` provider

use super::http_utils::{self, join_text_parts, send_json_request};
use super::{Content, LlmError, LlmProvider};
use crate::config::{
    GEMINI_API_BASE, GENERATION_MAX_OUTPUT_TOKENS, GENERATION_TEMPERATURE, GENERATION_TOP_K,
    GENERATION_TOP_P,
};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

/// Finish reasons that still carry a usable answer
const NORMAL_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS", "FINISH_REASON_UNSPECIFIED"];

/// JSON schema the model's reply must follow
#[must_use]
pub fn answer_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "answers": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "reply_to": {"type": "STRING", "nullable": true},
                        "text": {"type": "STRING"}
                    },
                    "required": ["text"]
                }
            },
            "skip": {"type": "BOOLEAN", "nullable": true}
        },
        "required": ["answers"]
    })
}

/// Generation parameters sent with every request
#[must_use]
pub fn generation_config() -> Value {
    json!({
        "candidateCount": 1,
        "temperature": GENERATION_TEMPERATURE,
        "topP": GENERATION_TOP_P,
        "topK": GENERATION_TOP_K,
        "presencePenalty": 0,
        "frequencyPenalty": 0,
        "maxOutputTokens": GENERATION_MAX_OUTPUT_TOKENS,
        "responseMimeType": "application/json",
        "responseSchema": answer_schema()
    })
}

/// LLM provider implementation for Google Gemini
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    system_instruction: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    #[must_use]
    pub fn new(api_key: String, model: String, system_instruction: String) -> Self {
        Self {
            http_client: http_utils::create_http_client(),
            api_key,
            model,
            base_url: GEMINI_API_BASE.to_string(),
            system_instruction,
        }
    }

    /// Point the provider at another host (proxy or tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn request_body(&self, contents: &[Content]) -> Value {
        json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{"text": self.system_instruction}]
            },
            "generationConfig": generation_config(),
            "safetySettings": [
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE"}
            ]
        })
    }
}

/// Classify a `generateContent` response and extract the answer text.
///
/// # Errors
///
/// `LlmError::PromptBlocked` if the prompt was rejected,
/// `LlmError::GenerationStopped` if the candidate ended abnormally, or
/// `LlmError::ApiError` if there is no text.
pub fn extract_answer(response: &Value) -> Result<String, LlmError> {
    if let Some(reason) = response["promptFeedback"]["blockReason"].as_str() {
        return Err(LlmError::PromptBlocked(reason.to_string()));
    }

    let candidate = response["candidates"]
        .get(0)
        .ok_or_else(|| LlmError::ApiError("Response has no candidates".to_string()))?;

    if let Some(reason) = candidate["finishReason"].as_str() {
        if !NORMAL_FINISH_REASONS.contains(&reason) {
            return Err(LlmError::GenerationStopped(reason.to_string()));
        }
    }

    join_text_parts(candidate, &["content", "parts"])
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate_content(&self, contents: &[Content]) -> Result<String, LlmError> {
        debug!(model = %self.model, turns = contents.len(), "Sending generateContent request");
        let body = self.request_body(contents);
        let res_json = send_json_request(&self.http_client, &self.endpoint(), &body).await?;
        extract_answer(&res_json)
    }
}
