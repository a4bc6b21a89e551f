//! HTTP utilities shared by the Gemini provider and the geocoder

use crate::config::get_llm_http_timeout_secs;
use crate::llm::LlmError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client configured with the standard timeout.
///
/// Uses `LLM_HTTP_TIMEOUT_SECS` environment variable or the 120s default.
#[must_use]
pub fn create_http_client() -> HttpClient {
    let timeout = Duration::from_secs(get_llm_http_timeout_secs());
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends an HTTP POST request with JSON body and returns the parsed JSON response.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::ApiError` on non-success status codes,
/// or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
) -> Result<Value, LlmError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError(describe_error_body(status, &error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

fn describe_error_body(status: reqwest::StatusCode, error_text: &str) -> String {
    let trimmed = error_text.trim_start();

    // Nginx/proxy error pages
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") || trimmed.starts_with("<HTML")
    {
        return format!("API error: {status} (Server returned HTML error page)");
    }

    // Google APIs wrap failures as {"error": {"message": ...}}
    let message = serde_json::from_str::<Value>(error_text)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| error_text.to_string());

    if message.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = message.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("API error: {status} - {truncated}... (truncated)")
    } else {
        format!("API error: {status} - {message}")
    }
}

/// Joins the `text` of every part in the array found at `path`.
///
/// Parts flagged `"thought": true` and parts without text are skipped.
///
/// # Example
/// ```ignore
/// let content = join_text_parts(&response, &["candidates", "0", "content", "parts"])?;
/// ```
///
/// # Errors
///
/// Returns `LlmError::ApiError` if the path is invalid, the target is not an
/// array, or no part carries text.
pub fn join_text_parts(response: &Value, path: &[&str]) -> Result<String, LlmError> {
    let mut current = response;

    for segment in path {
        if let Ok(index) = segment.parse::<usize>() {
            current = current.get(index).ok_or_else(|| {
                LlmError::ApiError(format!("Invalid path: missing index {index}"))
            })?;
        } else {
            current = current.get(*segment).ok_or_else(|| {
                LlmError::ApiError(format!("Invalid path: missing key {segment}"))
            })?;
        }
    }

    let parts = current
        .as_array()
        .ok_or_else(|| LlmError::ApiError(format!("Expected parts array, got: {current:?}")))?;
    let texts: Vec<&str> = parts
        .iter()
        .filter(|part| !part["thought"].as_bool().unwrap_or(false))
        .filter_map(|part| part["text"].as_str())
        .collect();

    if texts.is_empty() {
        return Err(LlmError::ApiError("Response has no text parts".to_string()));
    }
    Ok(texts.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn text_parts_are_joined_in_order() -> Result<(), LlmError> {
        let response = json!({"candidates": [{"content": {"parts": [
            {"text": "{\"answers\":[{\"text\":"},
            {"text": "thinking it over", "thought": true},
            {"inlineData": {"mimeType": "image/png", "data": ""}},
            {"text": "\"hi\"}]}"}
        ]}}]});
        let text = join_text_parts(&response, &["candidates", "0", "content", "parts"])?;
        assert_eq!(text, r#"{"answers":[{"text":"hi"}]}"#);
        assert!(join_text_parts(&response, &["candidates", "1"]).is_err());
        Ok(())
    }

    #[test]
    fn parts_without_text_are_an_error() {
        let response = json!({"parts": [{"text": "hidden", "thought": true}]});
        assert!(matches!(
            join_text_parts(&response, &["parts"]),
            Err(LlmError::ApiError(_))
        ));
    }

    #[test]
    fn error_body_prefers_google_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(
            describe_error_body(StatusCode::BAD_REQUEST, body),
            "API error: 400 Bad Request - API key not valid"
        );
    }

    #[test]
    fn error_body_hides_html_and_truncates() {
        let html = describe_error_body(StatusCode::BAD_GATEWAY, "<html><body>502</body></html>");
        assert!(html.ends_with("(Server returned HTML error page)"));

        let long = "ж".repeat(MAX_ERROR_BODY_CHARS + 10);
        let message = describe_error_body(StatusCode::INTERNAL_SERVER_ERROR, &long);
        assert!(message.ends_with("... (truncated)"));
    }

    #[tokio::test]
    async fn send_json_request_posts_body() -> Result<(), LlmError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"ping": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pong": 1})))
            .mount(&server)
            .await;

        let client = create_http_client();
        let response = send_json_request(&client, &server.uri(), &json!({"ping": 1})).await?;
        assert_eq!(response["pong"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn send_json_request_maps_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = create_http_client();
        let result = send_json_request(&client, &server.uri(), &json!({})).await;
        assert!(matches!(result, Err(LlmError::ApiError(ref m)) if m.contains("slow down")));
    }
}
