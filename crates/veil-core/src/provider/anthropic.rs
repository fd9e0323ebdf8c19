//! Anthropic API provider
//!
//! Uses reqwest for non-streaming Messages API requests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{body_or_status, RewriteProvider, RewriteRequest};
use crate::error::RemoteError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Output budget per request. Rewrites are about as long as their input,
/// and input chunks stay well under this.
const MAX_TOKENS: u32 = 16384;

/// Anthropic API provider
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key and model
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Point the provider at a different endpoint (proxies, gateways).
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }
}

#[async_trait]
impl RewriteProvider for AnthropicProvider {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RemoteError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: (!request.instructions.is_empty()).then(|| request.instructions.clone()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.input.clone(),
            }],
            temperature: request.temperature,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| RemoteError::service("Invalid API key format"))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &text));
        }

        let parsed: AnthropicResponse = response.json().await?;
        Ok(parsed.text())
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// 429 (`rate_limit_error`) and 529 (`overloaded_error`) are both transient
/// throttling and get retried.
fn classify_error(status: u16, body: &str) -> RemoteError {
    let detail = serde_json::from_str::<AnthropicError>(body)
        .ok()
        .map(|e| e.error);
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body_or_status(body, status));
    let throttled = detail
        .as_ref()
        .and_then(|d| d.kind.as_deref())
        .is_some_and(|k| k == "rate_limit_error" || k == "overloaded_error");

    if status == 429 || status == 529 || throttled {
        RemoteError::rate_limited(message)
    } else {
        RemoteError::Service {
            status: Some(status),
            message: format!("Anthropic API error: {message}"),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

impl AnthropicResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_skips_non_text_blocks() {
        let body = r#"{"content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"[EMAIL]"}],"stop_reason":"end_turn"}"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "[EMAIL]");
    }

    #[test]
    fn test_request_omits_empty_system() {
        let request = AnthropicRequest {
            model: "m".to_string(),
            max_tokens: 10,
            system: None,
            messages: vec![],
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_overloaded_is_rate_limited() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(classify_error(529, body), RemoteError::rate_limited("Overloaded"));

        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        assert!(classify_error(429, body).is_rate_limited());
    }

    #[test]
    fn test_auth_error_is_fatal() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        let err = classify_error(401, body);
        assert!(!err.is_rate_limited());
        assert_eq!(err.to_string(), "Anthropic API error: invalid x-api-key");
    }
}
