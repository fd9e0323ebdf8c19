//! OpenAI API provider
//!
//! Uses reqwest against the Chat Completions endpoint. The HTTP status and
//! error `code` are needed to tell throttling from exhausted quota, so this
//! talks to the API directly.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{body_or_status, RewriteProvider, RewriteRequest};
use crate::error::RemoteError;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI API provider
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key and model
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Point the provider at a different endpoint (proxies, compatible servers).
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }
}

#[async_trait]
impl RewriteProvider for OpenAIProvider {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RemoteError> {
        let mut messages = Vec::with_capacity(2);
        if !request.instructions.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.instructions.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.input.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| RemoteError::service("Invalid API key format"))?,
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed.text())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// A 429 is throttling unless the account is out of quota, which no amount
/// of waiting fixes.
fn classify_error(status: u16, body: &str) -> RemoteError {
    let detail = serde_json::from_str::<OpenAIError>(body).ok().map(|e| e.error);
    let message = detail
        .as_ref()
        .map(|d| d.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body_or_status(body, status));
    let out_of_quota = detail
        .as_ref()
        .and_then(|d| d.code.as_deref())
        .is_some_and(|c| c == "insufficient_quota");

    if status == 429 && !out_of_quota {
        RemoteError::rate_limited(message)
    } else {
        RemoteError::Service {
            status: Some(status),
            message: format!("OpenAI API error: {message}"),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl ChatResponse {
    fn text(&self) -> String {
        self.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    #[serde(default)]
    message: String,
    code: Option<String>,
}
