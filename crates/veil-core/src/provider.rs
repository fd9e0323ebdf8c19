//! Rewriting provider abstraction
//!
//! This module provides a unified interface for the remote services that
//! rewrite text on our behalf:
//! - Google Gemini (`generateContent`)
//! - Anthropic Messages API
//! - OpenAI Chat Completions
//! - Echo, an offline provider that returns its input (dry runs and tests)
//!
//! Providers are responsible for classifying failures at this boundary: a
//! throttling signal becomes [`RemoteError::RateLimited`], everything else is
//! [`RemoteError::Service`].

pub mod anthropic;
pub mod echo;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

pub use anthropic::AnthropicProvider;
pub use echo::EchoProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

/// One rewrite request: the instruction set plus the text to rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteRequest {
    /// System instruction. Empty means none.
    pub instructions: String,
    /// Text to rewrite
    pub input: String,
    /// Sampling temperature; `None` leaves the provider default
    pub temperature: Option<f32>,
}

impl RewriteRequest {
    pub fn new(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            input: input.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Unified rewriting provider interface
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    /// Rewrite `request.input` following `request.instructions`.
    ///
    /// Returns the output text, which may be empty; judging whether an output
    /// is usable is the caller's job.
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RemoteError>;

    /// Get the provider name (e.g., "gemini", "anthropic", "openai", "echo")
    fn provider_name(&self) -> &'static str;

    /// Get the model identifier
    fn model_id(&self) -> &str;

    /// Connectivity probe: a single "ping" request, never retried.
    async fn ping(&self) -> Result<(), RemoteError> {
        let reply = self.rewrite(&RewriteRequest::new("", "ping")).await?;
        if reply.trim().is_empty() {
            return Err(RemoteError::service("empty reply to ping"));
        }
        Ok(())
    }
}

/// Provider configuration stored in settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Google Gemini API
    Gemini {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// Anthropic API
    Anthropic {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// OpenAI API
    #[serde(rename = "openai")]
    OpenAI {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    /// Offline dry run, returns text unchanged
    Echo,
}

impl ProviderConfig {
    /// Get the provider type name
    pub fn provider_type(&self) -> &'static str {
        match self {
            ProviderConfig::Gemini { .. } => "gemini",
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::OpenAI { .. } => "openai",
            ProviderConfig::Echo => "echo",
        }
    }

    /// Get the model ID
    pub fn model_id(&self) -> &str {
        match self {
            ProviderConfig::Gemini { model, .. } => model,
            ProviderConfig::Anthropic { model, .. } => model,
            ProviderConfig::OpenAI { model, .. } => model,
            ProviderConfig::Echo => echo::MODEL_ID,
        }
    }

    /// Pick a provider from API keys in the environment.
    ///
    /// Checked in order: `GEMINI_API_KEY` (or the legacy `API_KEY`),
    /// `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(api_key) = var("GEMINI_API_KEY").or_else(|| var("API_KEY")) {
            return Some(ProviderConfig::Gemini {
                api_key,
                model: gemini::DEFAULT_MODEL.to_string(),
                base_url: None,
            });
        }
        if let Some(api_key) = var("ANTHROPIC_API_KEY") {
            return Some(ProviderConfig::Anthropic {
                api_key,
                model: anthropic::DEFAULT_MODEL.to_string(),
                base_url: None,
            });
        }
        var("OPENAI_API_KEY").map(|api_key| ProviderConfig::OpenAI {
            api_key,
            model: openai::DEFAULT_MODEL.to_string(),
            base_url: None,
        })
    }

    /// Instantiate the configured provider.
    pub fn build(&self) -> Arc<dyn RewriteProvider> {
        match self {
            ProviderConfig::Gemini {
                api_key,
                model,
                base_url,
            } => Arc::new(GeminiProvider::new(api_key, model).with_base_url(base_url.as_deref())),
            ProviderConfig::Anthropic {
                api_key,
                model,
                base_url,
            } => {
                Arc::new(AnthropicProvider::new(api_key, model).with_base_url(base_url.as_deref()))
            }
            ProviderConfig::OpenAI {
                api_key,
                model,
                base_url,
            } => Arc::new(OpenAIProvider::new(api_key, model).with_base_url(base_url.as_deref())),
            ProviderConfig::Echo => Arc::new(EchoProvider),
        }
    }
}

// API keys stay out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Echo => write!(f, "Echo"),
            other => f
                .debug_struct(other.provider_type())
                .field("model", &other.model_id())
                .field("api_key", &"***")
                .finish(),
        }
    }
}

/// Fallback error text when a response body carries no usable message.
pub(crate) fn body_or_status(body: &str, status: u16) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        body.chars().take(500).collect()
    }
}
