//! Pipeline types and tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

use super::prompts;

/// Rewrite pass in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    /// Primary redaction over the extracted text
    Redact,
    /// Second look over the redacted text for anything the first pass missed
    Verify,
}

impl Pass {
    /// 1-based pass number, for logs.
    pub fn number(self) -> u8 {
        match self {
            Pass::Redact => 1,
            Pass::Verify => 2,
        }
    }

    /// Instruction set sent with every chunk of this pass.
    pub fn instructions(self) -> &'static str {
        match self {
            Pass::Redact => prompts::REDACT_INSTRUCTIONS,
            Pass::Verify => prompts::VERIFY_INSTRUCTIONS,
        }
    }
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::Redact => write!(f, "redact"),
            Pass::Verify => write!(f, "verify"),
        }
    }
}

/// Tuning for a [`RedactionPipeline`](super::RedactionPipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target chunk size for the redaction pass, in characters
    pub redact_chunk_size: usize,
    /// Target chunk size for the verification pass, in characters
    pub verify_chunk_size: usize,
    /// Pause before every chunk after the first within a pass
    pub chunk_delay: Duration,
    /// Pause between the two passes
    pub pass_delay: Duration,
    /// Responses shorter than this fraction of their input are discarded
    pub min_output_ratio: f64,
    /// Sampling temperature sent with every request
    pub temperature: Option<f32>,
    /// Retry budget for each chunk
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            redact_chunk_size: 5000,
            verify_chunk_size: 7000,
            chunk_delay: Duration::from_millis(1500),
            pass_delay: Duration::from_millis(2000),
            min_output_ratio: 0.3,
            temperature: Some(0.05),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Config with every pacing delay and backoff set to zero.
    pub fn without_delays() -> Self {
        Self {
            chunk_delay: Duration::ZERO,
            pass_delay: Duration::ZERO,
            retry: RetryPolicy::new(RetryPolicy::default().max_retries, Duration::ZERO),
            ..Self::default()
        }
    }

    pub fn chunk_size(&self, pass: Pass) -> usize {
        match pass {
            Pass::Redact => self.redact_chunk_size,
            Pass::Verify => self.verify_chunk_size,
        }
    }
}

/// What one pass produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct PassOutput {
    pub text: String,
    pub chunks: usize,
    pub fallbacks: usize,
}
