//! Two-pass redaction pipeline.
//!
//! # Architecture
//!
//! ```text
//! full text
//!     │
//!     ▼
//! chunk_by_paragraphs(redact_chunk_size)
//!     │
//!     ▼
//! PASS 1 (redact)    chunk 1 ─► chunk 2 ─► … ─► chunk n     (sequential,
//!     │               each through retry::invoke + fallback   chunk_delay
//!     ▼                                                       between)
//! joined with blank lines
//!     │  pass_delay
//!     ▼
//! chunk_by_paragraphs(verify_chunk_size)
//!     │
//!     ▼
//! PASS 2 (verify)    same loop, verification instructions
//!     │
//!     ▼
//! trimmed final text
//! ```
//!
//! Chunks are never sent in parallel. The verification pass only ever sees
//! pass-1 output, so it cannot reintroduce anything pass 1 removed.

mod prompts;
mod types;

pub use prompts::{REDACT_INSTRUCTIONS, VERIFY_INSTRUCTIONS};
pub use types::{Pass, PipelineConfig};

use std::sync::Arc;
use std::time::Instant;

use crate::chunker::chunk_by_paragraphs;
use crate::error::RemoteError;
use crate::provider::{RewriteProvider, RewriteRequest};
use crate::retry;

use types::PassOutput;

/// Separator between chunk outputs within a pass.
const CHUNK_SEPARATOR: &str = "\n\n";

/// Drives both rewrite passes for one document at a time.
#[derive(Clone)]
pub struct RedactionPipeline {
    provider: Arc<dyn RewriteProvider>,
    config: PipelineConfig,
}

impl RedactionPipeline {
    pub fn new(provider: Arc<dyn RewriteProvider>, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn RewriteProvider> {
        &self.provider
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Redact `full_text` and return the final, trimmed text.
    ///
    /// Fails only when a chunk's remote call fails for good (a non rate-limit
    /// error, or rate limits past the retry budget). Partial output is dropped.
    pub async fn run(&self, full_text: &str) -> Result<String, RemoteError> {
        let started = Instant::now();

        if full_text.trim().is_empty() {
            return Ok(String::new());
        }

        tracing::info!(
            provider = self.provider.provider_name(),
            model = self.provider.model_id(),
            chars = full_text.chars().count(),
            "Starting redaction"
        );

        let redacted = self.run_pass(Pass::Redact, full_text).await?;

        tokio::time::sleep(self.config.pass_delay).await;

        let verified = self.run_pass(Pass::Verify, redacted.text.trim()).await?;
        let output = verified.text.trim().to_string();

        tracing::info!(
            input_chars = full_text.chars().count(),
            output_chars = output.chars().count(),
            redact_chunks = redacted.chunks,
            redact_fallbacks = redacted.fallbacks,
            verify_chunks = verified.chunks,
            verify_fallbacks = verified.fallbacks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Redaction complete"
        );

        Ok(output)
    }

    /// Run one pass over `text`, chunk by chunk, in order.
    async fn run_pass(&self, pass: Pass, text: &str) -> Result<PassOutput, RemoteError> {
        let started = Instant::now();
        let chunks = chunk_by_paragraphs(text, self.config.chunk_size(pass));
        let total = chunks.len();

        tracing::info!(pass = %pass, chunks = total, "Pass {} starting", pass.number());

        let mut output = PassOutput {
            text: String::with_capacity(text.len() + total * CHUNK_SEPARATOR.len()),
            chunks: total,
            fallbacks: 0,
        };

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.chunk_delay).await;
            }

            match self.rewrite_chunk(pass, chunk, index, total).await? {
                Some(rewritten) => output.text.push_str(&rewritten),
                None => {
                    output.fallbacks += 1;
                    output.text.push_str(chunk);
                }
            }
            output.text.push_str(CHUNK_SEPARATOR);
        }

        tracing::info!(
            pass = %pass,
            chunks = total,
            fallbacks = output.fallbacks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pass {} complete",
            pass.number()
        );

        Ok(output)
    }

    /// Rewrite a single chunk. `None` means the response was unusable and the
    /// caller should keep the chunk as it was.
    async fn rewrite_chunk(
        &self,
        pass: Pass,
        chunk: &str,
        index: usize,
        total: usize,
    ) -> Result<Option<String>, RemoteError> {
        let started = Instant::now();
        let label = format!("{pass} {}/{total}", index + 1);
        let request = RewriteRequest::new(pass.instructions(), chunk)
            .with_temperature(self.config.temperature);

        tracing::debug!(
            chunk = %label,
            chars = chunk.chars().count(),
            "Rewriting chunk"
        );

        let provider = &self.provider;
        let request = &request;
        let response = retry::invoke(&self.config.retry, &label, move || {
            provider.rewrite(request)
        })
        .await?;

        if self.is_degenerate(chunk, &response) {
            tracing::warn!(
                chunk = %label,
                input_chars = chunk.chars().count(),
                output_chars = response.chars().count(),
                "Empty or truncated response, keeping chunk unchanged"
            );
            return Ok(None);
        }

        tracing::debug!(
            chunk = %label,
            output_chars = response.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chunk rewritten"
        );
        Ok(Some(response))
    }

    /// An empty response, or one much shorter than its input, is treated as a
    /// failed rewrite. Losing text is worse than under-redacting it.
    fn is_degenerate(&self, input: &str, output: &str) -> bool {
        if output.trim().is_empty() {
            return true;
        }
        let input_len = input.chars().count() as f64;
        let output_len = output.chars().count() as f64;
        output_len < input_len * self.config.min_output_ratio
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::provider::testing::ScriptedProvider;
    use crate::provider::EchoProvider;

    fn pipeline(provider: Arc<dyn RewriteProvider>, config: PipelineConfig) -> RedactionPipeline {
        RedactionPipeline::new(provider, config)
    }

    fn small_chunks() -> PipelineConfig {
        PipelineConfig {
            redact_chunk_size: 20,
            verify_chunk_size: 10_000,
            ..PipelineConfig::without_delays()
        }
    }

    const TEXT: &str = "First paragraph here.\nSecond paragraph.\n\nThird one is longer than twenty.\nEnd";

    #[tokio::test]
    async fn test_echo_returns_trimmed_input_for_single_chunk() {
        let p = pipeline(Arc::new(EchoProvider), PipelineConfig::without_delays());
        let output = p.run("  Line one\nLine two\n\nLine three\n").await.unwrap();
        assert_eq!(output, "Line one\nLine two\n\nLine three");
    }

    #[tokio::test]
    async fn test_echo_reconstructs_multi_chunk_input() {
        let p = pipeline(Arc::new(EchoProvider), small_chunks());
        let output = p.run(TEXT).await.unwrap();

        let expected = chunk_by_paragraphs(TEXT, 20).join(CHUNK_SEPARATOR);
        assert_eq!(output, expected);

        let paragraphs = |s: &str| {
            s.lines()
                .filter(|l| !l.trim().is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        };
        assert_eq!(paragraphs(&output), paragraphs(TEXT));
    }

    #[tokio::test]
    async fn test_empty_response_falls_back_to_chunk() {
        let provider = ScriptedProvider::new(|req| {
            if req.instructions == REDACT_INSTRUCTIONS && req.input.starts_with("Second") {
                Ok(String::new())
            } else {
                Ok(req.input.replace("paragraph", "[X]"))
            }
        });
        let p = pipeline(provider.clone(), small_chunks());
        let output = p.run(TEXT).await.unwrap();

        // The chunk pass 1 kept unchanged is caught by pass 2
        assert!(!output.contains("paragraph"));
        assert!(output.contains("Second [X]."));

        let first_pass: Vec<_> = provider
            .requests()
            .into_iter()
            .filter(|r| r.instructions == REDACT_INSTRUCTIONS)
            .collect();
        assert_eq!(first_pass[1].input, "Second paragraph.");
    }

    #[tokio::test]
    async fn test_fallback_keeps_original_chunk_text() {
        let provider = ScriptedProvider::new(|req| {
            if req.instructions == REDACT_INSTRUCTIONS {
                Ok(String::new())
            } else {
                Ok(req.input.clone())
            }
        });
        let p = pipeline(provider, PipelineConfig::without_delays());
        let output = p.run("Ivanov signed here\n").await.unwrap();
        assert_eq!(output, "Ivanov signed here");
    }

    #[tokio::test]
    async fn test_truncated_response_is_degenerate() {
        let provider = ScriptedProvider::new(|req| {
            if req.instructions == REDACT_INSTRUCTIONS {
                // 3 of 30 chars: well under the 30% floor
                Ok("abc".to_string())
            } else {
                Ok(req.input.clone())
            }
        });
        let p = pipeline(provider, PipelineConfig::without_delays());
        let input = "x".repeat(30);
        assert_eq!(p.run(&input).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_short_but_plausible_response_is_kept() {
        let provider = ScriptedProvider::new(|_| Ok("[NAME], [PHONE]".to_string()));
        let p = pipeline(provider, PipelineConfig::without_delays());
        // 15 output chars against a 34 char input is above 30%
        let output = p.run("Ivanov Ivan Ivanovich, 89991234567").await.unwrap();
        assert_eq!(output, "[NAME], [PHONE]");
    }

    #[tokio::test]
    async fn test_verify_pass_never_sees_original_text() {
        let provider = ScriptedProvider::new(|req| Ok(req.input.replace("Ivanov", "[NAME]")));
        let p = pipeline(provider.clone(), small_chunks());
        p.run("Ivanov I.I. signed\nDirector Ivanov\nPhone").await.unwrap();

        let verify: Vec<_> = provider
            .requests()
            .into_iter()
            .filter(|r| r.instructions == VERIFY_INSTRUCTIONS)
            .collect();
        assert!(!verify.is_empty());
        assert!(verify.iter().all(|r| !r.input.contains("Ivanov")));
    }

    #[tokio::test]
    async fn test_chunks_are_sent_in_order_with_temperature() {
        let provider = ScriptedProvider::new(|req| Ok(req.input.clone()));
        let config = PipelineConfig {
            temperature: Some(0.05),
            ..small_chunks()
        };
        let p = pipeline(provider.clone(), config);
        p.run(TEXT).await.unwrap();

        let requests = provider.requests();
        let first_pass: Vec<_> = requests
            .iter()
            .filter(|r| r.instructions == REDACT_INSTRUCTIONS)
            .map(|r| r.input.clone())
            .collect();
        assert_eq!(first_pass, chunk_by_paragraphs(TEXT, 20));
        assert!(requests.iter().all(|r| r.temperature == Some(0.05)));

        // Pass 1 fully precedes pass 2
        let first_verify = requests
            .iter()
            .position(|r| r.instructions == VERIFY_INSTRUCTIONS)
            .unwrap();
        assert_eq!(first_verify, first_pass.len());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_run() {
        let provider = ScriptedProvider::new(|req| {
            if req.input.starts_with("Second") {
                Err(RemoteError::service("model overloaded permanently"))
            } else {
                Ok(req.input.clone())
            }
        });
        let p = pipeline(provider.clone(), small_chunks());

        let err = p.run(TEXT).await.unwrap_err();
        assert_eq!(err.to_string(), "model overloaded permanently");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_text_skips_provider() {
        let provider = ScriptedProvider::new(|req| Ok(req.input.clone()));
        let p = pipeline(provider.clone(), PipelineConfig::without_delays());
        assert_eq!(p.run(" \n ").await.unwrap(), "");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_chunks_and_passes() {
        let provider = ScriptedProvider::new(|req| Ok(req.input.clone()));
        let config = PipelineConfig {
            redact_chunk_size: 20,
            verify_chunk_size: 10_000,
            chunk_delay: Duration::from_millis(1500),
            pass_delay: Duration::from_millis(2000),
            ..PipelineConfig::default()
        };
        let p = pipeline(provider, config);
        let redact_chunks = chunk_by_paragraphs(TEXT, 20).len() as u32;

        let start = tokio::time::Instant::now();
        p.run(TEXT).await.unwrap();
        let elapsed = start.elapsed();

        // One verification chunk, so no delay inside pass 2
        let expected =
            Duration::from_millis(1500) * (redact_chunks - 1) + Duration::from_millis(2000);
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_chunk_is_retried() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = attempts.clone();
        let provider = ScriptedProvider::new(move |req| {
            if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                Err(RemoteError::rate_limited("429"))
            } else {
                Ok(req.input.clone())
            }
        });
        let p = pipeline(provider.clone(), PipelineConfig::default());

        assert_eq!(p.run("hello world").await.unwrap(), "hello world");
        // two throttled attempts, one success per pass
        assert_eq!(provider.calls(), 4);
    }
}
