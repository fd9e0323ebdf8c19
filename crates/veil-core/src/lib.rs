//! Veil Core - bulk anonymization of personal data in documents
//!
//! This crate contains all the core functionality for Veil, including:
//! - Paragraph-aligned chunking of extracted text
//! - Rate-limit aware retries around remote rewrite calls
//! - The two-pass (redact, verify) redaction pipeline
//! - Rewriting providers (Gemini, Anthropic, OpenAI, offline echo)
//! - Document extraction (DOCX, PDF, plain text), DOCX rendering, ZIP export
//! - The sequential job queue that drives documents through all of the above

pub mod chunker;
pub mod config;
pub mod documents;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod provider;
pub mod retry;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use config::{Config, Settings};
pub use documents::{DocumentProcessor, DocumentSource};
pub use error::{ExtractionError, JobError, QueueError, RemoteError, RenderError};
pub use jobs::{Job, JobQueue, JobStatus, QueueEvent, QueueState, QueueStats};
pub use pipeline::RedactionPipeline;
pub use provider::{ProviderConfig, RewriteProvider};

/// Application state shared by the front ends
pub struct AppState {
    pub config: Config,
    pub settings: Settings,
    /// Provider every document is sent to
    pub provider: Arc<dyn RewriteProvider>,
    pub queue: JobQueue,
}

impl AppState {
    /// Build the provider, pipeline and queue from settings.
    ///
    /// Must be called from within a tokio runtime; the queue's scheduler is
    /// spawned here. Returns the state and the queue's event stream.
    pub fn new(
        config: Config,
        settings: Settings,
        provider: &ProviderConfig,
    ) -> (Self, mpsc::Receiver<QueueEvent>) {
        let provider = provider.build();
        tracing::info!(
            provider = provider.provider_name(),
            model = provider.model_id(),
            "Provider configured"
        );

        let pipeline = RedactionPipeline::new(provider.clone(), settings.pipeline.to_config());
        let (queue, events) =
            JobQueue::spawn(DocumentProcessor::new(pipeline), settings.queue.to_config());

        let state = Self {
            config,
            settings,
            provider,
            queue,
        };
        (state, events)
    }

    /// Single connectivity probe against the provider, never retried.
    pub async fn ping(&self) -> Result<(), RemoteError> {
        let started = std::time::Instant::now();
        let result = self.provider.ping().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let provider = self.provider.provider_name();
        match &result {
            Ok(()) => tracing::info!(provider, elapsed_ms, "Provider reachable"),
            Err(e) => tracing::warn!(provider, elapsed_ms, error = %e, "Provider check failed"),
        }
        result
    }
}
