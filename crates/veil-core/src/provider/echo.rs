//! Offline provider that hands the input back unchanged.
//!
//! Useful for dry runs of the whole queue (extraction, chunking, pacing,
//! rendering) without an API key. Nothing gets redacted.

use async_trait::async_trait;

use super::{RewriteProvider, RewriteRequest};
use crate::error::RemoteError;

pub(crate) const MODEL_ID: &str = "echo";

pub struct EchoProvider;

#[async_trait]
impl RewriteProvider for EchoProvider {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RemoteError> {
        Ok(request.input.clone())
    }

    fn provider_name(&self) -> &'static str {
        "echo"
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}
