//! Generation engine trait

use crate::types::{GenerationRequest, StreamDelta};
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Result type for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Generation error types
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("empty output")]
    EmptyOutput,

    #[error("cancelled")]
    Cancelled,
}

impl From<GenerationError> for cortex_core::Error {
    fn from(e: GenerationError) -> Self {
        cortex_core::Error::generation_failure("unknown", e.to_string())
    }
}

/// Stream type for generation output
pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationResult<StreamDelta>> + Send>>;

/// Backend that turns a prompt into streamed text for one tier.
///
/// The scheduler picks `request.tier`/`request.model` from the ordered
/// ladder and never looks behind this trait.
#[async_trait::async_trait]
pub trait GenerationEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Stream a completion. If `cancel` is provided and triggered, the
    /// stream stops early and yields `GenerationError::Cancelled`.
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: Option<CancellationToken>,
    ) -> GenerationResult<GenerationStream>;
}
