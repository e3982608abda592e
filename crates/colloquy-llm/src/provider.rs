//! The seam between generation and a concrete model API

use crate::types::{LlmRequest, StreamDelta};
use futures::Stream;
use std::pin::Pin;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl From<LlmError> for colloquy_core::Error {
    fn from(e: LlmError) -> Self {
        colloquy_core::Error::llm_error("llm", e.to_string())
    }
}

/// Response deltas in arrival order. A provider error ends the stream.
pub type LlmStream = Pin<Box<dyn Stream<Item = LlmResult<StreamDelta>> + Send>>;

/// A model backend. Implementations only open the stream; [`crate::generate`]
/// turns it into handler callbacks.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream>;
}
