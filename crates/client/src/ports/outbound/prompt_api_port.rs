//! Prompt queue REST port.

use async_trait::async_trait;
use daydream_shared::SubmitPromptResponse;

use crate::queue_types::StreamId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptApiPort: Send + Sync {
    /// Enqueue `text` against the stream. `text` is already trimmed.
    async fn submit_prompt(
        &self,
        stream_id: &StreamId,
        text: &str,
    ) -> Result<SubmitPromptResponse, ApiError>;

    /// Ask the backend to enqueue one of its filler prompts.
    async fn add_random_prompt(&self, stream_id: &StreamId) -> Result<(), ApiError>;
}
