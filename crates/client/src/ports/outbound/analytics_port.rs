//! Analytics ingestion port.

use async_trait::async_trait;
use serde_json::json;

use crate::queue_types::StreamId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsEvent {
    PromptSubmitted {
        stream_id: StreamId,
        prompt: String,
        was_censored: bool,
        is_authenticated: bool,
    },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::PromptSubmitted { .. } => "daydream_prompt_submitted",
        }
    }

    pub fn properties(&self) -> serde_json::Value {
        match self {
            AnalyticsEvent::PromptSubmitted {
                stream_id,
                prompt,
                was_censored,
                is_authenticated,
            } => json!({
                "is_authenticated": is_authenticated,
                "prompt": prompt,
                "nsfw": was_censored,
                "stream_id": stream_id.as_str(),
            }),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyticsError {
    #[error("Analytics delivery failed: {0}")]
    DeliveryFailed(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsPort: Send + Sync {
    async fn track(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError>;
}
