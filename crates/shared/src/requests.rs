//! REST bodies for the prompt queue endpoints.

use serde::{Deserialize, Serialize};

/// Body of `POST /streams/{stream_id}/prompts/queue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPromptRequest {
    pub text: String,
}

/// Response to a successful prompt submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPromptResponse {
    pub id: String,
    /// 1-based position in the stream's queue at acceptance time
    pub queue_position: u32,
    /// Set when content moderation replaced the submitted text
    #[serde(rename = "wasCensored", alias = "was_censored", default)]
    pub was_censored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
