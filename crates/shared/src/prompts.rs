//! Prompt records as carried by queue state pushes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A prompt accepted by the backend, as listed in the recent-prompts queue.
///
/// `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPrompt {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
}

/// Full prompt record used inside `CurrentPrompt` pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: String,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    /// Stream the prompt was submitted to
    #[serde(
        default,
        alias = "stream_key",
        alias = "streamId",
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_id: Option<String>,
}

/// The prompt currently applied to the live video transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPromptData {
    pub prompt: PromptRecord,
    pub started_at: DateTime<Utc>,
}

impl From<PromptRecord> for QueuedPrompt {
    fn from(record: PromptRecord) -> Self {
        Self {
            id: record.id,
            text: record.content,
            timestamp: record.submitted_at.timestamp_millis(),
        }
    }
}
