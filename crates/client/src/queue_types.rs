//! Client-side queue types shared by the application layer and its consumers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use daydream_shared::{CurrentPromptData, QueuedPrompt, SubmitPromptResponse};

/// Opaque key scoping all queue state to one live stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids count as "no stream" for precondition checks.
    pub fn is_present(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The prompt currently being applied to the live video transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePrompt {
    pub prompt: QueuedPrompt,
    pub started_at: DateTime<Utc>,
}

impl From<CurrentPromptData> for ActivePrompt {
    fn from(data: CurrentPromptData) -> Self {
        Self {
            prompt: data.prompt.into(),
            started_at: data.started_at,
        }
    }
}

/// Identifies one registered subscriber callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

/// Invoked with a fresh snapshot after every mutation of a stream's cache entry.
pub type SubscriberCallback = Arc<dyn Fn(&QueueSnapshot) + Send + Sync>;

/// Point-in-time copy of a stream's queue state, handed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub stream_id: StreamId,
    pub active_prompt: Option<ActivePrompt>,
    pub recent_prompts: Vec<QueuedPrompt>,
    pub is_submitting: bool,
    pub is_connected: bool,
    pub queue_positions: HashMap<String, u32>,
    /// Increases with every notifying mutation of the stream's entry
    pub version: u64,
}

impl QueueSnapshot {
    pub fn empty(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            active_prompt: None,
            recent_prompts: Vec::new(),
            is_submitting: false,
            is_connected: false,
            queue_positions: HashMap::new(),
            version: 0,
        }
    }

    /// Whether `self` should replace `previous` as a subscriber's latest state.
    ///
    /// Notifications run outside the entry lock, so two of them can arrive in
    /// reverse order. An older version of the same stream never replaces a
    /// newer one.
    pub fn supersedes(&self, previous: &QueueSnapshot) -> bool {
        self.stream_id != previous.stream_id || self.version >= previous.version
    }

    /// Index of the active prompt inside `recent_prompts`, for highlighting.
    pub fn highlighted_index(&self) -> Option<usize> {
        let active = self.active_prompt.as_ref()?;
        self.recent_prompts
            .iter()
            .position(|item| item.id == active.prompt.id)
    }

    /// Last position reported for `prompt_id` by its submission response.
    pub fn queue_position(&self, prompt_id: &str) -> Option<u32> {
        self.queue_positions.get(prompt_id).copied()
    }
}

/// Result of a prompt submission. Failures never carry a prompt id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmitOutcome {
    pub success: bool,
    pub prompt_id: Option<String>,
    pub queue_position: Option<u32>,
    pub was_censored: bool,
}

impl SubmitOutcome {
    pub fn rejected() -> Self {
        Self::default()
    }

    pub fn accepted(response: &SubmitPromptResponse) -> Self {
        Self {
            success: true,
            prompt_id: Some(response.id.clone()),
            queue_position: Some(response.queue_position),
            was_censored: response.was_censored,
        }
    }
}

/// Where a remembered prompt currently sits relative to the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// The prompt is the active prompt
    Live,
    /// 1-based position in queue order
    Queued { position: u32 },
    /// Played and evicted, or never accepted; drop any local state for it
    Untracked,
}
