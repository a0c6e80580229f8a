//! Live-update channel messages (backend → client).
//!
//! Frames are JSON envelopes of the form `{ "type": ..., "payload": ... }`.
//! Decoding goes through a loose envelope first so that unknown message types
//! map to [`ServerMessage::Unknown`] instead of failing.

use serde::{Deserialize, Deserializer, Serialize};

use crate::prompts::{CurrentPromptData, QueuedPrompt};

/// Message type tags as sent by the backend.
pub const INITIAL: &str = "initial";
pub const CURRENT_PROMPT: &str = "CurrentPrompt";
pub const RECENT_PROMPTS_UPDATE: &str = "RecentPromptsUpdate";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Full queue state, sent once right after the channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialPayload {
    #[serde(rename = "currentPrompt", default)]
    pub current_prompt: Option<CurrentPromptData>,
    #[serde(
        rename = "recentPrompts",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub recent_prompts: Vec<QueuedPrompt>,
    #[serde(
        rename = "streamId",
        alias = "streamKey",
        alias = "stream_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_id: Option<String>,
}

/// The active prompt changed. `prompt` is `None` when nothing is playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPromptPayload {
    #[serde(default)]
    pub prompt: Option<CurrentPromptData>,
    #[serde(
        default,
        alias = "stream_key",
        alias = "streamId",
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_id: Option<String>,
}

/// The recent-prompts queue changed; replaces the client's list wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentPromptsPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub recent_prompts: Vec<QueuedPrompt>,
    #[serde(
        default,
        alias = "stream_key",
        alias = "streamId",
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_id: Option<String>,
}

/// Messages from the backend on the per-stream live-update channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Initial(InitialPayload),
    CurrentPrompt(CurrentPromptPayload),
    RecentPromptsUpdate(RecentPromptsPayload),
    /// Unknown message type for forward compatibility
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl ServerMessage {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
        let kind = envelope.kind;
        // A missing payload decodes like an empty object
        let payload = match envelope.payload {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            payload => payload,
        };

        let decoded = match kind.as_str() {
            INITIAL => Some(serde_json::from_value(payload).map(ServerMessage::Initial)),
            CURRENT_PROMPT => Some(serde_json::from_value(payload).map(ServerMessage::CurrentPrompt)),
            RECENT_PROMPTS_UPDATE => {
                Some(serde_json::from_value(payload).map(ServerMessage::RecentPromptsUpdate))
            }
            _ => None,
        };

        match decoded {
            Some(result) => result.map_err(|source| ProtocolError::InvalidPayload { kind, source }),
            None => Ok(ServerMessage::Unknown { kind }),
        }
    }

    /// Stream named in the payload, if the backend included one.
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Initial(p) => p.stream_id.as_deref(),
            ServerMessage::CurrentPrompt(p) => p.stream_id.as_deref(),
            ServerMessage::RecentPromptsUpdate(p) => p.stream_id.as_deref(),
            ServerMessage::Unknown { .. } => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::Initial(_) => INITIAL,
            ServerMessage::CurrentPrompt(_) => CURRENT_PROMPT,
            ServerMessage::RecentPromptsUpdate(_) => RECENT_PROMPTS_UPDATE,
            ServerMessage::Unknown { kind } => kind,
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
