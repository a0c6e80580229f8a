//! Optimistic prompt overlay.
//!
//! Local placeholders shown at the tail of the queue from the moment a prompt
//! is submitted until its round-trip finishes. Entries are scoped to a stream
//! and purged whenever the observed stream changes.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::queue_types::StreamId;

const SEED_PREFIX: &str = "user-";
const SEED_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticPromptEntry {
    pub text: String,
    /// Avatar seed for the placeholder row
    pub seed: String,
    pub is_user: bool,
    /// Milliseconds since epoch
    pub timestamp: i64,
    pub session_id: Uuid,
    pub stream_key: StreamId,
}

impl OptimisticPromptEntry {
    fn new(stream_key: StreamId, text: String) -> Self {
        Self {
            text,
            seed: random_seed(),
            is_user: true,
            timestamp: Utc::now().timestamp_millis(),
            session_id: Uuid::new_v4(),
            stream_key,
        }
    }
}

fn random_seed() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SEED_LEN)
        .filter_map(|_| char::from_digit(rng.gen_range(0..36), 36))
        .collect();
    format!("{SEED_PREFIX}{suffix}")
}

#[derive(Default)]
struct OverlayState {
    active_stream: Option<StreamId>,
    entries: Vec<OptimisticPromptEntry>,
}

/// Shared list of optimistic entries. Clones see the same list.
#[derive(Clone, Default)]
pub struct OptimisticOverlay {
    state: Arc<Mutex<OverlayState>>,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a placeholder for `text` on `stream_key`.
    pub fn insert(&self, stream_key: &StreamId, text: &str) -> OptimisticPromptEntry {
        let entry = OptimisticPromptEntry::new(stream_key.clone(), text.to_string());
        self.lock().entries.push(entry.clone());
        entry
    }

    /// Remove the entry created for `session_id`. False if it was already purged.
    pub fn remove(&self, session_id: Uuid) -> bool {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.session_id != session_id);
        state.entries.len() != before
    }

    /// Entries for `stream_key`, in insertion order.
    pub fn visible(&self, stream_key: &StreamId) -> Vec<OptimisticPromptEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| &entry.stream_key == stream_key)
            .cloned()
            .collect()
    }

    /// Record the stream being observed, dropping every entry if it changed.
    pub fn set_active_stream(&self, stream_id: Option<&StreamId>) {
        let mut state = self.lock();
        if state.active_stream.as_ref() == stream_id {
            return;
        }
        state.active_stream = stream_id.cloned();
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
