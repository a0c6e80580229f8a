//! Queue position reconciliation.
//!
//! Maps a remembered prompt id onto the latest queue state. The result is
//! recomputed on every snapshot: positions only ever shrink as prompts ahead
//! activate and leave.

use daydream_shared::QueuedPrompt;

use crate::queue_types::{ActivePrompt, QueueSnapshot, QueueStatus};

/// Where `prompt_id` sits given the active prompt and the recent-prompts list.
pub fn reconcile(
    prompt_id: &str,
    active_prompt: Option<&ActivePrompt>,
    recent_prompts: &[QueuedPrompt],
) -> QueueStatus {
    if active_prompt.is_some_and(|active| active.prompt.id == prompt_id) {
        return QueueStatus::Live;
    }
    match recent_prompts.iter().position(|item| item.id == prompt_id) {
        Some(index) => QueueStatus::Queued {
            position: u32::try_from(index + 1).unwrap_or(u32::MAX),
        },
        None => QueueStatus::Untracked,
    }
}

/// A consumer's own submitted prompt, followed across snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedPrompt {
    prompt_id: Option<String>,
}

impl TrackedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, prompt_id: impl Into<String>) {
        self.prompt_id = Some(prompt_id.into());
    }

    pub fn clear(&mut self) {
        self.prompt_id = None;
    }

    pub fn prompt_id(&self) -> Option<&str> {
        self.prompt_id.as_deref()
    }

    /// Reconcile against `snapshot`.
    ///
    /// A prompt not yet pushed in `recent_prompts` falls back to the position
    /// its submission reported. Once neither source knows the id it is
    /// forgotten and `None` is returned.
    pub fn status(&mut self, snapshot: &QueueSnapshot) -> Option<QueueStatus> {
        let prompt_id = self.prompt_id.as_deref()?;
        let status = match reconcile(
            prompt_id,
            snapshot.active_prompt.as_ref(),
            &snapshot.recent_prompts,
        ) {
            QueueStatus::Untracked => match snapshot.queue_position(prompt_id) {
                Some(position) => QueueStatus::Queued { position },
                None => QueueStatus::Untracked,
            },
            status => status,
        };

        if status == QueueStatus::Untracked {
            tracing::debug!(prompt_id, "Tracked prompt left the queue");
            self.prompt_id = None;
            return None;
        }
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::queue_types::StreamId;

    fn prompt(id: &str) -> QueuedPrompt {
        QueuedPrompt {
            id: id.to_string(),
            text: format!("prompt {id}"),
            timestamp: 0,
        }
    }

    fn active(id: &str) -> ActivePrompt {
        ActivePrompt {
            prompt: prompt(id),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn position_is_one_based_queue_order() {
        let recent = vec![prompt("a"), prompt("b"), prompt("c")];

        assert_eq!(
            reconcile("b", None, &recent),
            QueueStatus::Queued { position: 2 }
        );
        assert_eq!(
            reconcile("a", None, &recent),
            QueueStatus::Queued { position: 1 }
        );
    }

    #[test]
    fn active_prompt_is_live_even_when_listed() {
        let recent = vec![prompt("a"), prompt("b")];
        let current = active("a");

        assert_eq!(reconcile("a", Some(&current), &recent), QueueStatus::Live);
        assert_eq!(
            reconcile("b", Some(&current), &recent),
            QueueStatus::Queued { position: 2 }
        );
    }

    #[test]
    fn unknown_id_is_untracked() {
        assert_eq!(
            reconcile("zzz", Some(&active("a")), &[prompt("b")]),
            QueueStatus::Untracked
        );
    }

    #[test]
    fn tracked_prompt_follows_snapshots_and_forgets_evicted_ids() {
        let mut snapshot = QueueSnapshot::empty(StreamId::new("s1"));
        snapshot.queue_positions.insert("p1".into(), 3);
        let mut tracked = TrackedPrompt::new();
        tracked.track("p1");

        // Not pushed yet: fall back to the submission's position.
        assert_eq!(
            tracked.status(&snapshot),
            Some(QueueStatus::Queued { position: 3 })
        );

        snapshot.queue_positions.clear();
        snapshot.recent_prompts = vec![prompt("x"), prompt("p1")];
        assert_eq!(
            tracked.status(&snapshot),
            Some(QueueStatus::Queued { position: 2 })
        );

        snapshot.active_prompt = Some(active("p1"));
        assert_eq!(tracked.status(&snapshot), Some(QueueStatus::Live));

        snapshot.active_prompt = Some(active("y"));
        snapshot.recent_prompts = vec![prompt("y")];
        assert_eq!(tracked.status(&snapshot), None);
        assert_eq!(tracked.prompt_id(), None);
    }

    #[test]
    fn nothing_tracked_yields_none() {
        let snapshot = QueueSnapshot::empty(StreamId::new("s1"));
        assert_eq!(TrackedPrompt::new().status(&snapshot), None);
    }
}
