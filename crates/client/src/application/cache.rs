//! Process-wide connection cache.
//!
//! Maps each stream to its cached queue state plus the shared live-update
//! connection. Entries are guarded per stream by the map's shard locks; every
//! mutation goes through [`ConnectionCache::update`], which snapshots the entry
//! under the lock and runs subscriber callbacks after releasing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::one::RefMut;
use dashmap::{DashMap, DashSet};
use daydream_shared::{CurrentPromptData, InitialPayload, QueuedPrompt};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::queue_types::{ActivePrompt, QueueSnapshot, StreamId, SubscriberCallback, SubscriberId};

/// The adopted live channel for a stream.
pub(crate) struct ChannelSlot {
    pub(crate) connection_id: u64,
    pub(crate) cancel: CancellationToken,
}

/// Queue state and connection bookkeeping for one stream.
#[derive(Default)]
pub struct CacheEntry {
    pub(crate) active_prompt: Option<ActivePrompt>,
    pub(crate) recent_prompts: Vec<QueuedPrompt>,
    pub(crate) channel: Option<ChannelSlot>,
    /// Most recent connection attempt; older handshakes are closed on completion
    pub(crate) latest_attempt: Option<u64>,
    pub(crate) subscribers: Vec<(SubscriberId, SubscriberCallback)>,
    pub(crate) reconnect_timer: Option<AbortHandle>,
    pub(crate) queue_positions: HashMap<String, u32>,
    /// Version of the last notified mutation
    pub(crate) version: u64,
}

impl CacheEntry {
    pub(crate) fn is_current(&self, connection_id: u64) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|slot| slot.connection_id == connection_id)
    }

    pub(crate) fn apply_initial(&mut self, payload: InitialPayload) {
        self.active_prompt = payload.current_prompt.map(ActivePrompt::from);
        self.recent_prompts = payload.recent_prompts;
        self.prune_positions();
    }

    /// Replace the active prompt. A newly activated prompt advances every
    /// tracked position by one; position 1 was "up next", so entries that
    /// reach 1 or below stop being tracked.
    pub(crate) fn apply_current_prompt(&mut self, prompt: Option<CurrentPromptData>) {
        let previous_id = self
            .active_prompt
            .as_ref()
            .map(|active| active.prompt.id.clone());
        self.active_prompt = prompt.map(ActivePrompt::from);

        let Some(active) = self.active_prompt.as_ref() else {
            return;
        };
        self.queue_positions.remove(&active.prompt.id);

        if previous_id.as_deref() != Some(active.prompt.id.as_str()) {
            self.queue_positions.retain(|_, position| {
                *position = position.saturating_sub(1);
                *position > 1
            });
        }
    }

    pub(crate) fn apply_recent_prompts(&mut self, recent_prompts: Vec<QueuedPrompt>) {
        self.recent_prompts = recent_prompts;
        self.prune_positions();
    }

    pub(crate) fn record_queue_position(&mut self, prompt_id: &str, position: u32) {
        self.queue_positions.insert(prompt_id.to_string(), position);
    }

    /// Drop tracked positions for prompts that are active or left the queue.
    fn prune_positions(&mut self) {
        let active_id = self.active_prompt.as_ref().map(|a| a.prompt.id.as_str());
        let recent = &self.recent_prompts;
        self.queue_positions.retain(|id, _| {
            Some(id.as_str()) != active_id && recent.iter().any(|item| item.id == *id)
        });
    }

    /// Cancel the live channel and any pending reconnect.
    pub(crate) fn shutdown(&mut self) {
        if let Some(slot) = self.channel.take() {
            slot.cancel.cancel();
        }
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        self.latest_attempt = None;
    }

    fn snapshot(&self, stream_id: StreamId, is_submitting: bool) -> QueueSnapshot {
        QueueSnapshot {
            stream_id,
            active_prompt: self.active_prompt.clone(),
            recent_prompts: self.recent_prompts.clone(),
            is_submitting,
            is_connected: self.channel.is_some(),
            queue_positions: self.queue_positions.clone(),
            version: self.version,
        }
    }

    fn callbacks(&self) -> Vec<SubscriberCallback> {
        self.subscribers
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

/// Shared map from stream to [`CacheEntry`].
///
/// Cloning is cheap; all clones see the same entries.
#[derive(Clone, Default)]
pub struct ConnectionCache {
    entries: Arc<DashMap<StreamId, CacheEntry>>,
    /// Streams with a submission in flight. Kept beside the entries so a
    /// submission can outlive the entry of the consumer that started it.
    submitting: Arc<DashSet<StreamId>>,
    /// Source of snapshot versions, shared by all entries so a recreated entry
    /// never reuses a version
    versions: Arc<AtomicU64>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `stream_id`, created with empty defaults if absent.
    ///
    /// The returned guard holds the entry lock; drop it before calling
    /// anything else on the cache.
    pub(crate) fn get_or_create(&self, stream_id: &StreamId) -> RefMut<'_, StreamId, CacheEntry> {
        self.entries.entry(stream_id.clone()).or_default()
    }

    /// Remove the entry, but only once it has no subscribers left.
    pub(crate) fn delete(&self, stream_id: &StreamId) -> Option<CacheEntry> {
        self.entries
            .remove_if(stream_id, |_, entry| entry.subscribers.is_empty())
            .map(|(_, entry)| entry)
    }

    /// Run `f` against the entry without notifying subscribers.
    pub(crate) fn with_entry<R>(
        &self,
        stream_id: &StreamId,
        f: impl FnOnce(&mut CacheEntry) -> R,
    ) -> Option<R> {
        let mut entry = self.entries.get_mut(stream_id)?;
        Some(f(entry.value_mut()))
    }

    /// Mutate the entry and notify its subscribers.
    ///
    /// `f` returns `None` to signal "nothing changed", which skips notification.
    /// Otherwise the entry gets a new version under the lock, so subscribers
    /// can order snapshots that reach them out of order.
    pub(crate) fn update<R>(
        &self,
        stream_id: &StreamId,
        f: impl FnOnce(&mut CacheEntry) -> Option<R>,
    ) -> Option<R> {
        let (result, snapshot, callbacks) = {
            let mut entry = self.entries.get_mut(stream_id)?;
            let result = f(entry.value_mut())?;
            entry.version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
            let snapshot = entry.snapshot(stream_id.clone(), self.submitting.contains(stream_id));
            (result, snapshot, entry.callbacks())
        };

        for callback in &callbacks {
            callback(&snapshot);
        }
        Some(result)
    }

    pub fn snapshot(&self, stream_id: &StreamId) -> Option<QueueSnapshot> {
        let entry = self.entries.get(stream_id)?;
        Some(entry.snapshot(stream_id.clone(), self.submitting.contains(stream_id)))
    }

    pub fn contains(&self, stream_id: &StreamId) -> bool {
        self.entries.contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscriber_count(&self, stream_id: &StreamId) -> usize {
        self.entries
            .get(stream_id)
            .map_or(0, |entry| entry.subscribers.len())
    }

    pub fn is_connected(&self, stream_id: &StreamId) -> bool {
        self.entries
            .get(stream_id)
            .is_some_and(|entry| entry.channel.is_some())
    }

    /// Last known queue position for a submitted prompt.
    pub fn queue_position(&self, stream_id: &StreamId, prompt_id: &str) -> Option<u32> {
        self.entries
            .get(stream_id)
            .and_then(|entry| entry.queue_positions.get(prompt_id).copied())
    }

    pub fn is_submitting(&self, stream_id: &StreamId) -> bool {
        self.submitting.contains(stream_id)
    }

    pub(crate) fn record_queue_position(
        &self,
        stream_id: &StreamId,
        prompt_id: &str,
        position: u32,
    ) {
        self.update(stream_id, |entry| {
            entry.record_queue_position(prompt_id, position);
            Some(())
        });
    }

    /// Claim the per-stream submission slot. `None` if one is already in flight.
    pub(crate) fn try_begin_submission(&self, stream_id: &StreamId) -> Option<SubmissionGuard> {
        if !self.submitting.insert(stream_id.clone()) {
            return None;
        }
        self.touch(stream_id);
        Some(SubmissionGuard {
            cache: self.clone(),
            stream_id: stream_id.clone(),
        })
    }

    fn touch(&self, stream_id: &StreamId) {
        self.update(stream_id, |_| Some(()));
    }
}

/// Releases the submission slot when dropped, on every exit path.
pub(crate) struct SubmissionGuard {
    cache: ConnectionCache,
    stream_id: StreamId,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.cache.submitting.remove(&self.stream_id);
        self.cache.touch(&self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{mpsc, Mutex};
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;
    use daydream_shared::PromptRecord;

    fn queued(id: &str) -> QueuedPrompt {
        QueuedPrompt {
            id: id.to_string(),
            text: format!("prompt {id}"),
            timestamp: 0,
        }
    }

    fn current(id: &str) -> CurrentPromptData {
        CurrentPromptData {
            prompt: PromptRecord {
                id: id.to_string(),
                content: format!("prompt {id}"),
                submitted_at: Utc::now(),
                stream_id: None,
            },
            started_at: Utc::now(),
        }
    }

    fn stream() -> StreamId {
        StreamId::new("s1")
    }

    #[test]
    fn new_active_prompt_advances_tracked_positions() {
        let mut entry = CacheEntry::default();
        entry.record_queue_position("p2", 2);
        entry.record_queue_position("p3", 3);
        entry.record_queue_position("p5", 5);

        entry.apply_current_prompt(Some(current("x")));

        assert_eq!(entry.queue_positions.get("p2"), None);
        assert_eq!(entry.queue_positions.get("p3"), Some(&2));
        assert_eq!(entry.queue_positions.get("p5"), Some(&4));
    }

    #[test]
    fn repeated_active_prompt_does_not_advance() {
        let mut entry = CacheEntry::default();
        entry.apply_current_prompt(Some(current("x")));
        entry.record_queue_position("p4", 4);

        entry.apply_current_prompt(Some(current("x")));

        assert_eq!(entry.queue_positions.get("p4"), Some(&4));
    }

    #[test]
    fn activated_prompt_stops_being_tracked() {
        let mut entry = CacheEntry::default();
        entry.record_queue_position("p1", 5);

        entry.apply_current_prompt(Some(current("p1")));

        assert!(entry.queue_positions.is_empty());
    }

    #[test]
    fn cleared_active_prompt_keeps_positions() {
        let mut entry = CacheEntry::default();
        entry.apply_current_prompt(Some(current("x")));
        entry.record_queue_position("p4", 4);

        entry.apply_current_prompt(None);

        assert!(entry.active_prompt.is_none());
        assert_eq!(entry.queue_positions.get("p4"), Some(&4));
    }

    #[test]
    fn recent_update_drops_positions_that_left_the_queue() {
        let mut entry = CacheEntry::default();
        entry.record_queue_position("a", 2);
        entry.record_queue_position("b", 3);

        entry.apply_recent_prompts(vec![queued("b"), queued("c")]);

        assert_eq!(entry.queue_positions.get("a"), None);
        assert_eq!(entry.queue_positions.get("b"), Some(&3));
    }

    #[test]
    fn initial_replaces_state_wholesale() {
        let mut entry = CacheEntry::default();
        entry.apply_recent_prompts(vec![queued("old")]);

        entry.apply_initial(InitialPayload {
            current_prompt: Some(current("a")),
            recent_prompts: vec![queued("a"), queued("b")],
            stream_id: None,
        });

        assert_eq!(
            entry.active_prompt.as_ref().map(|a| a.prompt.id.as_str()),
            Some("a")
        );
        let ids: Vec<_> = entry.recent_prompts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn delete_refuses_entries_with_subscribers() {
        let cache = ConnectionCache::new();
        {
            let mut entry = cache.get_or_create(&stream());
            entry
                .subscribers
                .push((SubscriberId(1), Arc::new(|_: &QueueSnapshot| {})));
        }

        assert!(cache.delete(&stream()).is_none());
        assert!(cache.contains(&stream()));

        cache.with_entry(&stream(), |entry| entry.subscribers.clear());
        assert!(cache.delete(&stream()).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn update_notifies_with_fresh_snapshot() {
        let cache = ConnectionCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        cache.get_or_create(&stream()).subscribers.push((
            SubscriberId(1),
            Arc::new(move |snapshot: &QueueSnapshot| {
                seen_clone
                    .lock()
                    .expect("lock")
                    .push(snapshot.recent_prompts.len());
            }),
        ));

        cache.update(&stream(), |entry| {
            entry.apply_recent_prompts(vec![queued("a"), queued("b")]);
            Some(())
        });

        assert_eq!(*seen.lock().expect("lock"), vec![2]);
    }

    #[test]
    fn callbacks_may_read_the_cache() {
        let cache = ConnectionCache::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let cache_for_cb = cache.clone();
        let reads_clone = Arc::clone(&reads);
        cache.get_or_create(&stream()).subscribers.push((
            SubscriberId(1),
            Arc::new(move |snapshot: &QueueSnapshot| {
                if cache_for_cb.snapshot(&snapshot.stream_id).is_some() {
                    reads_clone.fetch_add(1, Ordering::SeqCst);
                }
            }),
        ));

        cache.record_queue_position(&stream(), "p1", 3);

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.queue_position(&stream(), "p1"), Some(3));
    }

    #[test]
    fn notifying_updates_advance_the_version() {
        let cache = ConnectionCache::new();
        cache.get_or_create(&stream());
        let before = cache.snapshot(&stream()).expect("entry").version;

        cache.record_queue_position(&stream(), "p1", 1);
        let first = cache.snapshot(&stream()).expect("entry").version;
        cache.record_queue_position(&stream(), "p1", 2);
        let second = cache.snapshot(&stream()).expect("entry").version;
        let _: Option<()> = cache.update(&stream(), |_| None);
        let unchanged = cache.snapshot(&stream()).expect("entry").version;

        assert!(before < first);
        assert!(first < second);
        assert_eq!(unchanged, second);
    }

    #[test]
    fn recreated_entry_does_not_reuse_versions() {
        let cache = ConnectionCache::new();
        cache.get_or_create(&stream());
        cache.record_queue_position(&stream(), "p1", 1);
        let old = cache.snapshot(&stream()).expect("entry").version;

        cache.delete(&stream());
        cache.get_or_create(&stream());
        cache.record_queue_position(&stream(), "p1", 1);

        assert!(cache.snapshot(&stream()).expect("entry").version > old);
    }

    #[test]
    fn delayed_older_notification_does_not_overwrite_newer_state() {
        let cache = ConnectionCache::new();
        let latest: Arc<Mutex<Option<QueueSnapshot>>> = Arc::new(Mutex::new(None));
        let (first_call_tx, first_call_rx) = mpsc::channel();
        let first_call_tx = Mutex::new(first_call_tx);
        let delayed = AtomicBool::new(false);

        let sink = Arc::clone(&latest);
        cache.get_or_create(&stream()).subscribers.push((
            SubscriberId(1),
            Arc::new(move |snapshot: &QueueSnapshot| {
                if !delayed.swap(true, Ordering::SeqCst) {
                    let _ = first_call_tx.lock().expect("lock").send(());
                    thread::sleep(Duration::from_millis(100));
                }
                let mut latest = sink.lock().expect("lock");
                let stale = latest
                    .as_ref()
                    .is_some_and(|prev| !snapshot.supersedes(prev));
                if !stale {
                    *latest = Some(snapshot.clone());
                }
            }),
        ));

        // The submission flag notification stalls after releasing the lock.
        let submitting = cache.clone();
        let slow = thread::spawn(move || submitting.try_begin_submission(&stream()));
        first_call_rx.recv().expect("first notification");

        cache.update(&stream(), |entry| {
            entry.apply_recent_prompts(vec![queued("a")]);
            Some(())
        });
        let guard = slow.join().expect("join").expect("slot free");

        let latest = latest.lock().expect("lock").clone().expect("delivered");
        assert_eq!(latest.recent_prompts.len(), 1);
        assert!(latest.is_submitting);
        assert_eq!(
            latest.version,
            cache.snapshot(&stream()).expect("entry").version
        );
        drop(guard);
    }

    #[test]
    fn update_returning_none_skips_notification() {
        let cache = ConnectionCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        cache.get_or_create(&stream()).subscribers.push((
            SubscriberId(1),
            Arc::new(move |_: &QueueSnapshot| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        let result: Option<()> = cache.update(&stream(), |_| None);

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn submission_guard_is_exclusive_and_released_on_drop() {
        let cache = ConnectionCache::new();
        cache.get_or_create(&stream());

        let guard = cache.try_begin_submission(&stream()).expect("slot free");
        assert!(cache.is_submitting(&stream()));
        assert!(cache.snapshot(&stream()).expect("entry").is_submitting);
        assert!(cache.try_begin_submission(&stream()).is_none());

        drop(guard);
        assert!(!cache.is_submitting(&stream()));
        assert!(cache.try_begin_submission(&stream()).is_some());
    }

    #[test]
    fn submission_slot_works_without_an_entry() {
        let cache = ConnectionCache::new();

        let guard = cache.try_begin_submission(&stream());
        assert!(guard.is_some());
        assert!(!cache.contains(&stream()));
    }
}
