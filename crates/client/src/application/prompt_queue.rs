//! Per-consumer view of a stream's prompt queue.
//!
//! `PromptQueue` is what a UI screen holds. It observes one stream at a time
//! through the registry, publishes each snapshot on a `watch` channel, merges
//! optimistic entries into the visible queue, and follows the consumer's own
//! last submitted prompt through the queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use daydream_shared::QueuedPrompt;
use tokio::sync::watch;
use uuid::Uuid;

use crate::application::cache::ConnectionCache;
use crate::application::gateway::PromptGateway;
use crate::application::overlay::{OptimisticOverlay, OptimisticPromptEntry};
use crate::application::reconciliation::TrackedPrompt;
use crate::application::registry::SubscriptionRegistry;
use crate::queue_types::{
    QueueSnapshot, QueueStatus, StreamId, SubmitOutcome, SubscriberCallback, SubscriberId,
};

/// One row of the queue as a consumer renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleQueueItem {
    /// Pushed by the backend
    Confirmed(QueuedPrompt),
    /// Submitted from here, round-trip still pending
    Pending(OptimisticPromptEntry),
}

impl VisibleQueueItem {
    pub fn text(&self) -> &str {
        match self {
            VisibleQueueItem::Confirmed(prompt) => &prompt.text,
            VisibleQueueItem::Pending(entry) => &entry.text,
        }
    }
}

#[derive(Default)]
struct ViewState {
    stream_id: Option<StreamId>,
    subscriber: Option<SubscriberId>,
    tracked: TrackedPrompt,
}

pub struct PromptQueue {
    cache: ConnectionCache,
    registry: SubscriptionRegistry,
    gateway: PromptGateway,
    overlay: OptimisticOverlay,
    updates: Arc<watch::Sender<Option<QueueSnapshot>>>,
    /// Bumped on every stream change; callbacks from an older stream are ignored
    generation: Arc<AtomicU64>,
    state: Mutex<ViewState>,
}

impl PromptQueue {
    pub fn new(
        cache: ConnectionCache,
        registry: SubscriptionRegistry,
        gateway: PromptGateway,
    ) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            cache,
            registry,
            gateway,
            overlay: OptimisticOverlay::new(),
            updates: Arc::new(updates),
            generation: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(ViewState::default()),
        }
    }

    /// Observe `stream_id`, or nothing.
    ///
    /// Leaving a stream releases it before the next one is joined. Optimistic
    /// entries and the tracked prompt are reset whenever the stream changes.
    pub fn watch(&self, stream_id: Option<StreamId>) {
        let stream_id = stream_id.filter(StreamId::is_present);
        let mut state = self.lock();
        if state.stream_id == stream_id {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.overlay.set_active_stream(stream_id.as_ref());
        state.tracked.clear();

        let previous = state.stream_id.take().zip(state.subscriber.take());
        match (previous, stream_id.as_ref()) {
            (Some((from, subscriber)), Some(to)) => {
                let callback = self.publisher(generation);
                state.subscriber =
                    Some(self.registry.switch_stream(&from, subscriber, to, callback));
            }
            (Some((from, subscriber)), None) => {
                self.registry.unsubscribe(&from, subscriber);
                self.updates.send_replace(None);
            }
            (None, Some(to)) => {
                let callback = self.publisher(generation);
                state.subscriber = Some(self.registry.subscribe(to, callback));
            }
            (None, None) => {}
        }
        tracing::debug!(stream_id = ?stream_id, "Prompt queue now watching");
        state.stream_id = stream_id;
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        self.lock().stream_id.clone()
    }

    /// Latest snapshot for the watched stream.
    pub fn snapshot(&self) -> Option<QueueSnapshot> {
        self.updates.borrow().clone()
    }

    /// Receiver woken on every snapshot and on every optimistic overlay change.
    pub fn updates(&self) -> watch::Receiver<Option<QueueSnapshot>> {
        self.updates.subscribe()
    }

    pub fn is_submitting(&self) -> bool {
        self.stream_id()
            .is_some_and(|stream_id| self.cache.is_submitting(&stream_id))
    }

    /// Submit a user prompt to the watched stream.
    ///
    /// A placeholder is visible in [`visible_queue`](Self::visible_queue) for
    /// the duration of the request. On success the returned prompt becomes the
    /// tracked prompt for [`my_status`](Self::my_status).
    pub async fn submit_prompt(&self, text: &str) -> SubmitOutcome {
        let Some(stream_id) = self.stream_id() else {
            return SubmitOutcome::rejected();
        };
        let trimmed = text.trim();
        if trimmed.is_empty() || self.cache.is_submitting(&stream_id) {
            return SubmitOutcome::rejected();
        }

        let pending = PendingEntry::insert(self, &stream_id, trimmed);
        let outcome = self.gateway.submit_prompt(&stream_id, trimmed).await;
        drop(pending);

        if let Some(prompt_id) = outcome.prompt_id.as_deref() {
            let mut state = self.lock();
            if state.stream_id.as_ref() == Some(&stream_id) {
                state.tracked.track(prompt_id);
            }
        }
        outcome
    }

    pub async fn add_random_prompt(&self) -> bool {
        match self.stream_id() {
            Some(stream_id) => self.gateway.add_random_prompt(&stream_id).await,
            None => false,
        }
    }

    /// Confirmed queue followed by this consumer's pending submissions.
    pub fn visible_queue(&self) -> Vec<VisibleQueueItem> {
        let Some(stream_id) = self.stream_id() else {
            return Vec::new();
        };
        let confirmed = self
            .snapshot()
            .map(|snapshot| snapshot.recent_prompts)
            .unwrap_or_default();

        confirmed
            .into_iter()
            .map(VisibleQueueItem::Confirmed)
            .chain(
                self.overlay
                    .visible(&stream_id)
                    .into_iter()
                    .map(VisibleQueueItem::Pending),
            )
            .collect()
    }

    /// Where the last prompt submitted from here currently sits.
    ///
    /// `None` when nothing is tracked; a prompt that has left the queue is
    /// forgotten on the first call that notices.
    pub fn my_status(&self) -> Option<QueueStatus> {
        let snapshot = self.snapshot()?;
        self.lock().tracked.status(&snapshot)
    }

    pub fn tracked_prompt_id(&self) -> Option<String> {
        self.lock().tracked.prompt_id().map(str::to_string)
    }

    /// Last position reported by the backend for `prompt_id` on the watched stream.
    pub fn queue_position(&self, prompt_id: &str) -> Option<u32> {
        let stream_id = self.stream_id()?;
        self.cache.queue_position(&stream_id, prompt_id)
    }

    fn publisher(&self, generation: u64) -> SubscriberCallback {
        let updates = Arc::clone(&self.updates);
        let current = Arc::clone(&self.generation);
        Arc::new(move |snapshot: &QueueSnapshot| {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            updates.send_if_modified(|latest| {
                let stale = latest
                    .as_ref()
                    .is_some_and(|latest| !snapshot.supersedes(latest));
                if !stale {
                    *latest = Some(snapshot.clone());
                }
                !stale
            });
        })
    }

    fn touch(&self) {
        self.updates.send_modify(|_| {});
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for PromptQueue {
    fn drop(&mut self) {
        let state = self.lock();
        if let (Some(stream_id), Some(subscriber)) = (state.stream_id.clone(), state.subscriber) {
            drop(state);
            self.registry.unsubscribe(&stream_id, subscriber);
        }
    }
}

/// Optimistic overlay entry removed on drop, including when the submission
/// future is cancelled.
struct PendingEntry<'a> {
    queue: &'a PromptQueue,
    session_id: Uuid,
}

impl<'a> PendingEntry<'a> {
    fn insert(queue: &'a PromptQueue, stream_id: &StreamId, text: &str) -> Self {
        let entry = queue.overlay.insert(stream_id, text);
        queue.touch();
        Self {
            queue,
            session_id: entry.session_id,
        }
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.queue.overlay.remove(self.session_id) {
            self.queue.touch();
        }
    }
}
