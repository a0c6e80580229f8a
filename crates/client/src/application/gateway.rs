//! Prompt submission gateway.
//!
//! Front door for user and filler prompt submissions. At most one submission
//! is in flight per stream; a second call while one is pending returns a
//! rejected outcome without touching the network. Failures are converted to
//! result values, never propagated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::application::cache::ConnectionCache;
use crate::ports::outbound::{AnalyticsEvent, AnalyticsPort, PromptApiPort};
use crate::queue_types::{StreamId, SubmitOutcome};

#[derive(Clone)]
pub struct PromptGateway {
    cache: ConnectionCache,
    api: Arc<dyn PromptApiPort>,
    analytics: Arc<dyn AnalyticsPort>,
    authenticated: Arc<AtomicBool>,
}

impl PromptGateway {
    pub fn new(
        cache: ConnectionCache,
        api: Arc<dyn PromptApiPort>,
        analytics: Arc<dyn AnalyticsPort>,
    ) -> Self {
        Self {
            cache,
            api,
            analytics,
            authenticated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reported on analytics events; updated by the host on sign-in/out.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Submit `text` to the stream's queue.
    ///
    /// The text is trimmed before sending. On success the reported queue
    /// position is recorded against the returned prompt id.
    pub async fn submit_prompt(&self, stream_id: &StreamId, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() || !stream_id.is_present() {
            tracing::debug!(stream_id = %stream_id, "Rejected submission: empty prompt or stream");
            return SubmitOutcome::rejected();
        }
        let Some(_guard) = self.cache.try_begin_submission(stream_id) else {
            tracing::debug!(stream_id = %stream_id, "Rejected submission: already in flight");
            return SubmitOutcome::rejected();
        };

        let response = match self.api.submit_prompt(stream_id, text).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, error = %e, "Prompt submission failed");
                return SubmitOutcome::rejected();
            }
        };

        tracing::info!(
            stream_id = %stream_id,
            prompt_id = %response.id,
            queue_position = response.queue_position,
            was_censored = response.was_censored,
            "Prompt queued"
        );
        self.cache
            .record_queue_position(stream_id, &response.id, response.queue_position);
        self.emit(AnalyticsEvent::PromptSubmitted {
            stream_id: stream_id.clone(),
            prompt: text.to_string(),
            was_censored: response.was_censored,
            is_authenticated: self.is_authenticated(),
        });

        SubmitOutcome::accepted(&response)
    }

    /// Ask the backend to enqueue a filler prompt. Shares the in-flight guard
    /// with [`submit_prompt`](Self::submit_prompt).
    pub async fn add_random_prompt(&self, stream_id: &StreamId) -> bool {
        if !stream_id.is_present() {
            return false;
        }
        let Some(_guard) = self.cache.try_begin_submission(stream_id) else {
            tracing::debug!(stream_id = %stream_id, "Rejected random prompt: already in flight");
            return false;
        };

        match self.api.add_random_prompt(stream_id).await {
            Ok(()) => {
                tracing::info!(stream_id = %stream_id, "Random prompt queued");
                true
            }
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, error = %e, "Random prompt request failed");
                false
            }
        }
    }

    fn emit(&self, event: AnalyticsEvent) {
        let analytics = Arc::clone(&self.analytics);
        tokio::spawn(async move {
            let name = event.name();
            if let Err(e) = analytics.track(event).await {
                tracing::debug!(event = name, error = %e, "Dropped analytics event");
            }
        });
    }
}
