//! Subscription registry.
//!
//! Tracks the consumers interested in each stream and drives the channel
//! lifecycle from the subscriber count: the first subscriber opens the channel,
//! the last one to leave closes it and deletes the cache entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::cache::ConnectionCache;
use crate::application::channel_manager::ChannelManager;
use crate::queue_types::{QueueSnapshot, StreamId, SubscriberCallback, SubscriberId};

#[derive(Clone)]
pub struct SubscriptionRegistry {
    cache: ConnectionCache,
    channels: ChannelManager,
    next_subscriber_id: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    pub fn new(cache: ConnectionCache, channels: ChannelManager) -> Self {
        Self {
            cache,
            channels,
            next_subscriber_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register `callback` for `stream_id`.
    ///
    /// The callback is invoked once right away with the current snapshot, then
    /// after every mutation of the stream's entry.
    pub fn subscribe(&self, stream_id: &StreamId, callback: SubscriberCallback) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.attach(stream_id, id, callback);
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, stream_id: &StreamId, subscriber: SubscriberId) -> bool {
        self.detach(stream_id, subscriber).is_some()
    }

    /// Move a subscriber from one stream to another.
    ///
    /// The old stream is released before the new one is joined, so a consumer
    /// never holds two connections at once. The subscriber keeps its id.
    pub fn switch_stream(
        &self,
        from: &StreamId,
        subscriber: SubscriberId,
        to: &StreamId,
        callback: SubscriberCallback,
    ) -> SubscriberId {
        if from == to {
            let replaced = self
                .cache
                .with_entry(from, |entry| {
                    let slot = entry
                        .subscribers
                        .iter_mut()
                        .find(|(id, _)| *id == subscriber)?;
                    slot.1 = Arc::clone(&callback);
                    Some(())
                })
                .flatten();
            if replaced.is_some() {
                return subscriber;
            }
        } else {
            self.detach(from, subscriber);
        }
        self.attach(to, subscriber, callback);
        subscriber
    }

    pub fn subscriber_count(&self, stream_id: &StreamId) -> usize {
        self.cache.subscriber_count(stream_id)
    }

    fn attach(&self, stream_id: &StreamId, id: SubscriberId, callback: SubscriberCallback) {
        let is_first = {
            let mut entry = self.cache.get_or_create(stream_id);
            let is_first = entry.subscribers.is_empty();
            entry.subscribers.push((id, Arc::clone(&callback)));
            is_first
        };

        tracing::debug!(stream_id = %stream_id, subscriber = id.0, is_first, "Subscribed");
        if is_first {
            self.channels.connect(stream_id);
        }

        let snapshot = self
            .cache
            .snapshot(stream_id)
            .unwrap_or_else(|| QueueSnapshot::empty(stream_id.clone()));
        callback(&snapshot);
    }

    fn detach(&self, stream_id: &StreamId, id: SubscriberId) -> Option<SubscriberCallback> {
        let callback = self.cache.with_entry(stream_id, |entry| {
            let index = entry
                .subscribers
                .iter()
                .position(|(subscriber, _)| *subscriber == id)?;
            Some(entry.subscribers.remove(index).1)
        })??;

        tracing::debug!(stream_id = %stream_id, subscriber = id.0, "Unsubscribed");
        if let Some(entry) = self.cache.delete(stream_id) {
            self.channels.release(stream_id, entry);
        }
        Some(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::application::channel_manager::DEFAULT_RECONNECT_DELAY;
    use crate::infrastructure::testing::{settle, InMemoryConnector};

    fn setup() -> (ConnectionCache, InMemoryConnector, SubscriptionRegistry) {
        let cache = ConnectionCache::new();
        let connector = InMemoryConnector::new();
        let channels = ChannelManager::new(
            cache.clone(),
            Arc::new(connector.clone()),
            DEFAULT_RECONNECT_DELAY,
        );
        let registry = SubscriptionRegistry::new(cache.clone(), channels);
        (cache, connector, registry)
    }

    fn recorder() -> (SubscriberCallback, Arc<Mutex<Option<QueueSnapshot>>>) {
        let last = Arc::new(Mutex::new(None));
        let last_clone = Arc::clone(&last);
        let callback: SubscriberCallback = Arc::new(move |snapshot: &QueueSnapshot| {
            *last_clone.lock().expect("lock") = Some(snapshot.clone());
        });
        (callback, last)
    }

    fn noop() -> SubscriberCallback {
        Arc::new(|_: &QueueSnapshot| {})
    }

    fn recent_ids(last: &Arc<Mutex<Option<QueueSnapshot>>>) -> Vec<String> {
        last.lock()
            .expect("lock")
            .as_ref()
            .map(|s| s.recent_prompts.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn subscribers_share_one_connection() {
        let (_cache, connector, registry) = setup();
        let s1 = StreamId::new("s1");

        registry.subscribe(&s1, noop());
        registry.subscribe(&s1, noop());
        registry.subscribe(&s1, noop());
        settle().await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.open_connections(), 1);
        assert_eq!(registry.subscriber_count(&s1), 3);
    }

    #[tokio::test]
    async fn last_unsubscribe_closes_channel_and_deletes_entry() {
        let (cache, connector, registry) = setup();
        let s1 = StreamId::new("s1");

        let a = registry.subscribe(&s1, noop());
        let b = registry.subscribe(&s1, noop());
        settle().await;

        assert!(registry.unsubscribe(&s1, a));
        settle().await;
        assert_eq!(connector.open_connections(), 1);
        assert!(cache.contains(&s1));

        assert!(registry.unsubscribe(&s1, b));
        settle().await;
        assert_eq!(connector.open_connections(), 0);
        assert!(!cache.contains(&s1));
        assert!(!registry.unsubscribe(&s1, b));
    }

    #[tokio::test]
    async fn unsubscribe_during_handshake_leaks_nothing() {
        let (cache, connector, registry) = setup();
        let s1 = StreamId::new("s1");

        let id = registry.subscribe(&s1, noop());
        registry.unsubscribe(&s1, id);
        settle().await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.open_connections(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn remaining_subscriber_keeps_receiving_updates() {
        let (_cache, connector, registry) = setup();
        let s1 = StreamId::new("s1");
        let (cb_a, last_a) = recorder();
        let (cb_b, last_b) = recorder();

        let a = registry.subscribe(&s1, cb_a);
        registry.subscribe(&s1, cb_b);
        settle().await;
        let conn = connector.connection(0).expect("connection");
        conn.send_json(json!({
            "type": "RecentPromptsUpdate",
            "payload": { "recent_prompts": [{ "id": "a", "text": "one", "timestamp": 0 }] }
        }));
        settle().await;

        registry.unsubscribe(&s1, a);
        conn.send_json(json!({
            "type": "RecentPromptsUpdate",
            "payload": { "recent_prompts": [
                { "id": "a", "text": "one", "timestamp": 0 },
                { "id": "b", "text": "two", "timestamp": 1 }
            ] }
        }));
        settle().await;

        assert_eq!(connector.open_connections(), 1);
        assert_eq!(recent_ids(&last_a), vec!["a"]);
        assert_eq!(recent_ids(&last_b), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn new_subscriber_receives_current_state() {
        let (_cache, connector, registry) = setup();
        let s1 = StreamId::new("s1");
        registry.subscribe(&s1, noop());
        settle().await;
        connector
            .connection(0)
            .expect("connection")
            .send_json(json!({
                "type": "RecentPromptsUpdate",
                "payload": { "recent_prompts": [{ "id": "a", "text": "one", "timestamp": 0 }] }
            }));
        settle().await;

        let (callback, last) = recorder();
        registry.subscribe(&s1, callback);

        assert_eq!(recent_ids(&last), vec!["a"]);
    }

    #[tokio::test]
    async fn switch_stream_releases_old_before_joining_new() {
        let (cache, connector, registry) = setup();
        let s1 = StreamId::new("s1");
        let s2 = StreamId::new("s2");

        let id = registry.subscribe(&s1, noop());
        settle().await;
        let same = registry.switch_stream(&s1, id, &s2, noop());
        settle().await;

        assert_eq!(same, id);
        assert!(!cache.contains(&s1));
        assert_eq!(registry.subscriber_count(&s2), 1);
        assert_eq!(connector.open_connections(), 1);
        assert_eq!(connector.attempted_streams(), vec![s1.clone(), s2.clone()]);
    }

    #[tokio::test]
    async fn open_channels_never_exceed_streams_with_subscribers() {
        let (cache, connector, registry) = setup();
        let streams = [StreamId::new("s1"), StreamId::new("s2")];
        let mut ids = Vec::new();

        for round in 0..3 {
            for stream in &streams {
                ids.push((stream.clone(), registry.subscribe(stream, noop())));
            }
            settle().await;
            assert!(
                connector.open_connections() <= streams.len(),
                "round {round}"
            );
        }
        for (stream, id) in ids {
            registry.unsubscribe(&stream, id);
            settle().await;
            assert!(connector.open_connections() <= cache.len());
        }

        assert!(cache.is_empty());
        assert_eq!(connector.open_connections(), 0);
    }
}
