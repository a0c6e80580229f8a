//! Live-update channel manager.
//!
//! Owns at most one live channel per stream and feeds inbound pushes into the
//! [`ConnectionCache`]. Each connection attempt gets a fresh id; a handshake that
//! completes after it was superseded, or after the last subscriber left, is
//! closed straight away, and frames from a superseded connection are dropped.
//!
//! Abnormal closes (anything but 1000/1001) and failed handshakes schedule a
//! reconnect after a fixed delay for as long as the stream has subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use daydream_shared::ServerMessage;
use tokio_util::sync::CancellationToken;

use crate::application::cache::{CacheEntry, ChannelSlot, ConnectionCache};
use crate::ports::outbound::{
    is_normal_closure, ChannelEvent, LiveChannel, LiveChannelConnector, CLOSE_ABNORMAL,
};
use crate::queue_types::StreamId;

/// Delay before reconnecting after an abnormal close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3_000);

#[derive(Clone)]
pub struct ChannelManager {
    cache: ConnectionCache,
    connector: Arc<dyn LiveChannelConnector>,
    reconnect_delay: Duration,
    next_connection_id: Arc<AtomicU64>,
}

impl ChannelManager {
    pub fn new(
        cache: ConnectionCache,
        connector: Arc<dyn LiveChannelConnector>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            cache,
            connector,
            reconnect_delay,
            next_connection_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Open a fresh channel for `stream_id`, closing any existing one and
    /// cancelling a pending reconnect first.
    ///
    /// No-op when the stream has no cache entry.
    pub fn connect(&self, stream_id: &StreamId) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;

        let started = self.cache.update(stream_id, |entry| {
            entry.shutdown();
            entry.latest_attempt = Some(connection_id);
            Some(())
        });
        if started.is_none() {
            tracing::debug!(stream_id = %stream_id, "No cache entry, skipping connect");
            return;
        }

        tracing::info!(stream_id = %stream_id, connection_id, "Connecting live channel");
        let manager = self.clone();
        let stream_id = stream_id.clone();
        tokio::spawn(async move {
            manager.run_connection(stream_id, connection_id).await;
        });
    }

    /// Close the channel and cancel any pending reconnect for `stream_id`.
    pub fn close(&self, stream_id: &StreamId) {
        self.cache.update(stream_id, |entry| {
            let had_channel = entry.channel.is_some();
            entry.shutdown();
            had_channel.then_some(())
        });
    }

    /// Tear down the connection state of an entry already removed from the cache.
    pub(crate) fn release(&self, stream_id: &StreamId, mut entry: CacheEntry) {
        entry.shutdown();
        tracing::info!(stream_id = %stream_id, "Last subscriber left, channel released");
    }

    async fn run_connection(self, stream_id: StreamId, connection_id: u64) {
        let mut channel = match self.connector.connect(&stream_id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, connection_id, "Live channel connect failed: {}", e);
                self.handle_attempt_failed(&stream_id, connection_id);
                return;
            }
        };

        let cancel = CancellationToken::new();
        let adopted = self.cache.update(&stream_id, |entry| {
            if entry.subscribers.is_empty() || entry.latest_attempt != Some(connection_id) {
                return None;
            }
            entry.channel = Some(ChannelSlot {
                connection_id,
                cancel: cancel.clone(),
            });
            Some(())
        });
        if adopted.is_none() {
            tracing::debug!(stream_id = %stream_id, connection_id, "Handshake completed for a superseded attempt, closing");
            channel.close().await;
            return;
        }
        tracing::info!(stream_id = %stream_id, connection_id, "Live channel open");

        self.read_loop(&stream_id, connection_id, channel.as_mut(), &cancel)
            .await;
    }

    async fn read_loop(
        &self,
        stream_id: &StreamId,
        connection_id: u64,
        channel: &mut dyn LiveChannel,
        cancel: &CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(stream_id = %stream_id, connection_id, "Live channel cancelled");
                    channel.close().await;
                    return;
                }
                event = channel.next_event() => match event {
                    Some(ChannelEvent::Text(text)) => {
                        self.handle_frame(stream_id, connection_id, &text);
                    }
                    Some(ChannelEvent::Error(e)) => {
                        tracing::error!(stream_id = %stream_id, connection_id, "Live channel error: {}", e);
                    }
                    Some(ChannelEvent::Closed { code }) => {
                        self.handle_close(stream_id, connection_id, code);
                        return;
                    }
                    None => {
                        self.handle_close(stream_id, connection_id, CLOSE_ABNORMAL);
                        return;
                    }
                },
            }
        }
    }

    fn handle_frame(&self, stream_id: &StreamId, connection_id: u64, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, "Failed to parse live channel message: {}", e);
                return;
            }
        };

        if let Some(payload_stream) = message.stream_id() {
            if payload_stream != stream_id.as_str() {
                tracing::debug!(
                    stream_id = %stream_id,
                    payload_stream,
                    "Dropping message addressed to another stream"
                );
                return;
            }
        }

        let applied = self.cache.update(stream_id, |entry| {
            if !entry.is_current(connection_id) {
                return None;
            }
            apply_message(entry, message)
        });
        if applied.is_none() {
            tracing::trace!(stream_id = %stream_id, connection_id, "Frame not applied");
        }
    }

    fn handle_close(&self, stream_id: &StreamId, connection_id: u64, code: u16) {
        let current = self.cache.update(stream_id, |entry| {
            if !entry.is_current(connection_id) {
                return None;
            }
            entry.channel = None;
            Some(())
        });
        if current.is_none() {
            tracing::debug!(stream_id = %stream_id, connection_id, code, "Superseded channel closed");
            return;
        }

        if is_normal_closure(code) {
            tracing::info!(stream_id = %stream_id, connection_id, code, "Live channel closed");
        } else {
            self.schedule_reconnect(stream_id, code);
        }
    }

    fn handle_attempt_failed(&self, stream_id: &StreamId, connection_id: u64) {
        let latest = self
            .cache
            .with_entry(stream_id, |entry| {
                entry.latest_attempt == Some(connection_id)
            })
            .unwrap_or(false);
        if latest {
            self.schedule_reconnect(stream_id, CLOSE_ABNORMAL);
        }
    }

    /// At most one reconnect timer is pending per stream.
    ///
    /// The deadline is fixed when the close is handled, not when the timer
    /// task first runs.
    fn schedule_reconnect(&self, stream_id: &StreamId, code: u16) {
        let delay = self.reconnect_delay;
        let deadline = tokio::time::Instant::now() + delay;
        let manager = self.clone();
        let target = stream_id.clone();

        let scheduled = self.cache.with_entry(stream_id, |entry| {
            if entry.subscribers.is_empty() || entry.reconnect_timer.is_some() {
                return false;
            }
            let timer = tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                manager.fire_reconnect(&target);
            });
            entry.reconnect_timer = Some(timer.abort_handle());
            true
        });

        if scheduled == Some(true) {
            tracing::warn!(
                stream_id = %stream_id,
                code,
                "Live channel closed abnormally, reconnecting in {}ms",
                delay.as_millis()
            );
        }
    }

    fn fire_reconnect(&self, stream_id: &StreamId) {
        let should_connect = self
            .cache
            .with_entry(stream_id, |entry| {
                entry.reconnect_timer = None;
                !entry.subscribers.is_empty()
            })
            .unwrap_or(false);
        if should_connect {
            self.connect(stream_id);
        }
    }
}

fn apply_message(entry: &mut CacheEntry, message: ServerMessage) -> Option<()> {
    match message {
        ServerMessage::Initial(payload) => entry.apply_initial(payload),
        ServerMessage::CurrentPrompt(payload) => entry.apply_current_prompt(payload.prompt),
        ServerMessage::RecentPromptsUpdate(payload) => {
            entry.apply_recent_prompts(payload.recent_prompts)
        }
        ServerMessage::Unknown { kind } => {
            tracing::debug!(kind = %kind, "Ignoring unknown live channel message");
            return None;
        }
    }
    Some(())
}
