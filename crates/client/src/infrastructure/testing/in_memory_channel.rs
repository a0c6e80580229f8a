//! In-memory live channel for tests.
//!
//! Every successful `connect` creates a channel whose inbound events are fed by
//! the returned-by-index [`InMemoryChannelHandle`]. The connector counts
//! attempts and currently open channels so tests can assert connection sharing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ports::outbound::{ChannelError, ChannelEvent, LiveChannel, LiveChannelConnector};
use crate::queue_types::StreamId;

#[derive(Default)]
struct ConnectorState {
    attempts: Vec<StreamId>,
    connections: Vec<InMemoryChannelHandle>,
    fail_remaining: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    open: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().fail_remaining = count;
    }

    /// Connect attempts so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn attempted_streams(&self) -> Vec<StreamId> {
        self.lock().attempts.clone()
    }

    /// Channels handed out and not yet closed by either side.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Handle for the `index`-th successful connection.
    pub fn connection(&self, index: usize) -> Option<InMemoryChannelHandle> {
        self.lock().connections.get(index).cloned()
    }

    pub fn last_connection(&self) -> Option<InMemoryChannelHandle> {
        self.lock().connections.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl LiveChannelConnector for InMemoryConnector {
    async fn connect(&self, stream_id: &StreamId) -> Result<Box<dyn LiveChannel>, ChannelError> {
        let mut state = self.lock();
        state.attempts.push(stream_id.clone());
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(ChannelError::ConnectFailed("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        state.connections.push(InMemoryChannelHandle {
            stream_id: stream_id.clone(),
            events: tx,
            closed: Arc::clone(&closed),
        });
        self.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryChannel {
            events: rx,
            closed,
            open: Arc::clone(&self.open),
        }))
    }
}

/// Server side of one in-memory channel.
#[derive(Clone)]
pub struct InMemoryChannelHandle {
    pub stream_id: StreamId,
    events: mpsc::UnboundedSender<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

impl InMemoryChannelHandle {
    pub fn send_text(&self, text: &str) {
        let _ = self.events.send(ChannelEvent::Text(text.to_string()));
    }

    pub fn send_json(&self, value: serde_json::Value) {
        let _ = self.events.send(ChannelEvent::Text(value.to_string()));
    }

    pub fn send_error(&self, message: &str) {
        let _ = self.events.send(ChannelEvent::Error(message.to_string()));
    }

    /// Close from the server side with `code`.
    pub fn close_with(&self, code: u16) {
        let _ = self.events.send(ChannelEvent::Closed { code });
    }

    /// Whether the client side has closed or dropped this channel.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct InMemoryChannel {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    closed: Arc<AtomicBool>,
    open: Arc<AtomicUsize>,
}

impl InMemoryChannel {
    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl LiveChannel for InMemoryChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.recv().await
    }

    async fn close(&mut self) {
        self.mark_closed();
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
