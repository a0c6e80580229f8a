//! Live-update channel port.
//!
//! One `LiveChannel` is a single bidirectional streaming connection scoped to a
//! stream. The channel manager only ever reads from it; the backend pushes
//! queue state as text frames.

use async_trait::async_trait;

use crate::queue_types::StreamId;

/// Close codes that mean the peer went away on purpose.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Transport dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Normal and going-away closures are final; everything else is retried.
pub fn is_normal_closure(code: u16) -> bool {
    code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Inbound text frame
    Text(String),
    /// Peer closed the channel with the given code
    Closed { code: u16 },
    /// Transport error; the channel is unusable afterwards
    Error(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid channel URL: {0}")]
    InvalidUrl(String),
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
}

#[async_trait]
pub trait LiveChannel: Send {
    /// Next inbound event, or `None` once the transport is finished.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel with a normal closure.
    async fn close(&mut self);
}

#[async_trait]
pub trait LiveChannelConnector: Send + Sync {
    /// Open the per-stream update channel. Resolves once the handshake completes.
    async fn connect(&self, stream_id: &StreamId) -> Result<Box<dyn LiveChannel>, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_and_going_away_are_final() {
        assert!(is_normal_closure(CLOSE_NORMAL));
        assert!(is_normal_closure(CLOSE_GOING_AWAY));
        assert!(!is_normal_closure(CLOSE_NO_STATUS));
        assert!(!is_normal_closure(CLOSE_ABNORMAL));
        assert!(!is_normal_closure(1011));
    }
}
