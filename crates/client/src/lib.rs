//! Daydream Client - prompt queue and live-update fan-out
//!
//! Keeps one live-update connection per stream no matter how many consumers
//! observe it, fans queue state out to every subscriber, and submits prompts
//! with per-stream re-entrancy protection.
//!
//! ```text
//! PromptQueue (one per consumer)
//!    │
//!    ├── SubscriptionRegistry ── ChannelManager ── LiveChannelConnector
//!    │            │                    │
//!    │            └──── ConnectionCache ┘
//!    │
//!    ├── PromptGateway ── PromptApiPort, AnalyticsPort
//!    └── OptimisticOverlay
//! ```

pub mod app;
pub mod application;
pub mod infrastructure;
pub mod ports;
pub mod queue_types;

pub use app::App;
pub use application::{PromptQueue, VisibleQueueItem};
pub use infrastructure::ClientConfig;
pub use queue_types::{
    ActivePrompt, QueueSnapshot, QueueStatus, StreamId, SubmitOutcome, SubscriberCallback,
    SubscriberId,
};
