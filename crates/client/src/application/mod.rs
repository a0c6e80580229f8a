//! Application layer - queue state, channel lifecycle, and submission
//!
//! - `cache`: per-stream queue state shared by every consumer
//! - `channel_manager`: one live channel per stream, reconnect on abnormal close
//! - `registry`: subscriber bookkeeping driving the channel lifecycle
//! - `gateway`: guarded prompt submission
//! - `reconciliation`: queue status of a remembered prompt
//! - `overlay`: optimistic placeholders for in-flight submissions
//! - `prompt_queue`: the per-consumer facade composing the above

pub mod cache;
pub mod channel_manager;
pub mod gateway;
pub mod overlay;
pub mod prompt_queue;
pub mod reconciliation;
pub mod registry;

pub use cache::ConnectionCache;
pub use channel_manager::{ChannelManager, DEFAULT_RECONNECT_DELAY};
pub use gateway::PromptGateway;
pub use overlay::{OptimisticOverlay, OptimisticPromptEntry};
pub use prompt_queue::{PromptQueue, VisibleQueueItem};
pub use reconciliation::{reconcile, TrackedPrompt};
pub use registry::SubscriptionRegistry;
