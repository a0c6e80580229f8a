//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! allowing the queue services to talk to the backend without depending on a
//! concrete transport.

pub mod analytics_port;
pub mod live_channel_port;
pub mod prompt_api_port;

pub use analytics_port::{AnalyticsError, AnalyticsEvent, AnalyticsPort};
pub use live_channel_port::{
    is_normal_closure, ChannelError, ChannelEvent, LiveChannel, LiveChannelConnector,
    CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_NO_STATUS,
};
pub use prompt_api_port::{ApiError, PromptApiPort};

#[cfg(test)]
pub use analytics_port::MockAnalyticsPort;
#[cfg(test)]
pub use prompt_api_port::MockPromptApiPort;
