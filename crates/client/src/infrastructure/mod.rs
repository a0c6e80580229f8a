//! Infrastructure adapters for the outbound ports

pub mod analytics;
pub mod config;
pub mod http_client;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use analytics::{HttpAnalytics, LoggingAnalytics};
pub use config::ClientConfig;
pub use http_client::HttpPromptApi;
pub use websocket::TungsteniteConnector;
