//! Live-update channel over WebSocket
//!
//! - `client`: tokio-tungstenite connector and channel
//! - `shared`: endpoint URL construction

mod client;
mod shared;

pub use client::{TungsteniteChannel, TungsteniteConnector};
pub use shared::stream_url;
