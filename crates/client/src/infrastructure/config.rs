//! Client configuration

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080";

/// Client configuration loaded from environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Prompt queue REST base URL
    pub api_base_url: String,
    /// Live-update WebSocket base URL
    pub ws_base_url: String,
    /// Delay before reconnecting an abnormally closed channel
    pub reconnect_delay: Duration,
    /// Timeout for queue REST requests
    pub request_timeout: Duration,
    /// Analytics ingestion endpoint; events are only logged when unset
    pub analytics_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_base_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay: Duration::from_millis(3_000),
            request_timeout: Duration::from_secs(30),
            analytics_url: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_base_url = var("DAYDREAM_API_URL")
            .or_else(|| var("NEXT_PUBLIC_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let ws_base_url = var("DAYDREAM_WS_URL")
            .or_else(|| var("NEXT_PUBLIC_API_WS_URL"))
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        let reconnect_delay_ms: u64 = var("DAYDREAM_RECONNECT_DELAY_MS")
            .unwrap_or_else(|| "3000".to_string())
            .trim()
            .parse()
            .context("DAYDREAM_RECONNECT_DELAY_MS must be a number of milliseconds")?;
        let request_timeout_secs: u64 = var("DAYDREAM_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .trim()
            .parse()
            .context("DAYDREAM_REQUEST_TIMEOUT_SECS must be a number of seconds")?;

        Ok(Self {
            api_base_url: api_base_url.trim().trim_end_matches('/').to_string(),
            ws_base_url: ws_base_url.trim().trim_end_matches('/').to_string(),
            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            analytics_url: var("DAYDREAM_ANALYTICS_URL").map(|url| url.trim().to_string()),
        })
    }
}
