//! Analytics sinks

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::ports::outbound::{AnalyticsError, AnalyticsEvent, AnalyticsPort};

/// Writes events to the log only. Used when no ingestion endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAnalytics;

#[async_trait]
impl AnalyticsPort for LoggingAnalytics {
    async fn track(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        tracing::debug!(event = event.name(), properties = %event.properties(), "Analytics event");
        Ok(())
    }
}

/// Posts `{ "event", "properties" }` to an ingestion endpoint.
#[derive(Clone)]
pub struct HttpAnalytics {
    client: Client,
    url: String,
}

impl HttpAnalytics {
    pub fn new(url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl AnalyticsPort for HttpAnalytics {
    async fn track(&self, event: AnalyticsEvent) -> Result<(), AnalyticsError> {
        let body = json!({
            "event": event.name(),
            "properties": event.properties(),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalyticsError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalyticsError::DeliveryFailed(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}
