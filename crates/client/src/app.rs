//! Application state and composition.

use std::sync::Arc;
use std::time::Duration;

use crate::application::{
    ChannelManager, ConnectionCache, PromptGateway, PromptQueue, SubscriptionRegistry,
};
use crate::infrastructure::{
    ClientConfig, HttpAnalytics, HttpPromptApi, LoggingAnalytics, TungsteniteConnector,
};
use crate::ports::outbound::{AnalyticsPort, LiveChannelConnector, PromptApiPort};

/// Process-wide client state.
///
/// Holds the shared connection cache and the services built on it. Cloning
/// shares everything; every [`PromptQueue`] created from the same `App` shares
/// connections.
#[derive(Clone)]
pub struct App {
    pub cache: ConnectionCache,
    pub channels: ChannelManager,
    pub registry: SubscriptionRegistry,
    pub gateway: PromptGateway,
}

impl App {
    pub fn new(
        connector: Arc<dyn LiveChannelConnector>,
        api: Arc<dyn PromptApiPort>,
        analytics: Arc<dyn AnalyticsPort>,
        reconnect_delay: Duration,
    ) -> Self {
        let cache = ConnectionCache::new();
        let channels = ChannelManager::new(cache.clone(), connector, reconnect_delay);
        let registry = SubscriptionRegistry::new(cache.clone(), channels.clone());
        let gateway = PromptGateway::new(cache.clone(), api, analytics);

        Self {
            cache,
            channels,
            registry,
            gateway,
        }
    }

    /// Wire the WebSocket, REST, and analytics adapters from `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(&config.ws_base_url));
        let api = Arc::new(HttpPromptApi::with_timeout(
            &config.api_base_url,
            config.request_timeout,
        ));
        let analytics: Arc<dyn AnalyticsPort> = match &config.analytics_url {
            Some(url) => Arc::new(HttpAnalytics::new(url)),
            None => Arc::new(LoggingAnalytics),
        };

        tracing::info!(
            api_base_url = %config.api_base_url,
            ws_base_url = %config.ws_base_url,
            analytics = config.analytics_url.is_some(),
            "Daydream client configured"
        );
        Self::new(connector, api, analytics, config.reconnect_delay)
    }

    /// A new consumer view, not yet watching any stream.
    pub fn prompt_queue(&self) -> PromptQueue {
        PromptQueue::new(
            self.cache.clone(),
            self.registry.clone(),
            self.gateway.clone(),
        )
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.gateway.set_authenticated(authenticated);
    }
}
