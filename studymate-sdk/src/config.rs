//! Session configuration
//!
//! Aggregates the per-transport configs. Defaults target a local backend;
//! deployments override the two base addresses through the environment.

use auth_client::AuthConfig;
use broker_client::BrokerConfig;
use notification_stream::NotificationConfig;

use crate::error::{Result, SdkError};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:9005/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:9005/ws";

/// Configuration for a [`RealtimeSession`](crate::RealtimeSession)
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub auth: AuthConfig,
    pub broker: BrokerConfig,
    pub notifications: NotificationConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL, DEFAULT_WS_URL)
    }
}

impl SdkConfig {
    /// Config for a backend serving REST under `api_base_url` and STOMP at `ws_url`
    pub fn new(api_base_url: &str, ws_url: &str) -> Self {
        Self {
            auth: AuthConfig::new(api_base_url),
            broker: BrokerConfig::new(ws_url),
            notifications: NotificationConfig::for_api(api_base_url),
        }
    }

    /// Read `STUDYMATE_API_BASE_URL` and `STUDYMATE_WS_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self::new(
            &read("STUDYMATE_API_BASE_URL", DEFAULT_API_BASE_URL),
            &read("STUDYMATE_WS_URL", DEFAULT_WS_URL),
        );
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.broker.validate()?;
        self.notifications.validate()?;

        let api = url::Url::parse(&self.auth.base_url)
            .map_err(|e| SdkError::Config(format!("Invalid API base URL: {e}")))?;
        let ws = url::Url::parse(&self.broker.url)
            .map_err(|e| SdkError::Config(format!("Invalid broker URL: {e}")))?;
        if api.host_str() != ws.host_str() {
            tracing::warn!(
                api = %self.auth.base_url,
                broker = %self.broker.url,
                "API and broker hosts differ; the broker handshake will not carry session cookies"
            );
        }
        Ok(())
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.notifications = notifications;
        self
    }
}
