//! Configuration types for the broker client
//!
//! This module defines the configuration that controls the broker connection:
//! server address, reconnection backoff, STOMP heart-beating and the
//! destination prefixes used to build publish/subscribe addresses.

use std::time::Duration;

use connection_state::ReconnectPolicy;

use crate::error::BrokerError;

/// Configuration for the [`BrokerClient`](crate::BrokerClient)
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// WebSocket endpoint of the STOMP broker
    /// Default: `ws://localhost:9005/ws`
    pub url: String,

    /// First reconnection delay
    /// Default: 500 milliseconds
    pub reconnect_base_delay: Duration,

    /// Upper bound for reconnection delays
    /// Default: 10 seconds
    pub reconnect_max_delay: Duration,

    /// Interval at which we promise to send heart-beats (0 disables)
    /// Default: 10 seconds
    pub heartbeat_outgoing: Duration,

    /// Interval at which we want to receive heart-beats (0 disables)
    /// Default: 10 seconds
    pub heartbeat_incoming: Duration,

    /// Multiplier applied to the negotiated incoming interval before the
    /// connection is considered dead
    /// Default: 2
    pub heartbeat_tolerance: u32,

    /// Timeout for the WebSocket handshake
    /// Default: 10 seconds
    pub connect_timeout: Duration,

    /// Upper bound for graceful teardown in `disconnect()`
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,

    /// Prefix for application (outbound) destinations
    /// Default: `/app`
    pub outbound_prefix: String,

    /// Prefix for broadcast (subscribe) destinations
    /// Default: `/topic`
    pub broadcast_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9005/ws".to_string(),
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(10),
            heartbeat_outgoing: Duration::from_secs(10),
            heartbeat_incoming: Duration::from_secs(10),
            heartbeat_tolerance: 2,
            connect_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            outbound_prefix: "/app".to_string(),
            broadcast_prefix: "/topic".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Create a BrokerConfig for the given broker URL with default values
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Fresh reconnect policy built from this configuration (unbounded attempts)
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.reconnect_base_delay, self.reconnect_max_delay)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), BrokerError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| BrokerError::Configuration(format!("Invalid broker URL {}: {}", self.url, e)))?;

        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(BrokerError::Configuration(format!(
                "Broker URL must use ws:// or wss://, got {}",
                parsed.scheme()
            )));
        }

        if self.reconnect_base_delay.is_zero() {
            return Err(BrokerError::Configuration(
                "Reconnect base delay must be greater than 0".to_string(),
            ));
        }

        if self.reconnect_base_delay > self.reconnect_max_delay {
            return Err(BrokerError::Configuration(
                "Invalid reconnect delays: base must not exceed max".to_string(),
            ));
        }

        if self.heartbeat_tolerance == 0 {
            return Err(BrokerError::Configuration(
                "Heart-beat tolerance must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(BrokerError::Configuration(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        for prefix in [&self.outbound_prefix, &self.broadcast_prefix] {
            if !prefix.starts_with('/') || prefix.ends_with('/') {
                return Err(BrokerError::Configuration(format!(
                    "Destination prefix must start with '/' and not end with '/': {prefix}"
                )));
            }
        }

        Ok(())
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    pub fn with_heartbeat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.heartbeat_outgoing = outgoing;
        self.heartbeat_incoming = incoming;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_prefixes(mut self, outbound: impl Into<String>, broadcast: impl Into<String>) -> Self {
        self.outbound_prefix = outbound.into();
        self.broadcast_prefix = broadcast.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.url, "ws://localhost:9005/ws");
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(500));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(10));
        assert_eq!(config.heartbeat_outgoing, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid_scheme = BrokerConfig::new("http://localhost:9005/ws");
        assert!(invalid_scheme.validate().is_err());

        let invalid_url = BrokerConfig::new("not a url");
        assert!(invalid_url.validate().is_err());

        let invalid_delays = BrokerConfig::default()
            .with_reconnect_delays(Duration::from_secs(30), Duration::from_secs(10));
        assert!(invalid_delays.validate().is_err());

        let zero_base = BrokerConfig::default()
            .with_reconnect_delays(Duration::ZERO, Duration::from_secs(10));
        assert!(zero_base.validate().is_err());

        let bad_prefix = BrokerConfig::default().with_prefixes("app", "/topic");
        assert!(bad_prefix.validate().is_err());

        let trailing_slash = BrokerConfig::default().with_prefixes("/app", "/topic/");
        assert!(trailing_slash.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = BrokerConfig::new("wss://study.example.com/ws")
            .with_reconnect_delays(Duration::from_millis(250), Duration::from_secs(5))
            .with_heartbeat(Duration::ZERO, Duration::from_secs(20))
            .with_connect_timeout(Duration::from_secs(3))
            .with_prefixes("/app", "/queue");

        assert_eq!(config.url, "wss://study.example.com/ws");
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(config.heartbeat_outgoing, Duration::ZERO);
        assert_eq!(config.broadcast_prefix, "/queue");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let mut policy = BrokerConfig::default().reconnect_policy();
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(policy.max_attempts(), None);
    }
}
