//! Configuration for the notification stream

use std::time::Duration;

use connection_state::ReconnectPolicy;

use crate::error::NotificationError;

/// Path of the subscribe endpoint below the API base URL
pub const DEFAULT_SUBSCRIBE_PATH: &str = "/notifications/subscribe";

/// Path of the endpoint that pushes a `test` event down the caller's feed
pub const DEFAULT_TEST_PATH: &str = "/notifications/test";

/// Configuration for the [`NotificationStream`](crate::NotificationStream)
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Absolute URL of the event feed
    /// Default: `http://localhost:9005/api/notifications/subscribe`
    pub url: String,

    /// Absolute URL that asks the server for a `test` event
    /// Default: `http://localhost:9005/api/notifications/test`
    pub test_url: String,

    /// Delay before the first retry
    /// Default: 1 second
    pub base_delay: Duration,

    /// Upper bound for retry delays
    /// Default: 30 seconds
    pub max_delay: Duration,

    /// Retries scheduled before the stream gives up
    /// Default: 5
    pub max_attempts: u32,

    /// Timeout for the subscribe request to return response headers
    /// Default: 10 seconds
    pub connect_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self::for_api("http://localhost:9005/api")
    }
}

impl NotificationConfig {
    /// Config for the subscribe endpoint under `api_base_url`
    pub fn for_api(api_base_url: &str) -> Self {
        let base = api_base_url.trim_end_matches('/');
        Self {
            url: format!("{base}{DEFAULT_SUBSCRIBE_PATH}"),
            test_url: format!("{base}{DEFAULT_TEST_PATH}"),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Fresh bounded retry policy
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::bounded(self.base_delay, self.max_delay, self.max_attempts)
    }

    pub fn validate(&self) -> Result<(), NotificationError> {
        for url in [&self.url, &self.test_url] {
            let parsed = url::Url::parse(url).map_err(|e| {
                NotificationError::Configuration(format!("Invalid feed URL {}: {}", url, e))
            })?;

            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(NotificationError::Configuration(format!(
                    "Feed URL must use http:// or https://, got {}",
                    parsed.scheme()
                )));
            }
        }

        if self.base_delay.is_zero() || self.base_delay > self.max_delay {
            return Err(NotificationError::Configuration(
                "Invalid retry delays: base must be non-zero and not exceed max".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = url.into();
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
