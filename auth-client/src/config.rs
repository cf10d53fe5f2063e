//! Configuration for the auth client

use std::time::Duration;

use crate::error::AuthError;

/// Configuration for [`AuthClient`](crate::AuthClient)
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL that request paths are appended to
    /// Default: `http://localhost:9005/api`
    pub base_url: String,

    /// Path of the credential refresh endpoint
    /// Default: `/auth/refresh`
    pub refresh_path: String,

    /// Path of the logout endpoint
    /// Default: `/auth/logout`
    pub logout_path: String,

    /// HTTP status that means "access credential missing or expired"
    /// Default: 401
    pub unauthenticated_status: u16,

    /// Upper bound for a single refresh call; a hung refresh fails every waiter
    /// Default: 10 seconds
    pub refresh_timeout: Duration,

    /// Upper bound for any other request, including replays
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9005/api".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_path: "/auth/logout".to_string(),
            unauthenticated_status: 401,
            refresh_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl AuthConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(format!(
                "Base URL must use http:// or https://, got {}",
                parsed.scheme()
            )));
        }

        for path in [&self.refresh_path, &self.logout_path] {
            if !path.starts_with('/') {
                return Err(AuthError::Configuration(format!("Path must start with '/': {path}")));
            }
        }

        if !(400..=599).contains(&self.unauthenticated_status) {
            return Err(AuthError::Configuration(format!(
                "Unauthenticated status must be an HTTP error code, got {}",
                self.unauthenticated_status
            )));
        }

        if self.refresh_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(AuthError::Configuration("Timeouts must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Absolute URL for a request path; absolute URLs pass through
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    pub fn with_unauthenticated_status(mut self, status: u16) -> Self {
        self.unauthenticated_status = status;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
