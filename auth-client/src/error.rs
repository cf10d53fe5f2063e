//! Error types for the auth client

use thiserror::Error;

/// Errors returned by [`AuthClient`](crate::AuthClient)
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// The session could not be recovered; auth state has been cleared
    #[error("Not authenticated (HTTP {status})")]
    Unauthenticated { status: u16 },

    /// The credential refresh failed; auth state has been cleared
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// A request or response body could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outcome of a failed refresh, shared by every caller awaiting it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The server refused to issue a new credential
    #[error("refresh rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The refresh call itself failed
    #[error("refresh request failed: {0}")]
    Network(String),

    /// The refresh call did not finish within `refresh_timeout`
    #[error("refresh timed out")]
    TimedOut,

    /// The session was reset (logout) while the refresh was running
    #[error("refresh cancelled by session reset")]
    Cancelled,
}

/// Convenience type alias for Results using AuthError
pub type Result<T> = std::result::Result<T, AuthError>;

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::Unauthenticated { status: 401 }.to_string(),
            "Not authenticated (HTTP 401)"
        );
        assert_eq!(
            AuthError::from(RefreshError::Rejected { status: 401 }).to_string(),
            "Credential refresh failed: refresh rejected with HTTP 401"
        );
        assert_eq!(RefreshError::TimedOut.to_string(), "refresh timed out");
    }
}
