//! Error types for the notification-stream crate.

/// Errors from opening or reading the notification feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The feed could not be opened
    #[error("Failed to open notification feed: {0}")]
    Connect(String),

    /// The server answered a feed request with a non-success status
    #[error("Notification feed rejected with HTTP {status}")]
    Status { status: u16 },

    /// The feed failed mid-stream
    #[error("Notification feed error: {0}")]
    Stream(String),

    /// A response body could not be decoded
    #[error("Invalid response from notification service: {0}")]
    Decode(String),

    /// The feed cannot perform the request
    #[error("Not supported by this feed: {0}")]
    Unsupported(String),
}

/// Convenience type alias for Results using NotificationError.
pub type Result<T> = std::result::Result<T, NotificationError>;
