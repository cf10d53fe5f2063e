use thiserror::Error;

use crate::logging::LoggingError;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] auth_client::AuthError),

    #[error("Broker error: {0}")]
    Broker(#[from] broker_client::BrokerError),

    #[error("Notification stream error: {0}")]
    Notifications(#[from] notification_stream::NotificationError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

pub type Result<T> = std::result::Result<T, SdkError>;
