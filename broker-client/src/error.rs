//! Error types for the broker-client crate.
//!
//! Connection faults never reach callers of `connect()`; they are absorbed
//! by the reconnection scheduler. These types surface from configuration,
//! subscription registration and the transport trait boundary.

/// Errors returned by the broker client API.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A destination was empty or malformed
    #[error("Invalid destination: {0:?}")]
    InvalidDestination(String),

    /// An error reported by the transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from transport implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The session has not received its CONNECTED frame yet, or lost it
    #[error("Transport is not connected")]
    NotConnected,

    /// The session has shut down and can no longer queue frames
    #[error("Transport session closed")]
    Closed,

    /// The WebSocket handshake or socket I/O failed
    #[error("Socket error: {0}")]
    Socket(String),

    /// The broker sent an ERROR frame or a frame we could not understand
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Errors from decoding STOMP frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The input ended before the frame terminator
    #[error("Incomplete frame")]
    Incomplete,

    /// The command line did not name a known STOMP command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A header line had no ':' separator
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),

    /// A header used an escape sequence STOMP 1.2 does not define
    #[error("Invalid header escape in: {0}")]
    InvalidEscape(String),

    /// The content-length header was not a number
    #[error("Invalid content-length: {0}")]
    InvalidContentLength(String),

    /// The frame body was not valid UTF-8
    #[error("Frame body is not valid UTF-8")]
    InvalidUtf8,
}

/// Convenience type alias for Results using BrokerError.
pub type Result<T> = std::result::Result<T, BrokerError>;
