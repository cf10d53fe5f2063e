//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one logical connection
///
/// Transitions:
///
/// ```text
/// Disconnected --connect()--> Connecting --ack--> Connected
/// Connecting   --error/close--> Disconnected
/// Connected    --error/close--> Disconnected
/// Connected    --disconnect()--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Not connected, or the connection was lost
    #[default]
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// The transport acknowledged the connection and is usable
    Connected,
}

impl ConnectionState {
    /// Whether the transport is usable right now
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a connection exists or is being established
    pub fn is_busy(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }

    /// Wire-style name, matching the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
