//! Events delivered to notification listeners
//!
//! The server emits four named SSE events (`connected`, `notification`,
//! `heartbeat`, `test`). The stream adds two of its own: `error` whenever the
//! feed drops, and `reconnect_failed` once the retry budget is spent.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Listener category, one per [`NotificationEvent`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationEventKind {
    Connected,
    Notification,
    Heartbeat,
    Test,
    Error,
    ReconnectFailed,
}

impl NotificationEventKind {
    /// Kind for an SSE `event:` name sent by the server
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "connected" => Some(Self::Connected),
            "notification" => Some(Self::Notification),
            "heartbeat" => Some(Self::Heartbeat),
            "test" => Some(Self::Test),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Notification => "notification",
            Self::Heartbeat => "heartbeat",
            Self::Test => "test",
            Self::Error => "error",
            Self::ReconnectFailed => "reconnect_failed",
        }
    }
}

impl fmt::Display for NotificationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a notification is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    ChatMessage,
    UserJoin,
    UserLeave,
    PresenceUpdate,
    #[serde(other)]
    Other,
}

/// Payload of a `notification` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

/// Payload of a `heartbeat` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Server reply to a test-notification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    /// At least one open feed of this user received the `test` event
    pub success: bool,
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Feeds the server holds open for this user
    #[serde(default)]
    pub connections: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// An event handed to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// The server accepted the subscription; carries its greeting text
    Connected { message: String },
    Notification(Notification),
    Heartbeat(Heartbeat),
    /// Diagnostic message triggered from the server side
    Test(serde_json::Value),
    /// The feed dropped or could not be opened
    Error { message: String },
    /// Every retry failed; the stream stays down until `connect()` is called
    ReconnectFailed { attempts: u32 },
}

impl NotificationEvent {
    pub fn kind(&self) -> NotificationEventKind {
        match self {
            Self::Connected { .. } => NotificationEventKind::Connected,
            Self::Notification(_) => NotificationEventKind::Notification,
            Self::Heartbeat(_) => NotificationEventKind::Heartbeat,
            Self::Test(_) => NotificationEventKind::Test,
            Self::Error { .. } => NotificationEventKind::Error,
            Self::ReconnectFailed { .. } => NotificationEventKind::ReconnectFailed,
        }
    }

    /// Decode a server-sent event
    ///
    /// Returns `Ok(None)` for event names this client does not handle.
    pub fn decode(name: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = NotificationEventKind::from_event_name(name) else {
            return Ok(None);
        };
        let event = match kind {
            NotificationEventKind::Connected => Self::Connected {
                message: data.to_string(),
            },
            NotificationEventKind::Notification => Self::Notification(serde_json::from_str(data)?),
            NotificationEventKind::Heartbeat => Self::Heartbeat(serde_json::from_str(data)?),
            NotificationEventKind::Test => Self::Test(serde_json::from_str(data)?),
            NotificationEventKind::Error | NotificationEventKind::ReconnectFailed => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_notification() {
        let data = r#"{
            "type": "PRESENCE_UPDATE",
            "roomId": 7,
            "providerId": "google-123",
            "nickname": "mina",
            "message": "mina is studying",
            "timestamp": "2025-03-01T10:15:30",
            "data": {"status": "STUDYING"}
        }"#;

        let event = NotificationEvent::decode("notification", data).unwrap().unwrap();
        let NotificationEvent::Notification(notification) = event else {
            panic!("expected a notification");
        };
        assert_eq!(notification.kind, NotificationType::PresenceUpdate);
        assert_eq!(notification.room_id, Some(7));
        assert_eq!(notification.provider_id.as_deref(), Some("google-123"));
        assert_eq!(notification.data["status"], "STUDYING");
    }

    #[test]
    fn test_decode_sparse_notification() {
        let event = NotificationEvent::decode("notification", r#"{"type":"ROOM_CLOSED"}"#)
            .unwrap()
            .unwrap();
        let NotificationEvent::Notification(notification) = event else {
            panic!("expected a notification");
        };
        assert_eq!(notification.kind, NotificationType::Other);
        assert!(notification.room_id.is_none());
        assert!(notification.data.is_empty());
    }

    #[test]
    fn test_decode_connected_keeps_plain_text() {
        let event = NotificationEvent::decode("connected", "subscription open").unwrap();
        assert_eq!(
            event,
            Some(NotificationEvent::Connected {
                message: "subscription open".to_string()
            })
        );
    }

    #[test]
    fn test_decode_heartbeat() {
        let event = NotificationEvent::decode(
            "heartbeat",
            r#"{"type":"heartbeat","timestamp":"2025-03-01T10:15:30"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.kind(), NotificationEventKind::Heartbeat);
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        assert!(NotificationEvent::decode("notification", "{not json").is_err());
    }

    #[test]
    fn test_decode_ignores_unknown_and_synthetic_names() {
        assert_eq!(NotificationEvent::decode("message", "hi").unwrap(), None);
        assert_eq!(NotificationEvent::decode("error", "{}").unwrap(), None);
    }
}
