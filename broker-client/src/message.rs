//! Inbound message type and handler aliases

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::frame::Frame;

/// STOMP headers attached to SUBSCRIBE and SEND frames
pub type Headers = BTreeMap<String, String>;

/// Consumer callback registered through `BrokerClient::subscribe`
pub type MessageHandler = Arc<dyn Fn(&BrokerMessage) + Send + Sync>;

/// Per-destination fan-out function bound to a live transport subscription
pub type Dispatcher = Arc<dyn Fn(&BrokerMessage) + Send + Sync>;

/// A message delivered by the broker on a subscribed destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Destination the message was published to
    pub destination: String,
    /// Transport-level subscription id the message arrived on
    pub subscription: String,
    /// Broker-assigned message id, if any
    pub message_id: Option<String>,
    /// All frame headers
    pub headers: Headers,
    /// UTF-8 body
    pub body: String,
}

impl BrokerMessage {
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            subscription: String::new(),
            message_id: None,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub(crate) fn from_frame(frame: Frame) -> Self {
        let destination = frame.get_header("destination").unwrap_or_default().to_string();
        let subscription = frame.get_header("subscription").unwrap_or_default().to_string();
        let message_id = frame.get_header("message-id").map(str::to_string);

        let mut headers = Headers::new();
        for (name, value) in frame.headers {
            headers.entry(name).or_insert(value);
        }

        Self {
            destination,
            subscription,
            message_id,
            headers,
            body: frame.body,
        }
    }
}
