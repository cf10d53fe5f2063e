//! Source of raw server-sent events
//!
//! [`EventFeed`] is the seam between the stream manager and HTTP. The
//! production implementation issues a `GET` with the cookie-carrying reqwest
//! client and parses the body with `eventsource-stream`; tests script one.
//! The HTTP feed can also ask the server to push a `test` event down every
//! feed the user has open.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};

use crate::config::NotificationConfig;
use crate::error::{NotificationError, Result};
use crate::event::ConnectionTestResult;

/// One parsed SSE event: its `event:` name and joined `data:` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Events from one open feed; the stream ends when the server closes it
pub type EventStream = BoxStream<'static, Result<SseEvent>>;

/// Opens the notification feed
#[async_trait]
pub trait EventFeed: Send + Sync + 'static {
    async fn open(&self) -> Result<EventStream>;

    /// Ask the server to send a `test` event to this user's open feeds
    async fn request_test(&self) -> Result<ConnectionTestResult> {
        Err(NotificationError::Unsupported("test notifications".to_string()))
    }
}

/// Feed over HTTP using a shared reqwest client
///
/// Pass the client that holds the session cookies so the subscribe request
/// is authenticated the same way as REST calls.
pub struct HttpEventFeed {
    client: reqwest::Client,
    url: String,
    test_url: String,
    connect_timeout: std::time::Duration,
}

impl HttpEventFeed {
    pub fn new(client: reqwest::Client, config: &NotificationConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            test_url: config.test_url.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventFeed for HttpEventFeed {
    async fn open(&self) -> Result<EventStream> {
        let request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .map_err(|_| NotificationError::Connect(format!("no response within {:?}", self.connect_timeout)))?
            .map_err(|e| NotificationError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status {
                status: status.as_u16(),
            });
        }

        tracing::debug!(url = %self.url, "Notification feed opened");

        let events = response
            .bytes_stream()
            .eventsource()
            .map(|item| {
                item.map(|event| SseEvent {
                    event: event.event,
                    data: event.data,
                })
                .map_err(|e| NotificationError::Stream(e.to_string()))
            });

        Ok(events.boxed())
    }

    async fn request_test(&self) -> Result<ConnectionTestResult> {
        let request = self
            .client
            .post(&self.test_url)
            .header(CONTENT_TYPE, "application/json")
            .send();

        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .map_err(|_| NotificationError::Connect(format!("no response within {:?}", self.connect_timeout)))?
            .map_err(|e| NotificationError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NotificationError::Connect(e.to_string()))?;
        let result: ConnectionTestResult =
            serde_json::from_slice(&body).map_err(|e| NotificationError::Decode(e.to_string()))?;

        tracing::debug!(success = result.success, connections = result.connections, "Test notification requested");
        Ok(result)
    }
}
