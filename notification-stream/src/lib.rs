//! Server-Sent-Events notification feed for StudyMate.
//!
//! The backend pushes per-user notifications (chat messages, room joins and
//! leaves, presence changes) over a long-lived SSE response. This crate keeps
//! that feed open and fans its events out to listeners.
//!
//! # Overview
//!
//! - [`NotificationStream`]: owns the feed, retries it with exponential
//!   backoff (1s, 2s, 4s, 8s, 16s by default) and gives up after the retry
//!   budget is spent, reporting [`NotificationEvent::ReconnectFailed`].
//! - [`EventFeed`]: opens the raw event stream. [`HttpEventFeed`] does so
//!   with a shared `reqwest::Client`, so the session cookies authenticate
//!   the subscription.
//! - [`NotificationEvent`]: typed events, one listener category per variant.
//!
//! Unlike the broker connection, this feed is not restored forever: once it
//! gives up it stays down until [`NotificationStream::connect`] is called.
//!
//! # Example
//!
//! ```rust,ignore
//! use notification_stream::{NotificationConfig, NotificationEventKind, NotificationStream};
//!
//! let stream = NotificationStream::with_http_client(NotificationConfig::default(), http)?;
//!
//! stream.on_notification(|n| println!("{:?}", n.message));
//! stream.add_listener(NotificationEventKind::ReconnectFailed, |event| {
//!     eprintln!("notifications unavailable: {:?}", event);
//! });
//!
//! stream.connect();
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod feed;
mod listeners;
mod stream;

pub use config::{NotificationConfig, DEFAULT_SUBSCRIBE_PATH, DEFAULT_TEST_PATH};
pub use error::{NotificationError, Result};
pub use event::{
    ConnectionTestResult, Heartbeat, Notification, NotificationEvent, NotificationEventKind,
    NotificationType,
};
pub use feed::{EventFeed, EventStream, HttpEventFeed, SseEvent};
pub use listeners::{ListenerId, NotificationListener};
pub use stream::{NotificationStatus, NotificationStream};

pub use connection_state::ConnectionState;
