//! # StudyMate SDK - realtime connectivity for study-room clients
//!
//! Keeps a signed-in StudyMate session usable across flaky networks and
//! short-lived credentials:
//!
//! ```rust,no_run
//! use studymate_sdk::{RealtimeSession, SdkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), studymate_sdk::SdkError> {
//!     studymate_sdk::logging::init_logging_from_env()?;
//!
//!     let session = RealtimeSession::new(SdkConfig::from_env()?)?;
//!     session.start();
//!
//!     let rooms = session.broker().addresses();
//!     let _chat = session.broker().subscribe(
//!         &rooms.room_topic(42),
//!         |message| println!("chat: {}", message.body),
//!         None,
//!     )?;
//!
//!     let rooms_page = session.auth().get("/rooms").await?;
//!     println!("rooms: {}", rooms_page.body);
//!
//!     session.logout().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Broker connection**: STOMP over WebSocket, reconnected with capped
//!   exponential backoff; subscriptions survive reconnects
//! - **Send gate**: `send()` reports `false` instead of queueing while offline
//! - **Transparent credential refresh**: concurrent 401s share one refresh and
//!   are replayed once each
//! - **Notification feed**: server-sent events with a bounded retry budget
//! - **Logout**: one call tears down every transport and forgets credentials
//!
//! ## Architecture
//!
//! ```text
//! studymate-sdk (RealtimeSession, config, logging)
//!     ↓
//! broker-client ── auth-client ── notification-stream
//!     ↓                                 ↓
//! connection-state (ConnectionState, ReconnectPolicy, StateNotifier)
//! ```

pub use config::{SdkConfig, DEFAULT_API_BASE_URL, DEFAULT_WS_URL};
pub use error::{Result, SdkError};
pub use session::RealtimeSession;

pub use auth_client::{AuthClient, AuthConfig, AuthError, AuthState};
pub use broker_client::{BrokerClient, BrokerConfig, BrokerMessage, Destinations, Headers, Subscription};
pub use connection_state::ConnectionState;
pub use notification_stream::{
    Notification, NotificationConfig, NotificationEvent, NotificationEventKind, NotificationStream,
};

pub mod logging;

mod config;
mod error;
mod session;
