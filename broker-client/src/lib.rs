//! # broker-client
//!
//! A micro-crate that keeps a STOMP-over-WebSocket broker connection alive for
//! StudyMate study rooms.
//!
//! The [`BrokerClient`] owns a three-state connection machine, reconnects with
//! capped exponential backoff after any transport failure, multiplexes many
//! local handlers onto one live subscription per destination and replays those
//! subscriptions after every reconnect. Outbound messages are gated on the
//! connection state: `send` returns `false` instead of queueing.
//!
//! Moving bytes is delegated to a [`Transport`]. [`WsTransport`] is the
//! tokio-tungstenite implementation; tests plug in their own.

mod client;
mod config;
mod destination;
mod error;
mod frame;
mod message;
mod subscription;
mod transport;
mod ws;

pub use client::BrokerClient;
pub use config::BrokerConfig;
pub use destination::Destinations;
pub use error::{BrokerError, FrameError, Result, TransportError};
pub use frame::{negotiate_heartbeat, Command, Frame};
pub use message::{BrokerMessage, Dispatcher, Headers, MessageHandler};
pub use subscription::Subscription;
pub use transport::{LossCause, SessionEvents, Transport, TransportSession};
pub use ws::{HandshakeHeaders, WsTransport};

pub use connection_state::{ConnectionState, ReconnectPolicy};
