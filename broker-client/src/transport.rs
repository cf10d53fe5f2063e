//! Transport abstraction for the broker client.
//!
//! The [`BrokerClient`](crate::BrokerClient) owns the connection state
//! machine, the reconnection scheduler and the subscription table. Moving
//! bytes is delegated to a [`Transport`], which opens one
//! [`TransportSession`] per connection attempt.
//!
//! # Session lifecycle
//!
//! 1. `connect()` calls [`Transport::activate`] with a fresh [`SessionEvents`]
//!    handle and stores the returned session.
//! 2. The session reports its lifecycle through the events handle:
//!    [`SessionEvents::connected`] once the broker acknowledged the
//!    handshake, then exactly one of [`SessionEvents::protocol_error`],
//!    [`SessionEvents::socket_error`] or [`SessionEvents::closed`] when it
//!    ends (an error may be followed by `closed`; the client deduplicates).
//! 3. `disconnect()` detaches the session and awaits
//!    [`TransportSession::deactivate`].
//!
//! Every events handle is tagged with the generation of the attempt that
//! created it. Once a session has been detached or replaced, its callbacks
//! are ignored, so a late `closed` from a torn-down socket never schedules a
//! retry for the connection that replaced it.
//!
//! # Implementation guidelines
//!
//! `activate` must not invoke the events handle before it returns; report
//! lifecycle changes from the spawned session task. `subscribe` and
//! `publish` queue work and return immediately. Live subscriptions are
//! never cancelled individually; they end with their session.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::client::ClientCore;
use crate::error::TransportError;
use crate::message::{Dispatcher, Headers};

/// Factory for transport sessions
pub trait Transport: Send + Sync + 'static {
    /// Start a new session. The returned handle reports `is_active() == true`
    /// until the underlying connection is gone.
    fn activate(&self, events: SessionEvents) -> Arc<dyn TransportSession>;
}

/// One connection attempt to the broker
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Whether the underlying connection is open or still opening
    fn is_active(&self) -> bool;

    /// Create a live subscription bound to `dispatcher` and return its id
    fn subscribe(
        &self,
        destination: &str,
        headers: &Headers,
        dispatcher: Dispatcher,
    ) -> Result<String, TransportError>;

    /// Publish a text body to a destination
    fn publish(&self, destination: &str, body: &str, headers: &Headers) -> Result<(), TransportError>;

    /// Gracefully close the session
    async fn deactivate(&self);
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCause {
    ProtocolError,
    SocketError,
    Closed,
}

impl fmt::Display for LossCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossCause::ProtocolError => write!(f, "protocol error"),
            LossCause::SocketError => write!(f, "socket error"),
            LossCause::Closed => write!(f, "socket closed"),
        }
    }
}

/// Lifecycle callback handle given to a session
#[derive(Clone)]
pub struct SessionEvents {
    core: Weak<ClientCore>,
    generation: u64,
}

impl SessionEvents {
    pub(crate) fn new(core: Weak<ClientCore>, generation: u64) -> Self {
        Self { core, generation }
    }

    /// Generation of the connection attempt this handle belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The broker acknowledged the handshake
    pub fn connected(&self) {
        if let Some(core) = self.core.upgrade() {
            core.on_connected(self.generation);
        }
    }

    /// The broker reported an error frame
    pub fn protocol_error(&self, message: &str) {
        tracing::warn!(generation = self.generation, "Broker protocol error: {}", message);
        self.lost(LossCause::ProtocolError);
    }

    /// The socket failed
    pub fn socket_error(&self, message: &str) {
        tracing::warn!(generation = self.generation, "Broker socket error: {}", message);
        self.lost(LossCause::SocketError);
    }

    /// The socket closed
    pub fn closed(&self) {
        self.lost(LossCause::Closed);
    }

    fn lost(&self, cause: LossCause) {
        if let Some(core) = self.core.upgrade() {
            core.on_lost(self.generation, cause);
        }
    }
}

impl fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEvents")
            .field("generation", &self.generation)
            .field("client_alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
