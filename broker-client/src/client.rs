//! Broker client: connection state machine, reconnection scheduler and send gate
//!
//! [`BrokerClient`] is a cheap-to-clone handle around one shared core. The
//! core keeps the connection slot (state, current transport session,
//! session generation, reconnect policy and pending retry timer) behind a
//! single mutex that is never held across an `.await` or while user code
//! runs.

use std::sync::{Arc, Weak};

use connection_state::{ConnectionState, ReconnectPolicy, StateNotifier};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::destination::Destinations;
use crate::error::{BrokerError, Result};
use crate::message::{BrokerMessage, Headers};
use crate::subscription::{Subscription, SubscriptionTable};
use crate::transport::{LossCause, SessionEvents, Transport, TransportSession};
use crate::ws::WsTransport;

struct ConnectionSlot {
    state: ConnectionState,
    session: Option<Arc<dyn TransportSession>>,
    /// Bumped on every connect and disconnect; events from older sessions are ignored
    generation: u64,
    reconnect_allowed: bool,
    policy: ReconnectPolicy,
    retry_timer: Option<JoinHandle<()>>,
}

pub(crate) struct ClientCore {
    me: Weak<ClientCore>,
    config: BrokerConfig,
    transport: Arc<dyn Transport>,
    slot: Mutex<ConnectionSlot>,
    subscriptions: SubscriptionTable,
    notifier: StateNotifier,
}

impl ClientCore {
    fn new(config: BrokerConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let policy = config.reconnect_policy();
        Arc::new_cyclic(|me| ClientCore {
            me: me.clone(),
            config,
            transport,
            slot: Mutex::new(ConnectionSlot {
                state: ConnectionState::Disconnected,
                session: None,
                generation: 0,
                reconnect_allowed: false,
                policy,
                retry_timer: None,
            }),
            subscriptions: SubscriptionTable::new(),
            notifier: StateNotifier::new(),
        })
    }

    fn transition(&self, slot: &mut ConnectionSlot, state: ConnectionState) {
        if slot.state == state {
            return;
        }
        tracing::debug!(from = %slot.state, to = %state, generation = slot.generation, "Broker state transition");
        slot.state = state;
        self.notifier.enqueue(state);
    }

    fn connect(&self, from_retry: bool) {
        let mut slot = self.slot.lock();

        if from_retry {
            // The timer that got us here has fired; forget its handle
            slot.retry_timer = None;
            if !slot.reconnect_allowed {
                tracing::debug!("Scheduled reconnect skipped: reconnection disallowed");
                return;
            }
        }

        if slot.state.is_busy() && slot.session.is_some() {
            tracing::debug!(state = %slot.state, "connect() ignored: already {}", slot.state);
            return;
        }
        if slot.session.as_ref().is_some_and(|s| s.is_active()) {
            tracing::debug!("connect() ignored: transport session still active");
            return;
        }

        if let Some(timer) = slot.retry_timer.take() {
            timer.abort();
        }

        slot.reconnect_allowed = true;
        slot.generation += 1;
        let generation = slot.generation;
        let events = SessionEvents::new(self.me.clone(), generation);
        slot.session = Some(self.transport.activate(events));
        self.transition(&mut slot, ConnectionState::Connecting);
        drop(slot);

        tracing::info!(generation, url = %self.config.url, "Connecting to broker");
        self.notifier.flush();
    }

    pub(crate) fn on_connected(&self, generation: u64) {
        let session = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                tracing::debug!(generation, current = slot.generation, "Ignoring CONNECTED from stale session");
                return;
            }
            let Some(session) = slot.session.clone() else {
                return;
            };
            slot.policy.reset();
            self.transition(&mut slot, ConnectionState::Connected);
            session
        };

        tracing::info!(generation, "Connected to broker");
        self.notifier.flush();
        self.subscriptions.restore(&session, generation);
    }

    pub(crate) fn on_lost(&self, generation: u64, cause: LossCause) {
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                tracing::debug!(generation, %cause, "Ignoring loss report from stale session");
                return;
            }
            if slot.state != ConnectionState::Disconnected {
                tracing::warn!(generation, "Broker connection lost: {}", cause);
            }
            self.transition(&mut slot, ConnectionState::Disconnected);
        }

        self.subscriptions.detach_all();
        self.notifier.flush();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        let mut slot = self.slot.lock();

        if !slot.reconnect_allowed {
            tracing::debug!("Reconnection disallowed; not scheduling a retry");
            return;
        }
        if slot.state == ConnectionState::Connecting {
            return;
        }
        if slot.session.as_ref().is_some_and(|s| s.is_active()) {
            tracing::debug!("Transport session still active; not scheduling a retry");
            return;
        }
        if slot.retry_timer.is_some() {
            tracing::debug!("Reconnect already pending");
            return;
        }

        let Some(delay) = slot.policy.next_delay() else {
            tracing::error!(attempts = slot.policy.attempts(), "Reconnect attempts exhausted");
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No Tokio runtime available; cannot schedule reconnect");
                return;
            }
        };

        tracing::info!(
            attempt = slot.policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling broker reconnect"
        );

        let core = self.me.clone();
        slot.retry_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = core.upgrade() {
                core.connect(true);
            }
        }));
    }

    async fn disconnect(&self) {
        let (session, generation) = {
            let mut slot = self.slot.lock();
            slot.reconnect_allowed = false;
            if let Some(timer) = slot.retry_timer.take() {
                timer.abort();
            }
            slot.policy.reset();

            let Some(session) = slot.session.take() else {
                tracing::debug!("disconnect() without a transport session");
                return;
            };
            slot.generation += 1;
            (session, slot.generation)
        };

        self.subscriptions.detach_all();
        tracing::info!("Disconnecting from broker");

        if tokio::time::timeout(self.config.shutdown_timeout, session.deactivate())
            .await
            .is_err()
        {
            tracing::warn!(
                "Broker session did not close within {:?}",
                self.config.shutdown_timeout
            );
        }

        {
            let mut slot = self.slot.lock();
            if slot.generation == generation {
                self.transition(&mut slot, ConnectionState::Disconnected);
            } else {
                tracing::debug!("connect() raced disconnect(); keeping the newer connection");
            }
        }
        self.notifier.flush();
    }

    /// Current session if the broker acknowledged it
    fn live_session(&self) -> Option<(Arc<dyn TransportSession>, u64)> {
        let slot = self.slot.lock();
        if slot.state != ConnectionState::Connected {
            return None;
        }
        slot.session
            .as_ref()
            .map(|session| (Arc::clone(session), slot.generation))
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if let Some(timer) = slot.retry_timer.take() {
            timer.abort();
        }
        if let Some(session) = slot.session.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { session.deactivate().await });
            }
        }
    }
}

/// Client for the StudyMate STOMP broker
///
/// Keeps one logical connection alive across transport failures, restores
/// every subscription after a reconnect and gates outbound messages on the
/// connection state.
///
/// # Example
///
/// ```rust,ignore
/// use broker_client::{BrokerClient, BrokerConfig};
///
/// let client = BrokerClient::with_websocket(BrokerConfig::new("ws://localhost:9005/ws"))?;
/// let rooms = client.addresses();
///
/// let _chat = client.subscribe(&rooms.room_topic(42), |message| {
///     println!("{}", message.body);
/// }, None)?;
///
/// client.connect();
/// // ...
/// client.send(&rooms.room_chat(42), r#"{"content":"hi"}"#, None);
/// client.disconnect().await;
/// ```
#[derive(Clone)]
pub struct BrokerClient {
    core: Arc<ClientCore>,
}

impl BrokerClient {
    /// Create a client over an arbitrary transport
    pub fn new<T: Transport>(config: BrokerConfig, transport: T) -> Result<Self> {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    pub fn with_shared_transport(config: BrokerConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: ClientCore::new(config, transport),
        })
    }

    /// Create a client over the tokio-tungstenite WebSocket transport
    pub fn with_websocket(config: BrokerConfig) -> Result<Self> {
        let transport = WsTransport::new(config.clone());
        Self::new(config, transport)
    }

    /// Open the connection if it is not already open or opening
    ///
    /// Transport failures never surface here; they are retried in the
    /// background with capped exponential backoff.
    pub fn connect(&self) {
        self.core.connect(false);
    }

    /// Close the connection and stop reconnecting
    ///
    /// Safe to call repeatedly and while a `connect()` is in flight.
    pub async fn disconnect(&self) {
        self.core.disconnect().await;
    }

    pub fn state(&self) -> ConnectionState {
        self.core.slot.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Number of reconnect attempts since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.core.slot.lock().policy.attempts()
    }

    /// Whether a scheduled reconnect is waiting to fire
    pub fn has_pending_reconnect(&self) -> bool {
        self.core
            .slot
            .lock()
            .retry_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Install the state-change listener, replacing any previous one
    pub fn set_on_state_change<F>(&self, listener: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.core.notifier.set_listener(listener);
    }

    pub fn clear_on_state_change(&self) {
        self.core.notifier.clear_listener();
    }

    /// Register `handler` for messages on `destination`
    ///
    /// Handlers on the same destination share one live transport
    /// subscription, created now if connected and otherwise on the next
    /// connect. Headers are taken from the first registration.
    pub fn subscribe<F>(&self, destination: &str, handler: F, headers: Option<Headers>) -> Result<Subscription>
    where
        F: Fn(&BrokerMessage) + Send + Sync + 'static,
    {
        if destination.trim().is_empty() {
            return Err(BrokerError::InvalidDestination(destination.to_string()));
        }

        let subscription = self
            .core
            .subscriptions
            .register(destination, Arc::new(handler), headers);

        if let Some((session, generation)) = self.core.live_session() {
            self.core
                .subscriptions
                .ensure_live(destination, &session, generation);
        }

        Ok(subscription)
    }

    /// Publish a text body
    ///
    /// Returns `false` without touching the transport unless connected, and
    /// `false` if the transport rejects the frame.
    pub fn send(&self, destination: &str, body: &str, headers: Option<&Headers>) -> bool {
        let Some((session, _)) = self.core.live_session() else {
            tracing::debug!(destination = %destination, "send() while not connected; message dropped");
            return false;
        };

        let empty = Headers::new();
        match session.publish(destination, body, headers.unwrap_or(&empty)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(destination = %destination, "Failed to publish: {}", e);
                false
            }
        }
    }

    /// Publish `body` encoded as JSON with `content-type: application/json`
    pub fn send_json<T: Serialize + ?Sized>(&self, destination: &str, body: &T, headers: Option<&Headers>) -> bool {
        if !self.is_connected() {
            tracing::debug!(destination = %destination, "send_json() while not connected; message dropped");
            return false;
        }

        let encoded = match serde_json::to_string(body) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(destination = %destination, "Failed to encode message body: {}", e);
                return false;
            }
        };

        let mut headers = headers.cloned().unwrap_or_default();
        headers
            .entry("content-type".to_string())
            .or_insert_with(|| "application/json".to_string());
        self.send(destination, &encoded, Some(&headers))
    }

    /// Drop every subscription entry and handler
    ///
    /// Live transport subscriptions are left to die with their session.
    pub fn clear_subscriptions(&self) {
        self.core.subscriptions.clear();
    }

    /// Destinations with a subscription entry, sorted
    pub fn destinations(&self) -> Vec<String> {
        self.core.subscriptions.destinations()
    }

    pub fn handler_count(&self, destination: &str) -> usize {
        self.core.subscriptions.handler_count(destination)
    }

    pub fn has_live_subscription(&self, destination: &str) -> bool {
        self.core.subscriptions.has_live_subscription(destination)
    }

    /// Address builder using this client's prefixes
    pub fn addresses(&self) -> Destinations {
        Destinations::from_config(&self.core.config)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.core.config
    }
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.core.slot.lock();
        f.debug_struct("BrokerClient")
            .field("url", &self.core.config.url)
            .field("state", &slot.state)
            .field("generation", &slot.generation)
            .field("reconnect_attempts", &slot.policy.attempts())
            .finish()
    }
}
