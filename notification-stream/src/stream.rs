//! Notification stream manager
//!
//! Keeps the one-way event feed open with a bounded retry budget. Each
//! opened feed is read by its own task, tagged with the generation it was
//! started under; anything a superseded reader reports is dropped.

use std::sync::{Arc, Weak};

use connection_state::{ConnectionState, ReconnectPolicy, StateNotifier};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::NotificationConfig;
use crate::error::Result;
use crate::event::{ConnectionTestResult, Notification, NotificationEvent, NotificationEventKind};
use crate::feed::{EventFeed, HttpEventFeed, SseEvent};
use crate::listeners::{ListenerId, ListenerRegistry};

/// Snapshot returned by [`NotificationStream::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub max_attempts: u32,
    /// The retry budget ran out; only `connect()` starts the feed again
    pub gave_up: bool,
    pub has_pending_reconnect: bool,
}

struct StreamSlot {
    state: ConnectionState,
    generation: u64,
    /// Set by `connect()`, cleared by `disconnect()` and on give-up
    wanted: bool,
    gave_up: bool,
    policy: ReconnectPolicy,
    reader: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
}

struct StreamCore {
    me: Weak<StreamCore>,
    config: NotificationConfig,
    feed: Arc<dyn EventFeed>,
    slot: Mutex<StreamSlot>,
    listeners: ListenerRegistry,
    notifier: StateNotifier,
}

impl StreamCore {
    fn transition(&self, slot: &mut StreamSlot, state: ConnectionState) {
        if slot.state == state {
            return;
        }
        tracing::debug!(from = %slot.state, to = %state, generation = slot.generation, "Notification stream state transition");
        slot.state = state;
        self.notifier.enqueue(state);
    }

    fn open(&self, from_retry: bool) {
        let mut slot = self.slot.lock();

        if from_retry {
            slot.retry_timer = None;
            if !slot.wanted {
                return;
            }
        } else if slot.gave_up {
            tracing::info!("Re-arming notification stream after giving up");
            slot.gave_up = false;
            slot.policy.reset();
        }

        if slot.reader.is_some() && slot.state.is_busy() {
            tracing::debug!(state = %slot.state, "connect() ignored: feed already {}", slot.state);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No Tokio runtime available; cannot open notification feed");
                return;
            }
        };

        if let Some(timer) = slot.retry_timer.take() {
            timer.abort();
        }

        slot.wanted = true;
        slot.generation += 1;
        let generation = slot.generation;
        let core = self.me.clone();
        let feed = Arc::clone(&self.feed);
        slot.reader = Some(runtime.spawn(read_feed(core, feed, generation)));
        self.transition(&mut slot, ConnectionState::Connecting);
        drop(slot);

        tracing::info!(generation, url = %self.config.url, "Opening notification feed");
        self.notifier.flush();
    }

    /// Handle one event from the reader of `generation`
    ///
    /// Returns `false` once that reader has been superseded.
    fn on_event(&self, generation: u64, raw: SseEvent) -> bool {
        let event = match NotificationEvent::decode(&raw.event, &raw.data) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(event = %raw.event, "Ignoring unhandled feed event");
                return self.slot.lock().generation == generation;
            }
            Err(e) => {
                tracing::warn!(event = %raw.event, data = %raw.data, "Skipping undecodable feed event: {}", e);
                return self.slot.lock().generation == generation;
            }
        };

        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return false;
            }
            if event.kind() == NotificationEventKind::Connected {
                slot.policy.reset();
                self.transition(&mut slot, ConnectionState::Connected);
            }
        }

        if event.kind() == NotificationEventKind::Connected {
            tracing::info!(generation, "Notification feed connected");
            self.notifier.flush();
        }
        self.listeners.emit(&event);
        true
    }

    fn on_failure(&self, generation: u64, reason: String) {
        let gave_up = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                tracing::debug!(generation, "Ignoring failure from superseded feed reader");
                return;
            }
            slot.reader = None;
            tracing::warn!(generation, "Notification feed lost: {}", reason);
            self.transition(&mut slot, ConnectionState::Disconnected);
            self.schedule_retry(&mut slot)
        };

        self.notifier.flush();
        self.listeners.emit(&NotificationEvent::Error { message: reason });
        if let Some(attempts) = gave_up {
            self.listeners
                .emit(&NotificationEvent::ReconnectFailed { attempts });
        }
    }

    /// Arm the retry timer; returns the attempt count if the budget is spent
    fn schedule_retry(&self, slot: &mut StreamSlot) -> Option<u32> {
        if !slot.wanted || slot.retry_timer.is_some() {
            return None;
        }

        let Some(delay) = slot.policy.next_delay() else {
            let attempts = slot.policy.attempts();
            tracing::error!(attempts, "Giving up on notification feed");
            slot.gave_up = true;
            slot.wanted = false;
            return Some(attempts);
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No Tokio runtime available; cannot schedule feed retry");
            return None;
        };

        tracing::info!(
            attempt = slot.policy.attempts(),
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling notification feed retry"
        );

        let core = self.me.clone();
        slot.retry_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = core.upgrade() {
                core.open(true);
            }
        }));
        None
    }

    fn close(&self) {
        {
            let mut slot = self.slot.lock();
            slot.wanted = false;
            slot.gave_up = false;
            slot.policy.reset();
            slot.generation += 1;
            if let Some(timer) = slot.retry_timer.take() {
                timer.abort();
            }
            if let Some(reader) = slot.reader.take() {
                reader.abort();
            }
            self.transition(&mut slot, ConnectionState::Disconnected);
        }
        tracing::info!("Notification feed closed");
        self.notifier.flush();
    }
}

impl Drop for StreamCore {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if let Some(timer) = slot.retry_timer.take() {
            timer.abort();
        }
        if let Some(reader) = slot.reader.take() {
            reader.abort();
        }
    }
}

async fn read_feed(core: Weak<StreamCore>, feed: Arc<dyn EventFeed>, generation: u64) {
    let opened = feed.open().await;

    let mut events = match opened {
        Ok(events) => events,
        Err(e) => {
            if let Some(core) = core.upgrade() {
                core.on_failure(generation, e.to_string());
            }
            return;
        }
    };

    while let Some(item) = events.next().await {
        let Some(core) = core.upgrade() else {
            return;
        };
        match item {
            Ok(raw) => {
                if !core.on_event(generation, raw) {
                    return;
                }
            }
            Err(e) => {
                core.on_failure(generation, e.to_string());
                return;
            }
        }
    }

    if let Some(core) = core.upgrade() {
        core.on_failure(generation, "feed closed by server".to_string());
    }
}

/// Manager for the server-sent notification feed
///
/// # Example
///
/// ```rust,ignore
/// use notification_stream::{NotificationConfig, NotificationStream};
///
/// let stream = NotificationStream::with_http_client(NotificationConfig::default(), http)?;
/// stream.on_notification(|n| println!("{:?}: {:?}", n.kind, n.message));
/// stream.connect();
/// ```
#[derive(Clone)]
pub struct NotificationStream {
    core: Arc<StreamCore>,
}

impl NotificationStream {
    pub fn new<F: EventFeed>(config: NotificationConfig, feed: F) -> Result<Self> {
        Self::with_shared_feed(config, Arc::new(feed))
    }

    pub fn with_shared_feed(config: NotificationConfig, feed: Arc<dyn EventFeed>) -> Result<Self> {
        config.validate()?;
        let policy = config.reconnect_policy();
        let core = Arc::new_cyclic(|me| StreamCore {
            me: me.clone(),
            config,
            feed,
            slot: Mutex::new(StreamSlot {
                state: ConnectionState::Disconnected,
                generation: 0,
                wanted: false,
                gave_up: false,
                policy,
                reader: None,
                retry_timer: None,
            }),
            listeners: ListenerRegistry::new(),
            notifier: StateNotifier::new(),
        });
        Ok(Self { core })
    }

    /// Stream over HTTP with `client`, which should carry the session cookies
    pub fn with_http_client(config: NotificationConfig, client: reqwest::Client) -> Result<Self> {
        let feed = HttpEventFeed::new(client, &config);
        Self::new(config, feed)
    }

    /// Open the feed unless it is already open or opening
    ///
    /// Also restarts a stream that gave up after exhausting its retries.
    pub fn connect(&self) {
        self.core.open(false);
    }

    /// Close the feed and cancel any pending retry
    pub fn disconnect(&self) {
        self.core.close();
    }

    pub fn state(&self) -> ConnectionState {
        self.core.slot.lock().state
    }

    /// Ask the server to push a `test` event down this user's feeds
    ///
    /// Listeners for [`NotificationEventKind::Test`] see it arrive if the
    /// feed is open.
    pub async fn send_test_notification(&self) -> Result<ConnectionTestResult> {
        let feed = Arc::clone(&self.core.feed);
        let result = feed.request_test().await?;
        if !result.success {
            tracing::warn!(connections = result.connections, "Server found no open notification feed for this user");
        }
        Ok(result)
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn status(&self) -> NotificationStatus {
        let slot = self.core.slot.lock();
        NotificationStatus {
            state: slot.state,
            reconnect_attempts: slot.policy.attempts(),
            max_attempts: self.core.config.max_attempts,
            gave_up: slot.gave_up,
            has_pending_reconnect: slot
                .retry_timer
                .as_ref()
                .is_some_and(|timer| !timer.is_finished()),
        }
    }

    /// Register `listener` for events of `kind`
    pub fn add_listener<F>(&self, kind: NotificationEventKind, listener: F) -> ListenerId
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.core.listeners.add(kind, Arc::new(listener))
    }

    /// Register a listener that only sees decoded notifications
    pub fn on_notification<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.add_listener(NotificationEventKind::Notification, move |event| {
            if let NotificationEvent::Notification(notification) = event {
                listener(notification);
            }
        })
    }

    pub fn remove_listener(&self, kind: NotificationEventKind, id: ListenerId) -> bool {
        self.core.listeners.remove(kind, id)
    }

    pub fn listener_count(&self, kind: NotificationEventKind) -> usize {
        self.core.listeners.count(kind)
    }

    pub fn clear_listeners(&self) {
        self.core.listeners.clear();
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

    pub fn config(&self) -> &NotificationConfig {
        &self.core.config
    }
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("url", &self.core.config.url)
            .field("status", &self.status())
            .finish()
    }
}
