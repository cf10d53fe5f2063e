//! Subscription multiplexer
//!
//! Many local handlers share one live transport subscription per
//! destination. Each destination owns a dispatcher that fans a message out
//! to a snapshot of the current handlers, so handlers may be added or
//! removed from inside a callback. Removing the last handler keeps the live
//! subscription open; the entry is reused if someone subscribes again and is
//! replayed after every reconnect.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::message::{BrokerMessage, Dispatcher, Headers, MessageHandler};
use crate::transport::TransportSession;

type HandlerId = u64;
type HandlerSet = Arc<Mutex<Vec<(HandlerId, MessageHandler)>>>;

struct Entry {
    handlers: HandlerSet,
    headers: Headers,
    /// Generation of the session holding this destination's live subscription
    live: Option<u64>,
    dispatcher: Dispatcher,
}

impl Entry {
    fn new(destination: &str, headers: Headers) -> Self {
        let handlers: HandlerSet = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = make_dispatcher(destination.to_string(), Arc::clone(&handlers));
        Self {
            handlers,
            headers,
            live: None,
            dispatcher,
        }
    }
}

fn make_dispatcher(destination: String, handlers: HandlerSet) -> Dispatcher {
    Arc::new(move |message: &BrokerMessage| {
        let snapshot: Vec<MessageHandler> = handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                tracing::warn!(
                    destination = %destination,
                    "Message handler panicked; remaining handlers still run"
                );
            }
        }
    })
}

pub(crate) struct TableInner {
    entries: Mutex<HashMap<String, Entry>>,
    next_handler: AtomicU64,
}

impl TableInner {
    fn unregister(&self, destination: &str, handler_id: HandlerId) {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(destination) {
            entry.handlers.lock().retain(|(id, _)| *id != handler_id);
            tracing::debug!(
                destination = %destination,
                remaining = entry.handlers.lock().len(),
                "Handler removed; live subscription kept"
            );
        }
    }
}

/// Destination-keyed table of handler sets and live subscriptions
pub(crate) struct SubscriptionTable {
    inner: Arc<TableInner>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(TableInner {
                entries: Mutex::new(HashMap::new()),
                next_handler: AtomicU64::new(0),
            }),
        }
    }

    /// Add a handler, creating the entry on first use
    ///
    /// Headers are fixed by the first registration for a destination.
    pub(crate) fn register(
        &self,
        destination: &str,
        handler: MessageHandler,
        headers: Option<Headers>,
    ) -> Subscription {
        let handler_id = self.inner.next_handler.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.inner.entries.lock();

        let mut created = false;
        let entry = entries.entry(destination.to_string()).or_insert_with(|| {
            created = true;
            Entry::new(destination, headers.clone().unwrap_or_default())
        });
        if !created {
            if let Some(headers) = headers.as_ref().filter(|h| **h != entry.headers) {
                tracing::debug!(
                    destination = %destination,
                    ignored = ?headers,
                    "Destination already registered; keeping the first subscription headers"
                );
            }
        }
        entry.handlers.lock().push((handler_id, handler));

        Subscription {
            table: Arc::downgrade(&self.inner),
            destination: destination.to_string(),
            handler_id,
            armed: true,
        }
    }

    /// Make sure `destination` has a live subscription on `session`
    ///
    /// A live subscription from an older generation is replaced; one from the
    /// current generation is left alone, so at most one exists per destination.
    pub(crate) fn ensure_live(
        &self,
        destination: &str,
        session: &Arc<dyn TransportSession>,
        generation: u64,
    ) {
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(destination) {
            bind(destination, entry, session, generation);
        }
    }

    /// Replay every entry after a (re)connect
    pub(crate) fn restore(&self, session: &Arc<dyn TransportSession>, generation: u64) {
        let mut entries = self.inner.entries.lock();
        tracing::debug!(count = entries.len(), generation, "Restoring subscriptions");
        for (destination, entry) in entries.iter_mut() {
            bind(destination, entry, session, generation);
        }
    }

    /// Forget every live subscription; the session that owned them is gone
    pub(crate) fn detach_all(&self) {
        for entry in self.inner.entries.lock().values_mut() {
            entry.live = None;
        }
    }

    /// Drop every entry and handler
    pub(crate) fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        tracing::debug!(count = entries.len(), "Clearing subscription table");
        entries.clear();
    }

    pub(crate) fn destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self.inner.entries.lock().keys().cloned().collect();
        destinations.sort();
        destinations
    }

    pub(crate) fn handler_count(&self, destination: &str) -> usize {
        self.inner
            .entries
            .lock()
            .get(destination)
            .map(|entry| entry.handlers.lock().len())
            .unwrap_or(0)
    }

    pub(crate) fn has_live_subscription(&self, destination: &str) -> bool {
        self.inner
            .entries
            .lock()
            .get(destination)
            .is_some_and(|entry| entry.live.is_some())
    }
}

fn bind(destination: &str, entry: &mut Entry, session: &Arc<dyn TransportSession>, generation: u64) {
    if entry.live == Some(generation) {
        return;
    }

    match session.subscribe(destination, &entry.headers, Arc::clone(&entry.dispatcher)) {
        Ok(id) => {
            tracing::debug!(destination = %destination, id = %id, generation, "Live subscription created");
            entry.live = Some(generation);
        }
        Err(e) => {
            entry.live = None;
            tracing::warn!(destination = %destination, "Failed to subscribe: {}", e);
        }
    }
}

/// Handle for one registered handler
///
/// Dropping the handle removes the handler. The destination's live
/// subscription is never torn down by this; use [`Subscription::detach`] to
/// keep the handler for as long as the client lives.
#[must_use = "dropping a Subscription removes its handler"]
pub struct Subscription {
    table: Weak<TableInner>,
    destination: String,
    handler_id: HandlerId,
    armed: bool,
}

impl Subscription {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Remove this handler now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Keep the handler registered without holding the handle
    pub fn detach(mut self) {
        self.armed = false;
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.armed) {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            table.unregister(&self.destination, self.handler_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("destination", &self.destination)
            .field("handler_id", &self.handler_id)
            .field("armed", &self.armed)
            .finish()
    }
}
