//! Listener registry keyed by event category
//!
//! Listeners are stored per [`NotificationEventKind`] and addressed by the
//! [`ListenerId`] returned at registration. Emission works on a snapshot, so
//! a listener may add or remove listeners without deadlocking, and a
//! panicking listener does not stop the others.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::{NotificationEvent, NotificationEventKind};

/// Callback invoked with every event of the category it was registered for
pub type NotificationListener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: RwLock<HashMap<NotificationEventKind, Vec<(ListenerId, NotificationListener)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, kind: NotificationEventKind, listener: NotificationListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, listener));
        tracing::debug!(%kind, ?id, "Notification listener added");
        id
    }

    /// Returns `false` if no listener with that id was registered for `kind`
    pub(crate) fn remove(&self, kind: NotificationEventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&kind);
        }
        if removed {
            tracing::debug!(%kind, ?id, "Notification listener removed");
        }
        removed
    }

    pub(crate) fn count(&self, kind: NotificationEventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    pub(crate) fn clear(&self) {
        self.listeners.write().clear();
    }

    pub(crate) fn emit(&self, event: &NotificationEvent) {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, NotificationListener)> = match self.listeners.read().get(&kind) {
            Some(entries) => entries.clone(),
            None => return,
        };

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(%kind, ?id, "Notification listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<NotificationEvent>>>, NotificationListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: NotificationListener = Arc::new(move |event: &NotificationEvent| {
            sink.lock().push(event.clone());
        });
        (seen, listener)
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let registry = ListenerRegistry::new();
        let (errors, on_error) = recorder();
        let (connected, on_connected) = recorder();
        registry.add(NotificationEventKind::Error, on_error);
        registry.add(NotificationEventKind::Connected, on_connected);

        registry.emit(&NotificationEvent::Error {
            message: "feed closed".to_string(),
        });

        assert_eq!(errors.lock().len(), 1);
        assert!(connected.lock().is_empty());
    }

    #[test]
    fn test_remove() {
        let registry = ListenerRegistry::new();
        let (seen, listener) = recorder();
        let id = registry.add(NotificationEventKind::ReconnectFailed, listener);

        assert!(registry.remove(NotificationEventKind::ReconnectFailed, id));
        assert!(!registry.remove(NotificationEventKind::ReconnectFailed, id));
        assert_eq!(registry.count(NotificationEventKind::ReconnectFailed), 0);

        registry.emit(&NotificationEvent::ReconnectFailed { attempts: 5 });
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_remove_with_wrong_kind() {
        let registry = ListenerRegistry::new();
        let (_, listener) = recorder();
        let id = registry.add(NotificationEventKind::Heartbeat, listener);

        assert!(!registry.remove(NotificationEventKind::Test, id));
        assert_eq!(registry.count(NotificationEventKind::Heartbeat), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::new();
        registry.add(
            NotificationEventKind::Error,
            Arc::new(|_: &NotificationEvent| panic!("listener bug")),
        );
        let (seen, listener) = recorder();
        registry.add(NotificationEventKind::Error, listener);

        registry.emit(&NotificationEvent::Error {
            message: "feed closed".to_string(),
        });
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_listener_can_remove_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let reg = Arc::clone(&registry);
        let own_id = Arc::clone(&slot);
        let id = registry.add(
            NotificationEventKind::Connected,
            Arc::new(move |_: &NotificationEvent| {
                if let Some(id) = *own_id.lock() {
                    reg.remove(NotificationEventKind::Connected, id);
                }
            }),
        );
        *slot.lock() = Some(id);

        registry.emit(&NotificationEvent::Connected {
            message: String::new(),
        });
        assert_eq!(registry.count(NotificationEventKind::Connected), 0);
    }
}
