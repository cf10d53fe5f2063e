//! State-change notification
//!
//! A single external listener receives every transition. The listener runs
//! synchronously on the thread performing the transition, after the new
//! state has been stored, and a panic inside it is caught and logged so the
//! transition itself always completes.
//!
//! Owners that store state behind a lock use [`StateNotifier::enqueue`]
//! while holding it and [`StateNotifier::flush`] after releasing it. The
//! listener then sees transitions in the order they were stored, even when
//! a listener triggers a nested transition.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::ConnectionState;

/// Callback invoked with the new state on every transition
pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Holds the optional state-change listener
#[derive(Default)]
pub struct StateNotifier {
    listener: RwLock<Option<StateListener>>,
    queue: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    states: VecDeque<ConnectionState>,
    draining: bool,
}

impl StateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listener
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        *self.listener.write() = Some(Arc::new(listener));
    }

    /// Remove the listener
    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    /// Invoke the listener, if any
    ///
    /// The lock is released before calling out, so the listener may replace
    /// itself or query the owning connection.
    pub fn notify(&self, state: ConnectionState) {
        let listener = self.listener.read().clone();
        let Some(listener) = listener else {
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
            tracing::warn!(%state, "State-change listener panicked; transition kept");
        }
    }

    /// Queue a transition for delivery by [`flush`](Self::flush)
    pub fn enqueue(&self, state: ConnectionState) {
        self.queue.lock().states.push_back(state);
    }

    /// Deliver queued transitions in order
    ///
    /// Returns immediately if another call is already draining the queue;
    /// that call delivers whatever was queued meanwhile.
    pub fn flush(&self) {
        {
            let mut queue = self.queue.lock();
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.states.pop_front() {
                    Some(state) => state,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.notify(next);
        }
    }
}

impl std::fmt::Debug for StateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateNotifier")
            .field("has_listener", &self.listener.read().is_some())
            .finish()
    }
}
