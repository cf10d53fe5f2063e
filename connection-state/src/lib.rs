//! Connection primitives shared by the StudyMate realtime transports
//!
//! Both the STOMP broker connection and the notification event stream are
//! driven by the same small state machine:
//!
//! - [`ConnectionState`]: exactly one of `Disconnected`, `Connecting` or
//!   `Connected` at any time
//! - [`ReconnectPolicy`]: capped exponential backoff with an optional
//!   ceiling on the number of attempts
//! - [`StateNotifier`]: a single replaceable listener, invoked synchronously
//!   on every transition and isolated from the transition itself
//!
//! # Quick Start
//!
//! ```rust
//! use connection_state::{ConnectionState, ReconnectPolicy, StateNotifier};
//! use std::time::Duration;
//!
//! let mut policy = ReconnectPolicy::new(Duration::from_millis(500), Duration::from_secs(10));
//! assert_eq!(policy.next_delay(), Some(Duration::from_millis(500)));
//! assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
//! policy.reset();
//! assert_eq!(policy.attempts(), 0);
//!
//! let notifier = StateNotifier::new();
//! notifier.set_listener(|state| println!("now {state}"));
//! notifier.notify(ConnectionState::Connecting);
//! ```

mod backoff;
mod notifier;
mod state;

pub use backoff::ReconnectPolicy;
pub use notifier::{StateListener, StateNotifier};
pub use state::ConnectionState;
