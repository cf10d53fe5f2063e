//! Cookie-authenticated REST client for the StudyMate API
//!
//! Access credentials are short-lived HTTP-only cookies. This crate keeps
//! callers unaware of their expiry: an unauthenticated response triggers one
//! shared credential refresh, after which every affected request is replayed
//! exactly once. Only an unrecoverable session surfaces as an error, and it
//! flips the observable [`AuthState`] to `Unauthenticated`.

mod client;
mod config;
mod cookies;
mod error;
mod executor;
mod refresh;
mod request;
mod state;

pub use client::AuthClient;
pub use config::AuthConfig;
pub use cookies::ClearableCookieJar;
pub use error::{AuthError, RefreshError, Result};
pub use executor::{HttpExecutor, ReqwestExecutor};
pub use refresh::RefreshCoordinator;
pub use request::{ApiResponse, RequestDescriptor};
pub use state::AuthState;

pub use reqwest::Method;
