//! Observable authentication state

use std::fmt;

/// Whether the client believes it holds a usable credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Requests are being sent with the stored credential
    #[default]
    Authenticated,
    /// The credential was rejected and could not be refreshed, or the user logged out
    Unauthenticated,
}

impl AuthState {
    pub fn is_authenticated(self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Authenticated => write!(f, "authenticated"),
            AuthState::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}
