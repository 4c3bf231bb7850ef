//! Read-only view of the credential collaborator.
//!
//! Token acquisition and refresh live outside the session layer. The session
//! layer only reads the current bearer token and whether the user is
//! authenticated.

use std::sync::RwLock;

/// Source of the current bearer token.
pub trait AuthSource: Send + Sync + 'static {
    /// The current bearer token, if one has been issued.
    fn token(&self) -> Option<String>;

    /// Whether the user is currently authenticated.
    fn is_authenticated(&self) -> bool;
}

/// An [`AuthSource`] holding a token set by the embedding application.
///
/// Authenticated exactly when a token is present.
#[derive(Debug, Default)]
pub struct StaticAuth {
    token: RwLock<Option<String>>,
}

impl StaticAuth {
    /// Start with the given token (or unauthenticated with `None`).
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace the token, e.g. after login or logout.
    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

impl AuthSource for StaticAuth {
    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}
