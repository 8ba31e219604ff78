//! Bearer-token access for backend requests.
//!
//! The credential comes from an external session provider and is treated
//! as opaque; this layer only attaches it. A missing token surfaces as
//! `SyncError::Unauthenticated` so callers can prompt reauthentication
//! instead of retrying blindly.

use std::sync::{Arc, RwLock};

/// Source of the opaque bearer credential.
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` when no session is active.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token (tests, CLI usage with a long-lived credential).
pub struct StaticTokenProvider(String);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// A token slot the session layer updates in place (login, refresh, logout).
#[derive(Clone, Default)]
pub struct SharedTokenProvider {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
    }
}

impl TokenProvider for SharedTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().unwrap().clone()
    }
}
