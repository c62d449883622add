//! Access-token and PKCE-verifier persistence.
//!
//! Expiry is evaluated lazily: `TokenStore::read` drops an expired session
//! the moment it is observed. There is no background sweeper.

use std::sync::Arc;

use chrono::Utc;
use shared_types::{PendingAuthorization, Session};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

pub const SESSION_KEY: &str = "voicemail_widget.session";
pub const PENDING_AUTHORIZATION_KEY: &str = "voicemail_widget.pkce_verifier";

#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The stored session if it is present and unexpired.
    pub fn read(&self) -> Option<Session> {
        self.read_at(Utc::now().timestamp_millis())
    }

    pub fn read_at(&self, now_ms: i64) -> Option<Session> {
        let raw = self.store.get(SESSION_KEY)?;
        let session = match serde_json::from_str::<Session>(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored session");
                self.store.remove(SESSION_KEY);
                return None;
            }
        };

        if session.is_expired_at(now_ms) {
            debug!(expires_at = session.expires_at_epoch_ms, "stored session expired");
            self.store.remove(SESSION_KEY);
            return None;
        }

        Some(session)
    }

    pub fn write(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(json) => self.store.set(SESSION_KEY, &json),
            Err(e) => warn!(error = %e, "failed to encode session"),
        }
    }

    pub fn clear(&self) {
        self.store.remove(SESSION_KEY);
    }
}

/// Holds at most one PKCE verifier; a new login overwrites it.
#[derive(Clone)]
pub struct PendingAuthorizationStore {
    store: Arc<dyn KeyValueStore>,
}

impl PendingAuthorizationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn read(&self) -> Option<PendingAuthorization> {
        self.store
            .get(PENDING_AUTHORIZATION_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn write(&self, pending: &PendingAuthorization) {
        match serde_json::to_string(pending) {
            Ok(json) => self.store.set(PENDING_AUTHORIZATION_KEY, &json),
            Err(e) => warn!(error = %e, "failed to encode pending authorization"),
        }
    }

    pub fn clear(&self) {
        self.store.remove(PENDING_AUTHORIZATION_KEY);
    }
}
