use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use opsrelay_core::{current_unix_timestamp_ms, duration_to_ms, is_within_expiry, Identity};

use crate::credential::CredentialDigest;

pub const DEFAULT_AUTH_DURATION: Duration = Duration::from_secs(60 * 60);

/// One time-bound grant. Expired records stay in the map as tombstones until
/// overwritten or purged; lookups treat them as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub identity: Identity,
    pub issued_unix_ms: u64,
    pub expires_unix_ms: u64,
}

impl SessionRecord {
    pub fn is_live_at(&self, now_unix_ms: u64) -> bool {
        is_within_expiry(self.expires_unix_ms, now_unix_ms)
    }
}

/// Process-lifetime, in-memory session store.
///
/// Every method takes the map lock only for the duration of the map
/// operation; nothing awaits or runs a process while holding it.
#[derive(Debug)]
pub struct SessionStore {
    credential: CredentialDigest,
    auth_duration: Duration,
    sessions: Mutex<HashMap<Identity, SessionRecord>>,
}

impl SessionStore {
    pub fn new(credential: CredentialDigest, auth_duration: Duration) -> Self {
        Self {
            credential,
            auth_duration,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Grants or extends a session when `presented_secret` matches the
    /// configured digest. A mismatch leaves the store untouched.
    ///
    /// Callers must have checked the allow-list first.
    pub fn authenticate(&self, identity: Identity, presented_secret: &str) -> bool {
        self.authenticate_at(identity, presented_secret, current_unix_timestamp_ms())
    }

    pub fn authenticate_at(
        &self,
        identity: Identity,
        presented_secret: &str,
        now_unix_ms: u64,
    ) -> bool {
        if !self.credential.matches(presented_secret) {
            return false;
        }
        let record = SessionRecord {
            identity,
            issued_unix_ms: now_unix_ms,
            expires_unix_ms: now_unix_ms.saturating_add(duration_to_ms(self.auth_duration)),
        };
        self.lock().insert(identity, record);
        true
    }

    pub fn is_live(&self, identity: Identity) -> bool {
        self.is_live_at(identity, current_unix_timestamp_ms())
    }

    pub fn is_live_at(&self, identity: Identity, now_unix_ms: u64) -> bool {
        self.lookup(identity)
            .is_some_and(|record| record.is_live_at(now_unix_ms))
    }

    /// Returns the stored record, expired or not.
    pub fn lookup(&self, identity: Identity) -> Option<SessionRecord> {
        self.lock().get(&identity).copied()
    }

    /// Removes expired tombstones and returns how many were dropped.
    pub fn purge_expired_at(&self, now_unix_ms: u64) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, record| record.is_live_at(now_unix_ms));
        before.saturating_sub(sessions.len())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, SessionRecord>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
