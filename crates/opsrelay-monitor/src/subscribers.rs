use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use opsrelay_core::Identity;

/// Identities opted into push monitoring. Membership says nothing about
/// current authorization.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    members: Mutex<BTreeSet<Identity>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the identity was not already subscribed.
    pub fn subscribe(&self, identity: Identity) -> bool {
        self.lock().insert(identity)
    }

    /// Returns `true` when the identity was subscribed.
    pub fn unsubscribe(&self, identity: Identity) -> bool {
        self.lock().remove(&identity)
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.lock().contains(&identity)
    }

    /// Copy of the current members, taken under the lock and released before
    /// the caller iterates.
    pub fn snapshot(&self) -> Vec<Identity> {
        self.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<Identity>> {
        self.members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
