use std::collections::BTreeSet;

use opsrelay_core::Identity;

/// Immutable set of identities permitted to ever authenticate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    identities: BTreeSet<Identity>,
}

impl AllowList {
    pub fn new<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        Self {
            identities: identities.into_iter().collect(),
        }
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.identities.contains(&identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Identity> + '_ {
        self.identities.iter().copied()
    }
}

impl FromIterator<Identity> for AllowList {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        Self::new(iter)
    }
}
