use std::collections::{BTreeSet, HashSet};

use dashmap::{mapref::entry::Entry, DashMap};

use super::ConnId;

/// Maps usernames to the live connections they are using.
///
/// An identity is online exactly while its connection set is non-empty; empty
/// sets are removed in the same critical section that empties them, so no
/// stale entry is ever observable.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    online: DashMap<String, HashSet<ConnId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to the identity's set. Returns whether the registry changed.
    pub fn register(&self, identity: &str, conn: ConnId) -> bool {
        match self.online.entry(identity.to_owned()) {
            Entry::Occupied(mut entry) => entry.get_mut().insert(conn),
            Entry::Vacant(entry) => {
                entry.insert(HashSet::from([conn]));
                true
            }
        }
    }

    /// Removes `conn` from the identity's set. Unknown pairs are a no-op.
    /// Returns whether the registry changed.
    pub fn unregister(&self, identity: &str, conn: ConnId) -> bool {
        let Entry::Occupied(mut entry) = self.online.entry(identity.to_owned()) else {
            return false;
        };

        let removed = entry.get_mut().remove(&conn);
        if entry.get().is_empty() {
            entry.remove();
        }
        removed
    }

    /// Removes `conn` from every identity holding it.
    pub fn unregister_connection(&self, conn: ConnId) -> bool {
        let mut changed = false;
        self.online.retain(|_, conns| {
            changed |= conns.remove(&conn);
            !conns.is_empty()
        });
        changed
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.online.contains_key(identity)
    }

    /// Snapshot of the presence set. Sorted for display only.
    pub fn online_identities(&self) -> BTreeSet<String> {
        self.online.iter().map(|entry| entry.key().clone()).collect()
    }
}
