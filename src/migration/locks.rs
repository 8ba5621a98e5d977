//! Per-user serialisation of migration runs.
//!
//! Two logins for the same user landing at nearly the same time would both
//! see an empty address book and both import. Holding the user's lock across
//! the pre-check and the import closes that window inside one process. It
//! does nothing for runs in separate processes.
//!
//! Entries only live while someone holds or waits for them, so the table
//! stays as small as the number of users logging in concurrently.

use crate::models::UserContext;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock for `user`.
    pub async fn acquire(&self, user: &UserContext) -> UserLockGuard<'_> {
        let key = user.username().to_string();
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        UserLockGuard {
            locks: &self.locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of users currently holding or waiting for a lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock for one user. Dropping it releases the lock and forgets the
/// entry when nobody else holds or waits for it.
pub struct UserLockGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        // the guard owns one Arc clone; release it before counting
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
