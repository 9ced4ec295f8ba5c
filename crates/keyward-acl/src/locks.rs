//! Per-key lock registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Hands out one async mutex per key.
///
/// Guards are owned so they can be held across a `propose` await. A lock is
/// created on first use and evicted when its last guard is released with no
/// other task waiting on it, so the registry only holds keys in use.
#[derive(Default)]
pub(crate) struct LockRegistry {
    locks: Arc<LockMap>,
}

/// Held lock on one registry key.
pub(crate) struct KeyGuard {
    locks: Arc<LockMap>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the handle, so a count of one means only
        // the map refers to it. The shard lock makes this atomic with
        // `handle`.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock a single key.
    pub(crate) async fn lock(&self, key: &str) -> KeyGuard {
        let guard = self.handle(key).lock_owned().await;
        KeyGuard {
            locks: Arc::clone(&self.locks),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Lock several keys, always in sorted order, each at most once.
    pub(crate) async fn lock_all<'a, I>(&self, keys: I) -> Vec<KeyGuard>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ordered: BTreeSet<&str> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.lock(key).await);
        }
        guards
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}
