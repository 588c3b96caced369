//! Keyed Locks
//!
//! Async mutexes created on demand per key. Callers take every key they need
//! in one call; keys are locked in sorted order so overlapping callers can
//! never deadlock. Entries disappear once no guard or waiter holds them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock key for a user name
pub fn user_key(user_name: &str) -> String {
    format!("user:{}", user_name)
}

/// Lock key for a device token
pub fn device_key(device_token: &str) -> String {
    format!("device:{}", device_token)
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct KeyedGuard {
    keys: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(key).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key.to_string(), Arc::downgrade(&lock));
        lock
    }

    /// Lock every key, waiting as long as necessary
    pub async fn acquire<I>(&self, keys: I) -> KeyedGuard
    where
        I: IntoIterator<Item = String>,
    {
        let mut keys: Vec<String> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = self.lock_for(key);
            guards.push(lock.lock_owned().await);
        }

        KeyedGuard {
            keys,
            _guards: guards,
        }
    }

    /// Number of keys currently held or awaited
    pub fn active_keys(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
