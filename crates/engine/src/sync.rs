//! Named async mutexes for per-coordinate critical sections.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A registry of named mutexes.
///
/// Operations scoped to one coordinate (or one 3x3 lock block) serialize
/// through the mutex for that name; disjoint names proceed fully in
/// parallel. Entries are never evicted; each is a single Arc'd mutex and
/// the set of names is bounded by the coordinates ever edited in this
/// process.
#[derive(Default)]
pub struct KeyedMutex {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the mutex for `key`, waiting if another task holds it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}
