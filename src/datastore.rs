//! Shared key-value scratch store for job programs.
//!
//! Ephemeral, text-only, bounded by a byte budget over the sum of key and
//! value lengths. Entries are never overwritten; callers clear a key before
//! writing it again, which keeps the quota accounting a plain sum.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::error::{KiwibesError, Result};

/// Default budget: 10 MiB.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, String>,
    current_bytes: usize,
}

#[derive(Debug)]
pub struct DataStore {
    max_bytes: usize,
    inner: Mutex<StoreInner>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl DataStore {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Insert a new entry. The key must be absent and the budget must hold;
    /// a write that lands exactly on the budget is accepted.
    pub async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(key) {
            return Err(KiwibesError::DataKeyTaken);
        }
        let size = key.len() + value.len();
        if inner.current_bytes + size > self.max_bytes {
            return Err(KiwibesError::DataStoreFull);
        }
        inner.entries.insert(key.to_string(), value.to_string());
        inner.current_bytes += size;
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<String> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(key)
            .cloned()
            .ok_or(KiwibesError::DataKeyUnknown)
    }

    /// Remove an entry, returning its bytes to the budget.
    pub async fn clear(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.entries.remove(key) {
            Some(value) => {
                inner.current_bytes -= key.len() + value.len();
                Ok(())
            }
            None => Err(KiwibesError::DataKeyUnknown),
        }
    }

    /// Empty the store. Returns the number of entries removed.
    pub async fn clear_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        inner.entries.clear();
        inner.current_bytes = 0;
        count
    }

    pub async fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Bytes currently accounted, `sum(|key| + |value|)` over all entries.
    pub async fn current_bytes(&self) -> usize {
        self.inner.lock().await.current_bytes
    }
}
