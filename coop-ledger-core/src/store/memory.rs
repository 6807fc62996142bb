//! In-memory store, shared by every clone of the handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{DurableStore, StoreError};
use crate::keys::StorageKey;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl Inner {
    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// In-memory [`DurableStore`].
///
/// Clones share the same map. An optional quota caps the total bytes of keys
/// plus values; a write that would exceed it fails and leaves the previous
/// value in place.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes once `quota` bytes are in use.
    pub fn with_quota(quota: usize) -> Self {
        let store = Self::default();
        store.lock().quota = Some(quota);
        store
    }

    /// Changes the quota; `None` removes the limit.
    pub fn set_quota(&self, quota: Option<usize>) {
        self.lock().quota = quota;
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        Ok(self.lock().entries.get(key.as_str()).cloned())
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();

        if let Some(quota) = inner.quota {
            let previous = inner
                .entries
                .get(key.as_str())
                .map(|v| key.as_str().len() + v.len())
                .unwrap_or(0);
            let needed = inner.used_bytes() - previous + key.as_str().len() + value.len();
            if needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        inner
            .entries
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.lock().entries.remove(key.as_str());
        Ok(())
    }
}
