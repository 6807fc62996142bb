//! Durable key/value storage.
//!
//! Values are JSON text keyed by [`StorageKey`]. The store does no schema
//! checking: parsing what comes back is the caller's job, and failures are
//! returned as [`StoreError`] rather than panicking.
//!
//! Two backings are provided:
//! - [`MemoryStore`]: in-process map, optionally with a byte quota
//! - [`FileStore`]: one `<key>.json` file per key in a data directory

mod file;
mod memory;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::keys::StorageKey;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Synchronous key/value substrate backing all state.
pub trait DurableStore: Send + Sync {
    /// Returns the raw stored text, or `None` if the key was never written.
    fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError>;

    /// Replaces the stored text for `key`.
    fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key succeeds.
    fn remove(&self, key: &StorageKey) -> Result<(), StoreError>;
}

impl<S: DurableStore + ?Sized> DurableStore for Arc<S> {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),

    #[error("Quota exceeded writing '{key}': {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}
