//! File-backed store: one JSON file per key.
//!
//! Storage layout:
//! ```text
//! ~/.local/share/coop/
//! ├── poultry_birds.json
//! ├── poultry_inventory.json
//! ├── poultry_current_user.json
//! └── poultry_device_name.json
//! ```

use std::fs;
use std::io;
use std::path::PathBuf;

use super::{DurableStore, StoreError};
use crate::keys::StorageKey;

/// File extension for stored values.
const VALUE_EXTENSION: &str = "json";

/// [`DurableStore`] persisting each key to `<data_dir>/<key>.json`.
#[derive(Clone, Debug)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Creates a new store rooted at `data_dir`. The directory is created on
    /// first write.
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the file path for a key, rejecting keys that are not safe
    /// file names.
    pub fn path(&self, key: &StorageKey) -> Result<PathBuf, StoreError> {
        if !is_valid_key(key.as_str()) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self
            .data_dir
            .join(format!("{}.{}", key.as_str(), VALUE_EXTENSION)))
    }

    /// Lists all keys with a stored value, sorted.
    pub fn keys(&self) -> Result<Vec<StorageKey>, StoreError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(self.data_dir.clone(), e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(self.data_dir.clone(), e))?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_key(stem) {
                    keys.push(StorageKey::new(stem));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        let path = self.path(key)?;

        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(path, e)),
        }
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        let path = self.path(key)?;

        fs::create_dir_all(&self.data_dir)
            .map_err(|e| StoreError::Io(self.data_dir.clone(), e))?;
        fs::write(&path, value).map_err(|e| StoreError::Io(path, e))?;

        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        let path = self.path(key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(path, e)),
        }
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
