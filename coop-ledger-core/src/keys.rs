//! Storage keys and the well-known key space.
//!
//! Every key holds exactly one JSON shape for its whole lifetime:
//! - `poultry_birds`: array of [`FlockMember`](crate::models::FlockMember)
//! - `poultry_inventory`: array of [`InventoryItem`](crate::models::InventoryItem)
//! - `poultry_current_user` / `poultry_device_name`: strings used for audit stamps
//!
//! The remaining keys belong to the record screens (eggs, finance, health,
//! incubation, tasks, login history, settings) and are only named here so the
//! whole key space lives in one place.

use std::borrow::Cow;
use std::fmt;

/// Identifies one logical collection or scalar in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(Cow<'static, str>);

impl StorageKey {
    /// Creates a key from a static string, usable in `const` items.
    pub const fn from_static(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    /// Creates a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(Cow::Owned(key.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

pub const FLOCK: StorageKey = StorageKey::from_static("poultry_birds");
pub const INVENTORY: StorageKey = StorageKey::from_static("poultry_inventory");
pub const CURRENT_ACTOR: StorageKey = StorageKey::from_static("poultry_current_user");
pub const CURRENT_DEVICE: StorageKey = StorageKey::from_static("poultry_device_name");

pub const EGGS: StorageKey = StorageKey::from_static("poultry_eggs");
pub const FINANCE: StorageKey = StorageKey::from_static("poultry_finance");
pub const HEALTH: StorageKey = StorageKey::from_static("poultry_health");
pub const INCUBATION: StorageKey = StorageKey::from_static("poultry_incubation");
pub const TASKS: StorageKey = StorageKey::from_static("poultry_tasks");
pub const LOGIN_LOGS: StorageKey = StorageKey::from_static("poultry_login_logs");
pub const FARM_NAME: StorageKey = StorageKey::from_static("poultry_farm_name");
pub const CURRENCY: StorageKey = StorageKey::from_static("poultry_currency");

/// Data collections wiped by "start fresh" and "restore defaults".
///
/// Settings, identity and task keys are deliberately left alone.
pub const RESETTABLE_COLLECTIONS: [StorageKey; 6] =
    [FLOCK, EGGS, HEALTH, INVENTORY, INCUBATION, FINANCE];
