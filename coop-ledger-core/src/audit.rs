//! Provenance stamps: who changed a record, from which device, and when.
//!
//! The actor and device are read from the store at stamp time, so whatever
//! the login screen last wrote is what ends up on the record. Stamps are
//! descriptive only and never consulted for authorization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::keys::{self, StorageKey};
use crate::store::DurableStore;

pub const DEFAULT_ACTOR: &str = "Admin";
pub const DEFAULT_DEVICE: &str = "Unknown Device";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub actor: String,
    pub device: String,
    pub at: DateTime<Utc>,
}

/// Records that carry the last-modified stamp.
pub trait Auditable {
    fn apply_stamp(&mut self, stamp: AuditStamp);
}

#[derive(Clone)]
pub struct AuditStamper {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl AuditStamper {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Builds a stamp from the current actor, device and time.
    pub fn current(&self) -> AuditStamp {
        AuditStamp {
            actor: self.read_identity(&keys::CURRENT_ACTOR, DEFAULT_ACTOR),
            device: self.read_identity(&keys::CURRENT_DEVICE, DEFAULT_DEVICE),
            at: self.clock.now(),
        }
    }

    /// Returns `record` with its stamp replaced by the current one.
    pub fn stamp<T: Auditable>(&self, mut record: T) -> T {
        record.apply_stamp(self.current());
        record
    }

    /// Stamps an arbitrary JSON object with `lastModifiedBy`,
    /// `lastModifiedDevice` and `lastModifiedAt`. Non-objects are returned
    /// unchanged.
    pub fn stamp_json(&self, mut record: Value) -> Value {
        if let Value::Object(fields) = &mut record {
            let stamp = self.current();
            fields.insert("lastModifiedBy".into(), Value::String(stamp.actor));
            fields.insert("lastModifiedDevice".into(), Value::String(stamp.device));
            fields.insert("lastModifiedAt".into(), Value::String(stamp.at.to_rfc3339()));
        }
        record
    }

    // Accepts a JSON string or bare text, since the login screen has written both
    fn read_identity(&self, key: &StorageKey, fallback: &str) -> String {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return fallback.to_string(),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", key, e);
                return fallback.to_string();
            }
        };

        let value = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        let value = value.trim();
        if value.is_empty() {
            fallback.to_string()
        } else {
            value.to_string()
        }
    }
}
