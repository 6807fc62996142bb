//! Contexts over a shared backing store.
//!
//! A [`SharedStore`] stands for the medium every open context sees (one
//! browser profile, one data directory). Each [`Context`] opened on it gets:
//! - a [`ContextStore`]: the backing store, plus a [`StorageSignal`] raised
//!   to every other context after each successful write or removal
//! - its own [`ChangeBus`], whose remote path drains those signals
//!
//! Writers may use the `ContextStore` directly instead of a
//! [`ReactiveCell`]; other contexts still hear about the write, but cells in
//! the writing context do not until they are re-bound.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::audit::AuditStamper;
use crate::binding::ReactiveCell;
use crate::bus::ChangeBus;
use crate::clock::{Clock, SystemClock};
use crate::keys::{StorageKey, RESETTABLE_COLLECTIONS};
use crate::store::{DurableStore, StoreError};

/// Storage signals buffered per context before it must resync.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 256;

/// Identifies one context on a shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Writer id for signals synthesized by the platform itself.
    pub const PLATFORM: ContextId = ContextId(0);
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Raised when a context's write lands in the shared store.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSignal {
    pub key: StorageKey,
    /// Raw stored text, or `None` if the key was removed.
    pub new_value: Option<String>,
    pub writer: ContextId,
}

/// The store shared by every context, and the signal channel between them.
#[derive(Clone)]
pub struct SharedStore {
    backing: Arc<dyn DurableStore>,
    signals: broadcast::Sender<StorageSignal>,
    next_context: Arc<AtomicU64>,
}

impl SharedStore {
    pub fn new(backing: impl DurableStore + 'static) -> Self {
        Self::with_capacity(backing, DEFAULT_SIGNAL_CAPACITY)
    }

    /// Creates a shared store buffering `capacity` signals per context.
    pub fn with_capacity(backing: impl DurableStore + 'static, capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(capacity.max(1));
        Self {
            backing: Arc::new(backing),
            signals,
            next_context: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the underlying store. Writes through it raise no signals.
    pub fn backing(&self) -> &Arc<dyn DurableStore> {
        &self.backing
    }

    /// Opens a new independent context.
    pub fn open_context(&self) -> Context {
        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        let store = ContextStore {
            id,
            backing: Arc::clone(&self.backing),
            signals: self.signals.clone(),
        };
        let bus = ChangeBus::with_remote(id, self.signals.subscribe(), Arc::clone(&self.backing));

        tracing::debug!("Opened context {}", id);

        Context {
            id,
            store: Arc::new(store),
            bus,
        }
    }
}

/// A context's view of the shared store.
#[derive(Clone)]
pub struct ContextStore {
    id: ContextId,
    backing: Arc<dyn DurableStore>,
    signals: broadcast::Sender<StorageSignal>,
}

impl ContextStore {
    fn signal(&self, key: &StorageKey, new_value: Option<String>) {
        // No receivers just means no other context is open
        let _ = self.signals.send(StorageSignal {
            key: key.clone(),
            new_value,
            writer: self.id,
        });
    }
}

impl DurableStore for ContextStore {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, StoreError> {
        self.backing.get(key)
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        self.backing.set(key, value)?;
        self.signal(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.backing.remove(key)?;
        self.signal(key, None);
        Ok(())
    }
}

/// One running instance of the UI.
#[derive(Clone)]
pub struct Context {
    id: ContextId,
    store: Arc<ContextStore>,
    bus: ChangeBus,
}

impl Context {
    /// Opens a single context directly over `backing`.
    pub fn standalone(backing: impl DurableStore + 'static) -> Self {
        SharedStore::new(backing).open_context()
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns this context's store handle.
    pub fn store(&self) -> Arc<dyn DurableStore> {
        self.store.clone()
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Binds a reactive cell to `key`, falling back to `default` when the key
    /// is absent or unreadable.
    pub fn bind<T>(&self, key: StorageKey, default: T) -> ReactiveCell<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        ReactiveCell::bind(self.store(), self.bus.clone(), key, default)
    }

    /// Delivers pending changes made by other contexts.
    pub fn pump(&self) -> usize {
        self.bus.pump()
    }

    /// Audit stamper reading identity from this context's store.
    pub fn stamper(&self) -> AuditStamper {
        self.stamper_with_clock(Arc::new(SystemClock))
    }

    pub fn stamper_with_clock(&self, clock: Arc<dyn Clock>) -> AuditStamper {
        AuditStamper::new(self.store(), clock)
    }

    /// Empties every data collection, keeping settings and identity.
    pub fn start_fresh(&self) {
        for key in RESETTABLE_COLLECTIONS {
            let empty = Value::Array(Vec::new());
            if let Err(e) = self.store.set(&key, &empty.to_string()) {
                tracing::warn!("Failed to reset {}: {}", key, e);
            }
            self.bus.publish(key, empty);
        }
    }

    /// Removes every data collection so bound cells fall back to defaults.
    pub fn restore_defaults(&self) {
        for key in RESETTABLE_COLLECTIONS {
            if let Err(e) = self.store.remove(&key) {
                tracing::warn!("Failed to remove {}: {}", key, e);
            }
            self.bus.publish_removed(key);
        }
    }
}
