//! Change bus: publish/subscribe keyed by storage key.
//!
//! Two delivery paths feed the same subscribers:
//! - **Local**: [`ChangeBus::publish`] invokes the key's subscribers
//!   synchronously, in subscription order, before returning.
//! - **Remote**: [`ChangeBus::pump`] drains the storage signals raised when
//!   *other* contexts wrote to the shared backing store and dispatches them
//!   with [`Origin::Remote`]. A context never hears its own writes this way.
//!
//! Subscribers never need to branch on the origin; it is carried on the event
//! for logging and tests.
//!
//! If the remote signal queue overflows, the bus re-reads every subscribed key
//! from the store and dispatches the current values so subscribers still land
//! on the last write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::context::{ContextId, StorageSignal};
use crate::keys::StorageKey;
use crate::store::DurableStore;

/// Which delivery path produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// A change to one key. `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub key: StorageKey,
    pub new_value: Option<Value>,
    pub origin: Origin,
}

type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<StorageKey, Vec<(u64, Callback)>>,
}

struct RemoteAdapter {
    signals: broadcast::Receiver<StorageSignal>,
    store: Arc<dyn DurableStore>,
}

struct BusInner {
    context: Option<ContextId>,
    registry: Mutex<Registry>,
    remote: Mutex<Option<RemoteAdapter>>,
}

/// Per-context publish/subscribe hub. Clones share subscribers.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

impl ChangeBus {
    /// Creates a bus with only the local path.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                context: None,
                registry: Mutex::new(Registry::default()),
                remote: Mutex::new(None),
            }),
        }
    }

    /// Creates a bus for `context` that also listens to storage signals.
    pub(crate) fn with_remote(
        context: ContextId,
        signals: broadcast::Receiver<StorageSignal>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                context: Some(context),
                registry: Mutex::new(Registry::default()),
                remote: Mutex::new(Some(RemoteAdapter { signals, store })),
            }),
        }
    }

    /// Registers `callback` for changes to `key`.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe<F>(&self, key: StorageKey, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .subscribers
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Delivers a new value for `key` to this context's subscribers.
    pub fn publish(&self, key: StorageKey, value: Value) {
        self.dispatch(&ChangeEvent {
            key,
            new_value: Some(value),
            origin: Origin::Local,
        });
    }

    /// Delivers a removal of `key` to this context's subscribers.
    pub fn publish_removed(&self, key: StorageKey) {
        self.dispatch(&ChangeEvent {
            key,
            new_value: None,
            origin: Origin::Local,
        });
    }

    /// Returns the number of live subscriptions for `key`.
    pub fn subscriber_count(&self, key: &StorageKey) -> usize {
        self.registry()
            .subscribers
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Delivers every pending storage signal from other contexts.
    ///
    /// Returns the number of events dispatched.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;

        loop {
            let next = {
                let mut remote = self.remote();
                match remote.as_mut() {
                    Some(adapter) => adapter.signals.try_recv(),
                    None => return delivered,
                }
            };

            match next {
                Ok(signal) => {
                    if Some(signal.writer) == self.inner.context {
                        continue;
                    }
                    if let Some(event) = decode(signal) {
                        self.dispatch(&event);
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} storage signal(s), re-reading subscribed keys", missed);
                    delivered += self.resync();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        delivered
    }

    fn resync(&self) -> usize {
        let store = match self.remote().as_ref() {
            Some(adapter) => Arc::clone(&adapter.store),
            None => return 0,
        };
        let keys: Vec<StorageKey> = self.registry().subscribers.keys().cloned().collect();

        let mut delivered = 0;
        for key in keys {
            let raw = match store.get(&key) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("Failed to re-read {}: {}", key, e);
                    continue;
                }
            };
            let signal = StorageSignal {
                key,
                new_value: raw,
                writer: ContextId::PLATFORM,
            };
            if let Some(event) = decode(signal) {
                self.dispatch(&event);
                delivered += 1;
            }
        }
        delivered
    }

    fn dispatch(&self, event: &ChangeEvent) {
        // Snapshot so callbacks run without the registry lock held
        let callbacks: Vec<Callback> = self
            .registry()
            .subscribers
            .get(&event.key)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        tracing::debug!(
            "Dispatching {:?} change for {} to {} subscriber(s)",
            event.origin,
            event.key,
            callbacks.len()
        );

        for callback in callbacks {
            callback(event);
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remote(&self) -> MutexGuard<'_, Option<RemoteAdapter>> {
        self.inner.remote.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(signal: StorageSignal) -> Option<ChangeEvent> {
    let new_value = match signal.new_value {
        None => None,
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring unparsable storage signal for {}: {}", signal.key, e);
                return None;
            }
        },
    };

    Some(ChangeEvent {
        key: signal.key,
        new_value,
        origin: Origin::Remote,
    })
}

/// Keeps a bus callback registered. Dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<BusInner>,
    key: StorageKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut registry = bus.registry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = registry.subscribers.get_mut(&self.key) {
            subs.retain(|(id, _)| *id != self.id);
            if subs.is_empty() {
                registry.subscribers.remove(&self.key);
            }
        }
    }
}
