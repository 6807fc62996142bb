//! Reactive cells: a cached, typed view of one storage key.
//!
//! A cell reads its key once when bound and from then on only changes in
//! response to bus events, its own or another cell's. Reading never writes:
//! an absent or corrupt stored value leaves the store untouched and the cell
//! holds the caller's default.
//!
//! A cell that fell back because the stored text could not be decoded refuses
//! to write until the key is cleared or a readable value arrives, so a write
//! built on the default never replaces data that is merely unreadable.
//!
//! Writes are optimistic. The cached value is replaced even when the store
//! rejects the write (for example on quota exhaustion), so the cell and the
//! store can disagree until a later write succeeds.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bus::{ChangeBus, ChangeEvent, Subscription};
use crate::keys::StorageKey;
use crate::store::DurableStore;

type Watcher<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct CellState<T> {
    cached: T,
    /// The stored text exists but could not be read into `T`.
    unreadable: bool,
    next_watch: u64,
    watchers: Vec<(u64, Watcher<T>)>,
}

struct CellInner<T> {
    key: StorageKey,
    default: T,
    state: Mutex<CellState<T>>,
}

impl<T> CellInner<T>
where
    T: DeserializeOwned + Clone,
{
    fn lock(&self) -> MutexGuard<'_, CellState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, event: &ChangeEvent) {
        let next = match &event.new_value {
            None => self.default.clone(),
            Some(value) => match serde_json::from_value::<T>(value.clone()) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring {:?} change for {}: value does not match the bound type: {}",
                        event.origin,
                        self.key,
                        e
                    );
                    return;
                }
            },
        };
        self.replace(next);
    }

    fn replace(&self, next: T) {
        let watchers: Vec<Watcher<T>> = {
            let mut state = self.lock();
            state.cached = next.clone();
            state.unreadable = false;
            state.watchers.iter().map(|(_, w)| Arc::clone(w)).collect()
        };
        for watcher in watchers {
            watcher(&next);
        }
    }
}

/// A typed, cached binding to one storage key.
///
/// Cells bound to the same key on the same bus converge synchronously; cells
/// in other contexts converge when their context pumps its bus. Dropping the
/// cell unsubscribes it and never deletes the stored value.
pub struct ReactiveCell<T> {
    inner: Arc<CellInner<T>>,
    store: Arc<dyn DurableStore>,
    bus: ChangeBus,
    _subscription: Subscription,
}

impl<T> ReactiveCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Binds to `key`, reading its current value from `store`.
    pub fn bind(store: Arc<dyn DurableStore>, bus: ChangeBus, key: StorageKey, default: T) -> Self {
        let (cached, unreadable) = read_or_default(store.as_ref(), &key, &default);

        let inner = Arc::new(CellInner {
            key: key.clone(),
            default,
            state: Mutex::new(CellState {
                cached,
                unreadable,
                next_watch: 0,
                watchers: Vec::new(),
            }),
        });

        let weak: Weak<CellInner<T>> = Arc::downgrade(&inner);
        let subscription = bus.subscribe(key, move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(event);
            }
        });

        Self {
            inner,
            store,
            bus,
            _subscription: subscription,
        }
    }

    pub fn key(&self) -> &StorageKey {
        &self.inner.key
    }

    /// Returns a clone of the cached value.
    pub fn get(&self) -> T {
        self.inner.lock().cached.clone()
    }

    /// Runs `f` against the cached value without cloning it.
    ///
    /// `f` must not call back into this cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().cached)
    }

    /// True when the stored value exists but could not be read, so the cell
    /// holds its default and [`set`](Self::set) is refused.
    pub fn is_unreadable(&self) -> bool {
        self.inner.lock().unreadable
    }

    /// Writes `next` to the store and publishes it to every cell on the bus.
    ///
    /// Does nothing while the cell [`is_unreadable`](Self::is_unreadable).
    pub fn set(&self, next: T) {
        if self.is_unreadable() {
            tracing::warn!(
                "Not overwriting {}: the stored value could not be read",
                self.inner.key
            );
            return;
        }

        let value = match serde_json::to_value(&next) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize value for {}: {}", self.inner.key, e);
                self.inner.replace(next);
                return;
            }
        };

        if let Err(e) = self.store.set(&self.inner.key, &value.to_string()) {
            tracing::warn!("Failed to write {}: {}", self.inner.key, e);
        }

        self.inner.lock().cached = next;
        self.bus.publish(self.inner.key.clone(), value);
    }

    /// Computes the next value from the current one, then [`set`](Self::set)s it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.get();
        self.set(f(&current));
    }

    /// Removes the stored value; every cell on the key falls back to its default.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.inner.key) {
            tracing::warn!("Failed to remove {}: {}", self.inner.key, e);
        }

        {
            let mut state = self.inner.lock();
            state.cached = self.inner.default.clone();
            state.unreadable = false;
        }
        self.bus.publish_removed(self.inner.key.clone());
    }

    /// Calls `callback` with the new value after every change.
    pub fn watch<F>(&self, callback: F) -> Watch<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut state = self.inner.lock();
        state.next_watch += 1;
        let id = state.next_watch;
        state.watchers.push((id, Arc::new(callback)));

        Watch {
            cell: Arc::downgrade(&self.inner),
            id,
        }
    }
}

/// Returns the stored value or `default`, and whether the stored text was
/// present but unreadable.
fn read_or_default<T>(store: &dyn DurableStore, key: &StorageKey, default: &T) -> (T, bool)
where
    T: DeserializeOwned + Clone,
{
    match store.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => (value, false),
            Err(e) => {
                tracing::warn!("Stored value for {} is unreadable, using default: {}", key, e);
                (default.clone(), true)
            }
        },
        Ok(None) => (default.clone(), false),
        Err(e) => {
            tracing::warn!("Failed to read {}, using default: {}", key, e);
            (default.clone(), true)
        }
    }
}

/// Keeps a cell watcher registered. Dropping it stops notifications.
pub struct Watch<T> {
    cell: Weak<CellInner<T>>,
    id: u64,
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.upgrade() {
            let mut state = cell.state.lock().unwrap_or_else(|e| e.into_inner());
            state.watchers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, SharedStore};
    use crate::keys;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_bind_absent_key_uses_default_without_writing() {
        let store = MemoryStore::new();
        let ctx = SharedStore::new(store.clone()).open_context();

        let cell = ctx.bind(keys::TASKS, vec!["seed".to_string()]);

        assert_eq!(cell.get(), vec!["seed".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_value_falls_back_and_is_not_overwritten() {
        let store = MemoryStore::new();
        store.set(&keys::FLOCK, "{{garbage").unwrap();
        let ctx = SharedStore::new(store.clone()).open_context();

        let cell: ReactiveCell<Vec<u32>> = ctx.bind(keys::FLOCK, vec![7]);

        assert_eq!(cell.get(), vec![7]);
        assert_eq!(store.get(&keys::FLOCK).unwrap().as_deref(), Some("{{garbage"));
    }

    #[test]
    fn test_unreadable_value_is_never_replaced_by_a_write() {
        let store = MemoryStore::new();
        store.set(&keys::INVENTORY, "[{\"name\":\"Layer Pellets\"},").unwrap();
        let ctx = Context::standalone(store.clone());

        let cell: ReactiveCell<Vec<String>> = ctx.bind(keys::INVENTORY, Vec::new());
        assert!(cell.is_unreadable());

        cell.update(|prev| {
            let mut next = prev.clone();
            next.push("Oyster Shell".to_string());
            next
        });

        assert!(cell.get().is_empty());
        assert_eq!(
            store.get(&keys::INVENTORY).unwrap().as_deref(),
            Some("[{\"name\":\"Layer Pellets\"},")
        );
    }

    #[test]
    fn test_unreadable_cell_writable_after_clear_or_fresh_value() {
        let shared = SharedStore::new(MemoryStore::new());
        shared.backing().set(&keys::EGGS, "not json").unwrap();
        let ctx_a = shared.open_context();
        let ctx_b = shared.open_context();
        let a: ReactiveCell<Vec<u32>> = ctx_a.bind(keys::EGGS, Vec::new());
        let b: ReactiveCell<Vec<u32>> = ctx_b.bind(keys::EGGS, Vec::new());

        a.clear();
        assert!(!a.is_unreadable());
        a.set(vec![4]);

        // The other context becomes writable once it hears the new value
        assert!(b.is_unreadable());
        ctx_b.pump();
        assert!(!b.is_unreadable());
        b.set(vec![4, 5]);
        assert_eq!(
            shared.backing().get(&keys::EGGS).unwrap().as_deref(),
            Some("[4,5]")
        );
    }

    #[test]
    fn test_wrong_shape_falls_back_to_default() {
        let store = MemoryStore::new();
        store.set(&keys::FLOCK, "{\"not\":\"a list\"}").unwrap();
        let ctx = Context::standalone(store);

        let cell: ReactiveCell<Vec<u32>> = ctx.bind(keys::FLOCK, Vec::new());
        assert!(cell.get().is_empty());
    }

    #[test]
    fn test_read_your_writes() {
        let store = MemoryStore::new();
        let ctx = Context::standalone(store.clone());
        let cell = ctx.bind(keys::FARM_NAME, "Coop".to_string());

        cell.set("Hilltop".to_string());

        assert_eq!(cell.get(), "Hilltop");
        assert_eq!(
            store.get(&keys::FARM_NAME).unwrap().as_deref(),
            Some("\"Hilltop\"")
        );
    }

    #[test]
    fn test_same_context_cells_converge_synchronously() {
        let ctx = Context::standalone(MemoryStore::new());
        let a: ReactiveCell<Vec<u32>> = ctx.bind(keys::EGGS, Vec::new());
        let b: ReactiveCell<Vec<u32>> = ctx.bind(keys::EGGS, Vec::new());

        a.set(vec![1, 2]);
        assert_eq!(b.get(), vec![1, 2]);

        b.update(|prev| prev.iter().map(|n| n * 10).collect());
        assert_eq!(a.get(), vec![10, 20]);
    }

    #[test]
    fn test_cross_context_convergence_after_pump() {
        let shared = SharedStore::new(MemoryStore::new());
        let ctx_a = shared.open_context();
        let ctx_b = shared.open_context();
        let a: ReactiveCell<u32> = ctx_a.bind(keys::CURRENCY, 0);
        let b: ReactiveCell<u32> = ctx_b.bind(keys::CURRENCY, 0);

        a.set(42);
        assert_eq!(b.get(), 0);

        ctx_b.pump();
        assert_eq!(b.get(), 42);

        // A does not hear its own write back
        assert_eq!(ctx_a.pump(), 0);
        assert_eq!(a.get(), 42);
    }

    #[test]
    fn test_write_failure_still_updates_cache() {
        let store = MemoryStore::with_quota(16);
        let ctx = Context::standalone(store.clone());
        let cell = ctx.bind(keys::FARM_NAME, String::new());

        cell.set("a name far too long for the quota".to_string());

        assert_eq!(cell.get(), "a name far too long for the quota");
        assert!(store.get(&keys::FARM_NAME).unwrap().is_none());
    }

    #[test]
    fn test_watchers_notified_once_per_change() {
        let ctx = Context::standalone(MemoryStore::new());
        let cell = ctx.bind(keys::CURRENCY, "$".to_string());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let watch = cell.watch(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cell.set("€".to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(watch);
        cell.set("£".to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_reverts_every_cell_to_its_default() {
        let shared = SharedStore::new(MemoryStore::new());
        let ctx_a = shared.open_context();
        let ctx_b = shared.open_context();
        let a = ctx_a.bind(keys::HEALTH, vec![0u8]);
        let same_ctx = ctx_a.bind(keys::HEALTH, vec![1u8]);
        let b = ctx_b.bind(keys::HEALTH, vec![2u8]);

        a.set(vec![9]);
        ctx_b.pump();
        assert_eq!(b.get(), vec![9]);

        a.clear();
        ctx_b.pump();

        assert_eq!(a.get(), vec![0]);
        assert_eq!(same_ctx.get(), vec![1]);
        assert_eq!(b.get(), vec![2]);
        assert!(shared.backing().get(&keys::HEALTH).unwrap().is_none());
    }

    #[test]
    fn test_mismatched_event_is_ignored() {
        let ctx = Context::standalone(MemoryStore::new());
        let cell: ReactiveCell<u32> = ctx.bind(keys::CURRENCY, 5);

        ctx.bus().publish(keys::CURRENCY, serde_json::json!("not a number"));
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn test_dropping_cell_keeps_stored_value() {
        let store = MemoryStore::new();
        let ctx = Context::standalone(store.clone());
        let cell = ctx.bind(keys::CURRENCY, 1u32);
        cell.set(3);
        drop(cell);

        assert_eq!(ctx.bus().subscriber_count(&keys::CURRENCY), 0);
        assert_eq!(store.get(&keys::CURRENCY).unwrap().as_deref(), Some("3"));
    }
}
