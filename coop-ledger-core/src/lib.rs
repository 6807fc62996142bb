//! Coop Ledger Core Library
//!
//! Persistent shared state for the farm records application: a durable
//! key/value store, a change bus that keeps every open context in sync, the
//! reactive cells built on top of them, audit stamping, and the daily feed
//! accrual scheduler.

pub mod accrual;
pub mod audit;
pub mod binding;
pub mod bus;
pub mod clock;
pub mod context;
pub mod keys;
pub mod models;
pub mod store;

pub use accrual::{
    accrue, evaluate, AccrualOutcome, AccrualReport, AccrualScheduler, ItemAccrual, ScheduledPass,
    DEFAULT_SETTLE_DELAY,
};
pub use audit::{AuditStamp, AuditStamper, Auditable, DEFAULT_ACTOR, DEFAULT_DEVICE};
pub use binding::{ReactiveCell, Watch};
pub use bus::{ChangeBus, ChangeEvent, Origin, Subscription};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{Context, ContextId, ContextStore, SharedStore, StorageSignal};
pub use keys::StorageKey;
pub use models::{
    population, FlockMember, FlockStage, FlockStatus, InventoryCategory, InventoryItem,
};
pub use store::{DurableStore, FileStore, MemoryStore, StoreError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
