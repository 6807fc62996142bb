mod flock;
mod inventory;
mod lenient;

pub use flock::{population, FlockMember, FlockStage, FlockStatus};
pub use inventory::{InventoryCategory, InventoryItem};
