//! Daily feed accrual.
//!
//! Each tracked inventory item (auto accrual on, positive daily rate) is
//! charged `elapsed days x rate x active birds` since its last accrual date:
//! - no last date: start tracking today, deduct nothing
//! - same day, or the clock went backwards: nothing to do
//! - no active birds: move the date to today, deduct nothing
//! - otherwise deduct, clamping the quantity at zero
//!
//! The population at the time of the pass is used for the whole gap; no
//! history of flock size is kept.

mod scheduler;

use chrono::NaiveDate;

use crate::models::InventoryItem;

pub use scheduler::{AccrualScheduler, ScheduledPass, DEFAULT_SETTLE_DELAY};

/// What a pass did to one item.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualOutcome {
    /// First pass for the item; tracking starts today.
    Initialized,
    /// Days elapsed but no birds were active, so only the date moved.
    Advanced { days: i64 },
    Deducted {
        days: i64,
        population: u64,
        consumption: f64,
        new_quantity: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemAccrual {
    /// Position of the item in the collection the pass ran over.
    pub index: usize,
    pub item_id: String,
    pub item_name: String,
    pub unit: String,
    pub outcome: AccrualOutcome,
}

/// Result of one accrual pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualReport {
    pub today: NaiveDate,
    pub population: u64,
    pub items: Vec<ItemAccrual>,
}

impl AccrualReport {
    pub fn empty(today: NaiveDate, population: u64) -> Self {
        Self {
            today,
            population,
            items: Vec::new(),
        }
    }

    /// True when the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total deducted across items.
    pub fn total_consumption(&self) -> f64 {
        self.items
            .iter()
            .map(|i| match i.outcome {
                AccrualOutcome::Deducted { consumption, .. } => consumption,
                _ => 0.0,
            })
            .sum()
    }
}

/// Decides what a pass on `today` does to `item`, or `None` for nothing.
pub fn evaluate(item: &InventoryItem, today: NaiveDate, population: u64) -> Option<AccrualOutcome> {
    if !item.is_accruing() {
        return None;
    }
    let rate = item.daily_rate_per_consumer?;

    let Some(last) = item.last_accrual_date else {
        return Some(AccrualOutcome::Initialized);
    };

    let days = (today - last).num_days();
    if days <= 0 {
        return None;
    }

    if population == 0 {
        return Some(AccrualOutcome::Advanced { days });
    }

    let consumption = round2(days as f64 * rate * population as f64);
    let new_quantity = round2((item.quantity - consumption).max(0.0));

    Some(AccrualOutcome::Deducted {
        days,
        population,
        consumption,
        new_quantity,
    })
}

/// Applies an outcome from [`evaluate`] to `item`.
pub fn apply(item: &mut InventoryItem, outcome: &AccrualOutcome, today: NaiveDate) {
    match outcome {
        AccrualOutcome::Initialized => {
            item.last_accrual_date = Some(today);
        }
        AccrualOutcome::Advanced { .. } => {
            item.last_accrual_date = Some(today);
            item.last_updated = Some(today);
        }
        AccrualOutcome::Deducted { new_quantity, .. } => {
            item.quantity = *new_quantity;
            item.last_accrual_date = Some(today);
            item.last_updated = Some(today);
        }
    }
}

/// Runs a pass over `items` without touching storage.
///
/// Returns the updated collection (unchanged items are copied as-is) and the
/// per-item outcomes, in collection order.
pub fn accrue(
    items: &[InventoryItem],
    today: NaiveDate,
    population: u64,
) -> (Vec<InventoryItem>, Vec<ItemAccrual>) {
    let mut outcomes = Vec::new();
    let updated = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let mut item = item.clone();
            if let Some(outcome) = evaluate(&item, today, population) {
                apply(&mut item, &outcome, today);
                outcomes.push(ItemAccrual {
                    index,
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    unit: item.unit.clone(),
                    outcome,
                });
            }
            item
        })
        .collect();

    (updated, outcomes)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
