//! Runs accrual passes against the bound flock and inventory collections.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;

use super::{accrue, AccrualOutcome, AccrualReport};
use crate::audit::AuditStamper;
use crate::binding::ReactiveCell;
use crate::clock::Clock;
use crate::context::Context;
use crate::keys;
use crate::models::{population, FlockMember, InventoryItem};

/// Delay before a pass runs, so the input collections finish loading first.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

struct SchedulerInner {
    context: Context,
    flock: ReactiveCell<Vec<FlockMember>>,
    inventory: ReactiveCell<Vec<InventoryItem>>,
    stamper: AuditStamper,
    clock: Arc<dyn Clock>,
}

/// Deducts consumed feed from tracked inventory items, at most once per day.
///
/// Writes go through the inventory cell, so every open context sees them.
#[derive(Clone)]
pub struct AccrualScheduler {
    inner: Arc<SchedulerInner>,
}

impl AccrualScheduler {
    pub fn new(context: &Context, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                context: context.clone(),
                flock: context.bind(keys::FLOCK, Vec::new()),
                inventory: context.bind(keys::INVENTORY, Vec::new()),
                stamper: context.stamper_with_clock(Arc::clone(&clock)),
                clock,
            }),
        }
    }

    /// The date a pass run now would use.
    pub fn today(&self) -> NaiveDate {
        self.inner.clock.today()
    }

    /// Runs a pass for the clock's current date.
    pub fn run_pass(&self) -> AccrualReport {
        self.run_pass_on(self.today())
    }

    /// Runs a pass as of `today`, writing the inventory back if anything changed.
    pub fn run_pass_on(&self, today: NaiveDate) -> AccrualReport {
        let (updated, report) = self.evaluate(today);
        if report.is_empty() {
            tracing::debug!("Accrual pass for {}: nothing to do", today);
            return report;
        }

        let changed: HashSet<usize> = report.items.iter().map(|i| i.index).collect();
        let updated = updated
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                if changed.contains(&index) {
                    self.inner.stamper.stamp(item)
                } else {
                    item
                }
            })
            .collect();
        self.inner.inventory.set(updated);

        for item in &report.items {
            match &item.outcome {
                AccrualOutcome::Initialized => {
                    tracing::info!("Accrual: started tracking {} from {}", item.item_name, today);
                }
                AccrualOutcome::Advanced { days } => {
                    tracing::info!(
                        "Accrual: {} advanced {} day(s) with no active birds",
                        item.item_name,
                        days
                    );
                }
                AccrualOutcome::Deducted {
                    days,
                    population,
                    consumption,
                    new_quantity,
                } => {
                    tracing::info!(
                        "Accrual: {}: {} day(s) x {} bird(s) = {} {} consumed, {} left",
                        item.item_name,
                        days,
                        population,
                        consumption,
                        item.unit,
                        new_quantity
                    );
                }
            }
        }

        report
    }

    /// Evaluates a pass as of `today` without writing anything.
    pub fn dry_run(&self, today: NaiveDate) -> AccrualReport {
        self.evaluate(today).1
    }

    /// Schedules one pass after `settle`. Must be called inside a tokio runtime.
    ///
    /// Dropping the returned handle cancels the pass if it hasn't run yet.
    pub fn activate(&self, settle: Duration) -> ScheduledPass {
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            scheduler.run_pass()
        });

        ScheduledPass {
            handle: Some(handle),
        }
    }

    fn evaluate(&self, today: NaiveDate) -> (Vec<InventoryItem>, AccrualReport) {
        // Writes other contexts made while we waited
        self.inner.context.pump();

        if self.inner.flock.is_unreadable() || self.inner.inventory.is_unreadable() {
            tracing::warn!(
                "Accrual pass for {} skipped: stored flock or inventory is unreadable",
                today
            );
            return (Vec::new(), AccrualReport::empty(today, 0));
        }

        let population = self.inner.flock.with(|members| population(members));
        let inventory = self.inner.inventory.get();

        // Nothing loaded yet is the same as nothing to accrue
        if inventory.is_empty() {
            return (inventory, AccrualReport::empty(today, population));
        }

        let (updated, items) = accrue(&inventory, today, population);
        (
            updated,
            AccrualReport {
                today,
                population,
                items,
            },
        )
    }
}

/// A pending one-shot accrual pass.
///
/// Dropping it, or calling [`cancel`](Self::cancel), aborts the pass if it is
/// still waiting out its settle delay.
pub struct ScheduledPass {
    handle: Option<JoinHandle<AccrualReport>>,
}

impl ScheduledPass {
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits for the pass. Returns `None` if it was cancelled.
    pub async fn wait(mut self) -> Option<AccrualReport> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::warn!("Accrual pass failed: {}", e);
                }
                None
            }
        }
    }
}

impl Drop for ScheduledPass {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::context::SharedStore;
    use crate::models::{FlockStage, FlockStatus, InventoryCategory};
    use crate::store::{DurableStore, MemoryStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn birds(count: u32) -> FlockMember {
        FlockMember::new("Batch", count, "Mixed", FlockStage::Hen, date(2023, 1, 15))
    }

    fn pellets(quantity: f64) -> InventoryItem {
        InventoryItem::new("Layer Pellets", InventoryCategory::Feed, quantity, "kg")
            .with_auto_accrual(0.12)
            .with_last_accrual_date(date(2024, 3, 1))
    }

    fn setup(
        flock: Vec<FlockMember>,
        inventory: Vec<InventoryItem>,
    ) -> (Context, AccrualScheduler, FixedClock) {
        let ctx = Context::standalone(MemoryStore::new());
        ctx.bind(keys::FLOCK, Vec::new()).set(flock);
        ctx.bind(keys::INVENTORY, Vec::new()).set(inventory);
        let clock = FixedClock::on(date(2024, 3, 4));
        let scheduler = AccrualScheduler::new(&ctx, Arc::new(clock.clone()));
        (ctx, scheduler, clock)
    }

    fn stored_inventory(ctx: &Context) -> Vec<InventoryItem> {
        let raw = ctx.store().get(&keys::INVENTORY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_pass_deducts_and_persists() {
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let report = scheduler.run_pass();

        assert_eq!(report.population, 20);
        assert_eq!(report.total_consumption(), 7.2);
        let stored = stored_inventory(&ctx);
        assert_eq!(stored[0].quantity, 42.8);
        assert_eq!(stored[0].last_accrual_date, Some(date(2024, 3, 4)));
        assert_eq!(stored[0].last_updated, Some(date(2024, 3, 4)));
        assert_eq!(stored[0].last_modified_by.as_deref(), Some("Admin"));
    }

    #[test]
    fn test_second_pass_same_day_is_noop() {
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        scheduler.run_pass();
        let after_first = stored_inventory(&ctx);
        let report = scheduler.run_pass();

        assert!(report.is_empty());
        assert_eq!(stored_inventory(&ctx), after_first);
    }

    #[test]
    fn test_open_cells_see_the_deduction() {
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);
        let ui: ReactiveCell<Vec<InventoryItem>> = ctx.bind(keys::INVENTORY, Vec::new());

        scheduler.run_pass();

        assert_eq!(ui.get()[0].quantity, 42.8);
    }

    #[test]
    fn test_other_context_sees_the_deduction_after_pump() {
        let shared = SharedStore::new(MemoryStore::new());
        let writer = shared.open_context();
        let reader = shared.open_context();
        writer.bind(keys::FLOCK, Vec::new()).set(vec![birds(20)]);
        writer.bind(keys::INVENTORY, Vec::new()).set(vec![pellets(50.0)]);
        let ui: ReactiveCell<Vec<InventoryItem>> = reader.bind(keys::INVENTORY, Vec::new());

        AccrualScheduler::new(&writer, Arc::new(FixedClock::on(date(2024, 3, 4)))).run_pass();
        reader.pump();

        assert_eq!(ui.get()[0].quantity, 42.8);
    }

    #[test]
    fn test_uses_current_population_for_whole_gap() {
        let (ctx, scheduler, clock) = setup(vec![birds(10)], vec![pellets(100.0)]);
        scheduler.run_pass_on(date(2024, 3, 2));

        // Flock grows, then the app stays closed for three days
        ctx.bind(keys::FLOCK, Vec::new()).set(vec![birds(10), birds(10)]);
        clock.set_date(date(2024, 3, 5));
        let report = scheduler.run_pass();

        // 3 days x 0.12 x 20 birds
        assert_eq!(report.total_consumption(), 7.2);
    }

    #[test]
    fn test_inactive_flock_advances_without_deducting() {
        let (ctx, scheduler, _clock) = setup(
            vec![birds(20).with_status(FlockStatus::Sold)],
            vec![pellets(50.0)],
        );

        let report = scheduler.run_pass();

        assert!(matches!(report.items[0].outcome, AccrualOutcome::Advanced { days: 3 }));
        let stored = stored_inventory(&ctx);
        assert_eq!(stored[0].quantity, 50.0);
        assert_eq!(stored[0].last_accrual_date, Some(date(2024, 3, 4)));
    }

    #[test]
    fn test_unloaded_inventory_is_nothing_to_do() {
        let ctx = Context::standalone(MemoryStore::new());
        let scheduler = AccrualScheduler::new(&ctx, Arc::new(FixedClock::on(date(2024, 3, 4))));

        assert!(scheduler.run_pass().is_empty());
        assert!(ctx.store().get(&keys::INVENTORY).unwrap().is_none());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let report = scheduler.dry_run(date(2024, 3, 4));

        assert_eq!(report.total_consumption(), 7.2);
        assert_eq!(stored_inventory(&ctx)[0].quantity, 50.0);
    }

    #[test]
    fn test_blank_count_member_does_not_forgive_backlog() {
        let ctx = Context::standalone(MemoryStore::new());
        ctx.store()
            .set(
                &keys::FLOCK,
                r#"[{"id":"a","tagNumber":"B-1","count":20,"stage":"Hen","status":"Active"},
                    {"id":"b","tagNumber":"B-2","count":null,"hatchDate":"","stage":"Hen","status":"Active"}]"#,
            )
            .unwrap();
        ctx.bind(keys::INVENTORY, Vec::new()).set(vec![pellets(50.0)]);
        let scheduler = AccrualScheduler::new(&ctx, Arc::new(FixedClock::on(date(2024, 3, 4))));

        let report = scheduler.run_pass();

        assert_eq!(report.population, 20);
        assert_eq!(report.total_consumption(), 7.2);
        assert_eq!(stored_inventory(&ctx)[0].quantity, 42.8);
    }

    #[test]
    fn test_unreadable_inventory_skips_pass() {
        let ctx = Context::standalone(MemoryStore::new());
        ctx.bind(keys::FLOCK, Vec::new()).set(vec![birds(20)]);
        ctx.store().set(&keys::INVENTORY, "[{\"name\":").unwrap();
        let scheduler = AccrualScheduler::new(&ctx, Arc::new(FixedClock::on(date(2024, 3, 4))));

        assert!(scheduler.run_pass().is_empty());
        assert_eq!(
            ctx.store().get(&keys::INVENTORY).unwrap().as_deref(),
            Some("[{\"name\":")
        );
    }

    #[test]
    fn test_only_changed_entry_is_stamped_when_ids_repeat() {
        let tracked = pellets(50.0);
        let mut copy = tracked.clone();
        copy.auto_accrual_enabled = false;
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![tracked, copy]);

        let report = scheduler.run_pass();

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].index, 0);
        let stored = stored_inventory(&ctx);
        assert_eq!(stored[0].last_modified_by.as_deref(), Some("Admin"));
        assert_eq!(stored[1].last_modified_by, None);
        assert_eq!(stored[1].quantity, 50.0);
    }

    #[test]
    fn test_dry_run_and_pass_agree_on_today() {
        let (_ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let preview = scheduler.dry_run(scheduler.today());
        let report = scheduler.run_pass();

        assert_eq!(preview, report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_write_during_settle_is_kept() {
        let shared = SharedStore::new(MemoryStore::new());
        let app = shared.open_context();
        app.bind(keys::FLOCK, Vec::new()).set(vec![birds(20)]);
        app.bind(keys::INVENTORY, Vec::new()).set(vec![pellets(50.0)]);
        let scheduler = AccrualScheduler::new(&app, Arc::new(FixedClock::on(date(2024, 3, 4))));

        let pass = scheduler.activate(DEFAULT_SETTLE_DELAY);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let other = shared.open_context();
        let inventory: ReactiveCell<Vec<InventoryItem>> = other.bind(keys::INVENTORY, Vec::new());
        inventory.update(|items| {
            let mut next = items.clone();
            next.push(InventoryItem::new("Grit", InventoryCategory::Supplies, 2.0, "kg"));
            next
        });

        let report = pass.wait().await.unwrap();

        assert_eq!(report.total_consumption(), 7.2);
        let stored = stored_inventory(&app);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].quantity, 42.8);
        assert_eq!(stored[1].name, "Grit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_runs_after_settle_delay() {
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let pass = scheduler.activate(DEFAULT_SETTLE_DELAY);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!pass.is_finished());
        assert_eq!(stored_inventory(&ctx)[0].quantity, 50.0);

        let report = pass.wait().await.unwrap();
        assert_eq!(report.total_consumption(), 7.2);
        assert_eq!(stored_inventory(&ctx)[0].quantity, 42.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_pass_never_runs() {
        let (ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let pass = scheduler.activate(DEFAULT_SETTLE_DELAY);
        drop(pass);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(stored_inventory(&ctx)[0].quantity, 50.0);
        assert_eq!(stored_inventory(&ctx)[0].last_accrual_date, Some(date(2024, 3, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pass_waits_to_none() {
        let (_ctx, scheduler, _clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let pass = scheduler.activate(DEFAULT_SETTLE_DELAY);
        if let Some(handle) = pass.handle.as_ref() {
            handle.abort();
        }
        assert!(pass.wait().await.is_none());

        let second = scheduler.activate(Duration::ZERO);
        second.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivation_debounces() {
        let (ctx, scheduler, clock) = setup(vec![birds(20)], vec![pellets(50.0)]);

        let first = scheduler.activate(DEFAULT_SETTLE_DELAY);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(first);
        clock.set_date(date(2024, 3, 5));
        let second = scheduler.activate(DEFAULT_SETTLE_DELAY);

        let report = second.wait().await.unwrap();
        // One pass, covering four days
        assert!(matches!(
            report.items[0].outcome,
            AccrualOutcome::Deducted { days: 4, .. }
        ));
        assert_eq!(stored_inventory(&ctx)[0].last_accrual_date, Some(date(2024, 3, 5)));
    }
}
