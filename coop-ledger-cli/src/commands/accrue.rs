use std::sync::Arc;

use clap::Args;

use coop_ledger_core::{AccrualOutcome, AccrualReport, AccrualScheduler, Context, SystemClock};

use super::{parse_date, CommandError};
use crate::config::Config;

/// Deduct feed eaten since the last pass
#[derive(Args)]
pub struct AccrueCommand {
    /// Run the pass as of this date (YYYY-MM-DD) instead of today
    #[arg(long)]
    today: Option<String>,

    /// Show what would be deducted without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Run immediately instead of waiting out the settle delay
    #[arg(long)]
    no_settle: bool,
}

impl AccrueCommand {
    pub fn run(&self, context: &Context, config: &Config) -> Result<(), CommandError> {
        let clock = Arc::new(SystemClock);
        let scheduler = AccrualScheduler::new(context, clock);
        let today = self.today.as_deref().map(parse_date).transpose()?;

        if self.dry_run {
            let today = today.unwrap_or_else(|| scheduler.today());
            println!("Dry run, nothing will be written.");
            print_report(&scheduler.dry_run(today));
            return Ok(());
        }

        let report = match today {
            Some(today) => Some(scheduler.run_pass_on(today)),
            None if self.no_settle => Some(scheduler.run_pass()),
            None => {
                let rt = tokio::runtime::Runtime::new()
                    .map_err(|e| CommandError::RuntimeError(e.to_string()))?;
                let settle = config.settle_delay();
                rt.block_on(async { scheduler.activate(settle).wait().await })
            }
        };

        match report {
            Some(report) => print_report(&report),
            None => println!("Accrual pass did not run."),
        }
        Ok(())
    }
}

fn print_report(report: &AccrualReport) {
    println!(
        "Accrual for {} ({} active bird{})",
        report.today,
        report.population,
        if report.population == 1 { "" } else { "s" }
    );

    if report.is_empty() {
        println!("  Nothing to deduct.");
        return;
    }

    for item in &report.items {
        match &item.outcome {
            AccrualOutcome::Initialized => {
                println!("  {}: tracking starts today", item.item_name);
            }
            AccrualOutcome::Advanced { days } => {
                println!(
                    "  {}: {} day(s) with no active birds, nothing deducted",
                    item.item_name, days
                );
            }
            AccrualOutcome::Deducted {
                days,
                consumption,
                new_quantity,
                ..
            } => {
                println!(
                    "  {}: -{} {} over {} day(s), {} {} left",
                    item.item_name, consumption, item.unit, days, new_quantity, item.unit
                );
            }
        }
    }

    let total = report.total_consumption();
    if total > 0.0 {
        println!("  Total consumed: {:.2}", total);
    }
}
