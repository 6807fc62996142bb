use chrono::NaiveDate;
use clap::{Args, Subcommand};

use coop_ledger_core::keys;
use coop_ledger_core::{Clock, Context, InventoryCategory, InventoryItem, SystemClock};

use super::{bind_writable, find_index, CommandError, OutputFormat};

#[derive(Args)]
pub struct InventoryCommand {
    #[command(subcommand)]
    pub command: InventorySubcommand,
}

#[derive(Subcommand)]
pub enum InventorySubcommand {
    /// Add an inventory item
    Add {
        name: String,

        /// Category (feed, medicine, supplies, product)
        #[arg(long, default_value = "feed")]
        category: String,

        #[arg(long, short)]
        quantity: f64,

        /// Unit of measure (kg, bags, packs, ...)
        #[arg(long, short)]
        unit: String,

        /// Quantity at or below which the item counts as low stock
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,

        /// Enable auto-feed at this many units per bird per day
        #[arg(long)]
        rate: Option<f64>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List inventory items
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only show items at or below their restock threshold
        #[arg(long)]
        low: bool,
    },

    /// Add to or remove from an item's quantity
    Adjust {
        /// Item ID or name
        identifier: String,

        /// Amount to add (negative to remove)
        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },

    /// Turn daily auto-feed deduction on or off for an item
    AutoFeed {
        /// Item ID or name
        identifier: String,

        /// Units consumed per bird per day
        #[arg(long)]
        rate: Option<f64>,

        /// Stop deducting from this item
        #[arg(long, conflicts_with = "rate")]
        off: bool,
    },
}

impl InventoryCommand {
    pub fn run(&self, context: &Context) -> Result<(), Box<dyn std::error::Error>> {
        let today = SystemClock.today();

        match &self.command {
            InventorySubcommand::Add {
                name,
                category,
                quantity,
                unit,
                threshold,
                rate,
                notes,
            } => {
                let category: InventoryCategory =
                    category.parse().map_err(CommandError::InvalidInput)?;
                if *quantity < 0.0 {
                    return Err(CommandError::InvalidInput(
                        "Quantity cannot be negative".to_string(),
                    )
                    .into());
                }

                let mut item = InventoryItem::new(name, category, *quantity, unit)
                    .with_restock_threshold(*threshold);
                item.last_updated = Some(today);
                if let Some(rate) = rate {
                    item = item.with_auto_accrual(positive_rate(*rate)?);
                }
                if let Some(notes) = notes {
                    item = item.with_notes(notes);
                }

                let item = add_item(context, item)?;
                println!("Added inventory item:");
                println!("{}", item);
                Ok(())
            }

            InventorySubcommand::List { format, low } => {
                let items = context
                    .bind(keys::INVENTORY, Vec::<InventoryItem>::new())
                    .get();
                let shown: Vec<&InventoryItem> =
                    items.iter().filter(|i| !*low || i.is_low_stock()).collect();

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&shown)?);
                    }
                    OutputFormat::Text => {
                        if shown.is_empty() {
                            println!("No inventory items.");
                        }
                        for item in shown {
                            println!("{}", item);
                        }
                    }
                }
                Ok(())
            }

            InventorySubcommand::Adjust { identifier, delta } => {
                let item = adjust_item(context, identifier, *delta, today)?;
                println!("{}", item);
                if item.is_low_stock() {
                    println!("Restock needed.");
                }
                Ok(())
            }

            InventorySubcommand::AutoFeed {
                identifier,
                rate,
                off,
            } => {
                let item = set_auto_feed(context, identifier, *rate, !*off, today)?;
                println!("{}", item);
                Ok(())
            }
        }
    }
}

fn positive_rate(rate: f64) -> Result<f64, CommandError> {
    if rate > 0.0 {
        Ok(rate)
    } else {
        Err(CommandError::InvalidInput(format!(
            "Rate must be greater than zero, got {}",
            rate
        )))
    }
}

fn find_item(items: &[InventoryItem], identifier: &str) -> Result<usize, CommandError> {
    find_index(
        items,
        identifier,
        |i: &InventoryItem| i.id.as_str(),
        |i: &InventoryItem| i.name.as_str(),
    )
}

fn add_item(context: &Context, item: InventoryItem) -> Result<InventoryItem, CommandError> {
    let inventory = bind_writable(context, keys::INVENTORY, Vec::<InventoryItem>::new())?;
    let item = context.stamper().stamp(item);
    inventory.update(|items| {
        let mut next = items.clone();
        next.push(item.clone());
        next
    });
    Ok(item)
}

fn adjust_item(
    context: &Context,
    identifier: &str,
    delta: f64,
    today: NaiveDate,
) -> Result<InventoryItem, CommandError> {
    let inventory = bind_writable(context, keys::INVENTORY, Vec::<InventoryItem>::new())?;
    let mut items = inventory.get();
    let index = find_item(&items, identifier)?;

    let mut item = items[index].clone();
    item.adjust(delta, today);
    let item = context.stamper().stamp(item);
    items[index] = item.clone();
    inventory.set(items);
    Ok(item)
}

/// Enables or disables daily deduction for an item.
///
/// Re-enabling restarts tracking from `today`, so the days spent switched
/// off are never charged. The tracking date never moves backwards.
fn set_auto_feed(
    context: &Context,
    identifier: &str,
    rate: Option<f64>,
    enabled: bool,
    today: NaiveDate,
) -> Result<InventoryItem, CommandError> {
    let inventory = bind_writable(context, keys::INVENTORY, Vec::<InventoryItem>::new())?;
    let mut items = inventory.get();
    let index = find_item(&items, identifier)?;
    let mut item = items[index].clone();

    if enabled {
        let rate = match rate.or(item.daily_rate_per_consumer) {
            Some(rate) => positive_rate(rate)?,
            None => {
                return Err(CommandError::InvalidInput(format!(
                    "'{}' has no daily rate yet; pass --rate",
                    item.name
                )))
            }
        };
        if !item.is_accruing() {
            item.last_accrual_date = Some(item.last_accrual_date.map_or(today, |d| d.max(today)));
        }
        item = item.with_auto_accrual(rate);
    } else {
        item.auto_accrual_enabled = false;
    }

    let item = context.stamper().stamp(item);
    items[index] = item.clone();
    inventory.set(items);
    Ok(item)
}
