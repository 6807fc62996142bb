use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::lenient;
use crate::audit::{AuditStamp, Auditable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InventoryCategory {
    Feed,
    Medicine,
    Supplies,
    Product,
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for InventoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InventoryCategory::Feed => "Feed",
            InventoryCategory::Medicine => "Medicine",
            InventoryCategory::Supplies => "Supplies",
            InventoryCategory::Product => "Product",
            InventoryCategory::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for InventoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feed" => Ok(InventoryCategory::Feed),
            "medicine" => Ok(InventoryCategory::Medicine),
            "supplies" => Ok(InventoryCategory::Supplies),
            "product" => Ok(InventoryCategory::Product),
            _ => Err(format!(
                "Invalid category '{}'. Valid options: feed, medicine, supplies, product",
                s
            )),
        }
    }
}

/// One entry in the inventory collection.
///
/// Items with `auto_accrual_enabled` and a positive `daily_rate_per_consumer`
/// are consumable resources: the accrual pass deducts
/// `rate x active birds` per elapsed day from `quantity`.
///
/// Older data used `isAutoFeed`, `dailyRatePerBird` and `lastAutoDeductDate`;
/// those names are still accepted when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub category: InventoryCategory,
    #[serde(default, deserialize_with = "lenient::quantity")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "lenient::text")]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient::quantity")]
    pub restock_threshold: f64,
    #[serde(
        default,
        deserialize_with = "lenient::optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, alias = "isAutoFeed", deserialize_with = "lenient::or_default")]
    pub auto_accrual_enabled: bool,
    #[serde(
        default,
        alias = "dailyRatePerBird",
        deserialize_with = "lenient::optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub daily_rate_per_consumer: Option<f64>,
    #[serde(
        default,
        alias = "lastAutoDeductDate",
        deserialize_with = "lenient::optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_accrual_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,
    /// Fields written by other screens, kept so rewrites don't drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InventoryItem {
    pub fn new(
        name: impl Into<String>,
        category: InventoryCategory,
        quantity: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            category,
            quantity: quantity.max(0.0),
            unit: unit.into(),
            restock_threshold: 0.0,
            last_updated: None,
            notes: None,
            auto_accrual_enabled: false,
            daily_rate_per_consumer: None,
            last_accrual_date: None,
            last_modified_by: None,
            last_modified_device: None,
            last_modified_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_restock_threshold(mut self, threshold: f64) -> Self {
        self.restock_threshold = threshold;
        self
    }

    /// Enables daily accrual at `rate` units per active bird.
    pub fn with_auto_accrual(mut self, rate: f64) -> Self {
        self.auto_accrual_enabled = true;
        self.daily_rate_per_consumer = Some(rate);
        self
    }

    pub fn with_last_accrual_date(mut self, date: NaiveDate) -> Self {
        self.last_accrual_date = Some(date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// True when the accrual pass tracks this item.
    pub fn is_accruing(&self) -> bool {
        self.auto_accrual_enabled && self.daily_rate_per_consumer.is_some_and(|rate| rate > 0.0)
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.restock_threshold
    }

    /// Adds `delta` to the quantity, never going below zero.
    pub fn adjust(&mut self, delta: f64, today: NaiveDate) {
        self.quantity = (self.quantity + delta).max(0.0);
        self.last_updated = Some(today);
    }
}

impl Auditable for InventoryItem {
    fn apply_stamp(&mut self, stamp: AuditStamp) {
        self.last_modified_by = Some(stamp.actor);
        self.last_modified_device = Some(stamp.device);
        self.last_modified_at = Some(stamp.at);
    }
}

impl fmt::Display for InventoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {} {}",
            self.name, self.category, self.quantity, self.unit
        )?;
        if self.is_low_stock() {
            write!(f, " (low, threshold {})", self.restock_threshold)?;
        }
        if self.is_accruing() {
            if let Some(rate) = self.daily_rate_per_consumer {
                write!(f, ", auto-feed {} {}/bird/day", rate, self.unit)?;
            }
            match self.last_accrual_date {
                Some(date) => write!(f, " since {}", date)?,
                None => write!(f, " (not started)")?,
            }
        }
        Ok(())
    }
}
