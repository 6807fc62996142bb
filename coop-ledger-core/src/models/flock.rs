use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use super::lenient;
use crate::audit::{AuditStamp, Auditable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlockStage {
    Chick,
    Pullet,
    Hen,
    Rooster,
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for FlockStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlockStage::Chick => "Chick",
            FlockStage::Pullet => "Pullet",
            FlockStage::Hen => "Hen",
            FlockStage::Rooster => "Rooster",
            FlockStage::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for FlockStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chick" => Ok(FlockStage::Chick),
            "pullet" => Ok(FlockStage::Pullet),
            "hen" => Ok(FlockStage::Hen),
            "rooster" => Ok(FlockStage::Rooster),
            _ => Err(format!(
                "Invalid stage '{}'. Valid options: chick, pullet, hen, rooster",
                s
            )),
        }
    }
}

/// Only `Active` members count toward the feeding population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlockStatus {
    Active,
    Sold,
    Deceased,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlockStatus::Active => "Active",
            FlockStatus::Sold => "Sold",
            FlockStatus::Deceased => "Deceased",
            FlockStatus::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for FlockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(FlockStatus::Active),
            "sold" => Ok(FlockStatus::Sold),
            "deceased" => Ok(FlockStatus::Deceased),
            _ => Err(format!(
                "Invalid status '{}'. Valid options: active, sold, deceased",
                s
            )),
        }
    }
}

/// One entry in the flock collection: a single bird or a batch of `count` birds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlockMember {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tag_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Birds in this entry. Stored data may hold 0 where the form was left blank.
    #[serde(default, deserialize_with = "lenient::count")]
    pub count: u32,
    #[serde(default, deserialize_with = "lenient::text")]
    pub breed: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub stage: FlockStage,
    #[serde(
        default,
        deserialize_with = "lenient::optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub hatch_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: FlockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
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

impl FlockMember {
    pub fn new(
        tag_number: impl Into<String>,
        count: u32,
        breed: impl Into<String>,
        stage: FlockStage,
        hatch_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tag_number: tag_number.into(),
            name: None,
            count: count.max(1),
            breed: breed.into(),
            stage,
            hatch_date: Some(hatch_date),
            status: FlockStatus::Active,
            notes: None,
            last_modified_by: None,
            last_modified_device: None,
            last_modified_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: FlockStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == FlockStatus::Active
    }
}

impl Auditable for FlockMember {
    fn apply_stamp(&mut self, stamp: AuditStamp) {
        self.last_modified_by = Some(stamp.actor);
        self.last_modified_device = Some(stamp.device);
        self.last_modified_at = Some(stamp.at);
    }
}

impl fmt::Display for FlockMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_number)?;
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        write!(f, " - {} x {} {}", self.count, self.breed, self.stage)?;
        if let Some(hatched) = self.hatch_date {
            write!(f, ", hatched {}", hatched)?;
        }
        write!(f, ", {}", self.status)
    }
}

/// Number of birds currently being fed: the summed count of active members.
pub fn population(members: &[FlockMember]) -> u64 {
    members
        .iter()
        .filter(|m| m.is_active())
        .map(|m| u64::from(m.count))
        .sum()
}
