mod accrue;
mod config_cmd;
mod data;
mod flock;
mod inventory;
mod store_cmd;
mod whoami;

pub use accrue::AccrueCommand;
pub use config_cmd::ConfigCommand;
pub use data::DataCommand;
pub use flock::FlockCommand;
pub use inventory::InventoryCommand;
pub use store_cmd::StoreCommand;
pub use whoami::{seed_identity, WhoamiCommand};

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::Serialize;

use coop_ledger_core::{Context, ReactiveCell, StorageKey};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug)]
pub enum CommandError {
    NotFound(String),
    Ambiguous(String, usize),
    InvalidInput(String),
    Unreadable(StorageKey),
    RuntimeError(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotFound(what) => write!(f, "Not found: {}", what),
            CommandError::Ambiguous(what, n) => {
                write!(f, "'{}' matches {} records; use the id instead", what, n)
            }
            CommandError::InvalidInput(msg) => write!(f, "{}", msg),
            CommandError::Unreadable(key) => write!(
                f,
                "Stored {} could not be read; nothing was changed. Inspect it with 'coop store get {}'",
                key, key
            ),
            CommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        CommandError::InvalidInput(format!("Invalid date format '{}'. Use YYYY-MM-DD.", value))
    })
}

/// Binds `key` for a read-modify-write, failing if the stored value can't be read.
pub(crate) fn bind_writable<T>(
    context: &Context,
    key: StorageKey,
    default: T,
) -> Result<ReactiveCell<T>, CommandError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let cell = context.bind(key.clone(), default);
    if cell.is_unreadable() {
        return Err(CommandError::Unreadable(key));
    }
    Ok(cell)
}

/// Finds a record by exact id, falling back to a case-insensitive name match.
pub(crate) fn find_index<T>(
    records: &[T],
    identifier: &str,
    id_of: impl Fn(&T) -> &str,
    name_of: impl Fn(&T) -> &str,
) -> Result<usize, CommandError> {
    if let Some(index) = records.iter().position(|r| id_of(r) == identifier) {
        return Ok(index);
    }

    let matches: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| name_of(r).eq_ignore_ascii_case(identifier))
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [] => Err(CommandError::NotFound(identifier.to_string())),
        [index] => Ok(*index),
        many => Err(CommandError::Ambiguous(identifier.to_string(), many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        id: &'static str,
        name: &'static str,
    }

    fn records() -> Vec<Named> {
        vec![
            Named { id: "a1", name: "Pellets" },
            Named { id: "b2", name: "Grit" },
            Named { id: "c3", name: "grit" },
        ]
    }

    fn find(identifier: &str) -> Result<usize, CommandError> {
        find_index(&records(), identifier, |r| r.id, |r| r.name)
    }

    #[test]
    fn test_find_by_id_then_name() {
        assert_eq!(find("b2").unwrap(), 1);
        assert_eq!(find("pellets").unwrap(), 0);
    }

    #[test]
    fn test_find_missing_and_ambiguous() {
        assert!(matches!(find("oyster shell"), Err(CommandError::NotFound(_))));
        assert!(matches!(find("GRIT"), Err(CommandError::Ambiguous(_, 2))));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-04").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
        assert!(parse_date("03/04/2024").is_err());
    }
}
