use clap::{Args, Subcommand};

use coop_ledger_core::{DurableStore, FileStore, StorageKey};

use super::CommandError;

/// Inspect raw stored values
#[derive(Args)]
pub struct StoreCommand {
    #[command(subcommand)]
    pub command: StoreSubcommand,
}

#[derive(Subcommand)]
pub enum StoreSubcommand {
    /// Print the value stored under a key
    Get {
        key: String,

        /// Print the value exactly as stored
        #[arg(long)]
        raw: bool,
    },

    /// List every key with a stored value
    Keys,
}

impl StoreCommand {
    pub fn run(&self, store: &FileStore) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            StoreSubcommand::Get { key, raw } => {
                let key = StorageKey::new(key.as_str());
                let value = store
                    .get(&key)?
                    .ok_or_else(|| CommandError::NotFound(key.to_string()))?;
                println!("{}", if *raw { value } else { pretty(value) });
                Ok(())
            }

            StoreSubcommand::Keys => {
                let keys = store.keys()?;
                if keys.is_empty() {
                    println!("No stored values in {}", store.data_dir().display());
                }
                for key in keys {
                    println!("{}", key);
                }
                Ok(())
            }
        }
    }
}

/// Pretty-prints JSON values; anything else is returned unchanged.
fn pretty(value: String) -> String {
    serde_json::from_str::<serde_json::Value>(&value)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or(value)
}
