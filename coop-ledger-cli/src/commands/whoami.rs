use clap::Args;

use coop_ledger_core::keys::{self, StorageKey};
use coop_ledger_core::{Context, DurableStore};

use super::CommandError;
use crate::config::{Config, ConfigValue};

/// Show or change who changes are recorded as
#[derive(Args)]
pub struct WhoamiCommand {
    /// Record future changes as this person
    #[arg(long)]
    actor: Option<String>,

    /// Name of this device
    #[arg(long)]
    device: Option<String>,
}

impl WhoamiCommand {
    pub fn run(&self, context: &Context) -> Result<(), CommandError> {
        if let Some(actor) = &self.actor {
            set_identity(context, keys::CURRENT_ACTOR, actor)?;
        }
        if let Some(device) = &self.device {
            set_identity(context, keys::CURRENT_DEVICE, device)?;
        }

        let stamp = context.stamper().current();
        println!("Actor:  {}", stamp.actor);
        println!("Device: {}", stamp.device);
        Ok(())
    }
}

fn set_identity(context: &Context, key: StorageKey, name: &str) -> Result<(), CommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::InvalidInput(format!("{} cannot be blank", key)));
    }
    let cell = context.bind(key, String::new());
    // Identities written as bare text don't decode as JSON
    if cell.is_unreadable() {
        cell.clear();
    }
    cell.set(name.to_string());
    Ok(())
}

/// Writes the configured actor and device into the store when it has none yet.
pub fn seed_identity(context: &Context, config: &Config) {
    seed(context, keys::CURRENT_ACTOR, &config.actor);
    seed(context, keys::CURRENT_DEVICE, &config.device);
}

fn seed(context: &Context, key: StorageKey, configured: &ConfigValue<String>) {
    if !configured.is_explicit() {
        return;
    }
    match context.store().get(&key) {
        Ok(None) => {
            tracing::debug!("Seeding {} from {} config", key, configured.source);
            context.bind(key, String::new()).set(configured.value.clone());
        }
        Ok(Some(_)) => {}
        Err(e) => tracing::warn!("Failed to read {}: {}", key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use coop_ledger_core::MemoryStore;
    use std::path::PathBuf;

    fn config(actor: ConfigValue<String>) -> Config {
        Config {
            data_dir: ConfigValue::new(PathBuf::from("/tmp/coop"), ConfigSource::Default),
            actor,
            device: ConfigValue::new("Unknown Device".into(), ConfigSource::Default),
            settle_delay_ms: ConfigValue::new(0, ConfigSource::Default),
            config_file: None,
        }
    }

    #[test]
    fn test_set_identity_writes_json_string() {
        let store = MemoryStore::new();
        let context = Context::standalone(store.clone());

        set_identity(&context, keys::CURRENT_ACTOR, " Ana ").unwrap();
        assert_eq!(
            store.get(&keys::CURRENT_ACTOR).unwrap().as_deref(),
            Some("\"Ana\"")
        );
        assert_eq!(context.stamper().current().actor, "Ana");
    }

    #[test]
    fn test_set_identity_replaces_bare_text() {
        let store = MemoryStore::new();
        store.set(&keys::CURRENT_ACTOR, "Cara").unwrap();
        let context = Context::standalone(store.clone());

        set_identity(&context, keys::CURRENT_ACTOR, "Dev").unwrap();
        assert_eq!(context.stamper().current().actor, "Dev");
    }

    #[test]
    fn test_blank_identity_rejected() {
        let context = Context::standalone(MemoryStore::new());
        assert!(set_identity(&context, keys::CURRENT_DEVICE, "  ").is_err());
    }

    #[test]
    fn test_seed_only_when_absent() {
        let store = MemoryStore::new();
        let context = Context::standalone(store.clone());
        let configured = config(ConfigValue::new("Ben".into(), ConfigSource::File));

        seed_identity(&context, &configured);
        assert_eq!(context.stamper().current().actor, "Ben");
        // Default-sourced values are never written
        assert!(store.get(&keys::CURRENT_DEVICE).unwrap().is_none());

        store.set(&keys::CURRENT_ACTOR, "Cara").unwrap();
        seed_identity(&context, &configured);
        assert_eq!(context.stamper().current().actor, "Cara");
    }
}
