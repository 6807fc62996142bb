use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use coop_ledger_core::{DEFAULT_ACTOR, DEFAULT_DEVICE};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// True when the value came from the config file or the environment.
    pub fn is_explicit(&self) -> bool {
        self.source != ConfigSource::Default
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding one JSON file per storage key
    pub data_dir: ConfigValue<PathBuf>,
    /// Actor recorded on changes when no one has signed in on this machine
    pub actor: ConfigValue<String>,
    /// Device name recorded on changes when none has been set
    pub device: ConfigValue<String>,
    /// Delay before the accrual pass runs, in milliseconds
    pub settle_delay_ms: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    actor: Option<String>,
    device: Option<String>,
    settle_delay_ms: Option<u64>,
}

pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut actor = ConfigValue::new(DEFAULT_ACTOR.to_string(), ConfigSource::Default);
        let mut device = ConfigValue::new(DEFAULT_DEVICE.to_string(), ConfigSource::Default);
        let mut settle_delay_ms = ConfigValue::new(DEFAULT_SETTLE_DELAY_MS, ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(name) = file_config.actor {
                actor = ConfigValue::new(name, ConfigSource::File);
            }
            if let Some(name) = file_config.device {
                device = ConfigValue::new(name, ConfigSource::File);
            }
            if let Some(ms) = file_config.settle_delay_ms {
                settle_delay_ms = ConfigValue::new(ms, ConfigSource::File);
            }
        }

        if let Ok(dir) = std::env::var("COOP_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(name) = std::env::var("COOP_ACTOR") {
            actor = ConfigValue::new(name, ConfigSource::Environment);
        }
        if let Ok(name) = std::env::var("COOP_DEVICE") {
            device = ConfigValue::new(name, ConfigSource::Environment);
        }
        if let Ok(raw) = std::env::var("COOP_SETTLE_MS") {
            let ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("COOP_SETTLE_MS", raw.clone()))?;
            settle_delay_ms = ConfigValue::new(ms, ConfigSource::Environment);
        }

        Ok(Self {
            data_dir,
            actor,
            device,
            settle_delay_ms,
            config_file,
        })
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.value)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/coop/
    /// - macOS: ~/Library/Application Support/coop/
    /// - Windows: %APPDATA%/coop/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coop")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/coop/
    /// - macOS: ~/Library/Application Support/coop/
    /// - Windows: %APPDATA%/coop/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coop")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.ends_with("coop"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.actor.value, "Admin");
        assert!(!config.actor.is_explicit());
        assert_eq!(config.device.value, "Unknown Device");
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: /srv/coop").unwrap();
        writeln!(file, "actor: Ana").unwrap();
        writeln!(file, "device: Barn Tablet").unwrap();
        writeln!(file, "settle_delay_ms: 250").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/srv/coop"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.actor.value, "Ana");
        assert!(config.actor.is_explicit());
        assert_eq!(config.device.value, "Barn Tablet");
        assert_eq!(config.settle_delay_ms.value, 250);
        assert_eq!(config.settle_delay_ms.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_data_dir_resolves_against_config_dir() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: ledger").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("ledger"));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "actor: fromfile").unwrap();
        writeln!(file, "settle_delay_ms: 100").unwrap();

        std::env::set_var("COOP_ACTOR", "fromenv");
        std::env::set_var("COOP_SETTLE_MS", "0");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.actor.value, "fromenv");
        assert_eq!(config.actor.source, ConfigSource::Environment);
        assert_eq!(config.settle_delay_ms.value, 0);

        std::env::remove_var("COOP_ACTOR");
        std::env::remove_var("COOP_SETTLE_MS");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let err = Config::load(Some(config_path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_partial_file_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "device: Coop Laptop").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.actor.source, ConfigSource::Default);
        assert_eq!(config.device.value, "Coop Laptop");
        assert_eq!(config.device.source, ConfigSource::File);
    }
}
