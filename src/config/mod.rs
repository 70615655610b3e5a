//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod views;

pub use views::{ViewBatchConfig, ViewsConfig, DEFAULT_BATCH_SIZE};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "VIEWFLOW_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "VIEWFLOW";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "VIEWFLOW_LOG";

/// Default exchange channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default per-instance point queue capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Batch size for '{view_type}' must be at least 1")]
    InvalidBatchSize { view_type: String },

    #[error("{field} must be at least 1")]
    InvalidCapacity { field: &'static str },
}

/// View exchange configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Updates buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// View host configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Points queued per instance before delivery waits.
    pub inbox_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch sizes per view type.
    pub views: ViewsConfig,
    /// View exchange configuration.
    pub exchange: ExchangeConfig,
    /// View host configuration.
    pub host: HostConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.views.validate()?;

        if self.exchange.channel_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "exchange.channel_capacity",
            });
        }
        if self.host.inbox_capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "host.inbox_capacity",
            });
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.views.default_batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.exchange.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.host.inbox_capacity, DEFAULT_INBOX_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::for_test();
        config.host.inbox_capacity = 0;

        let result = config.validate();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidCapacity {
                field: "host.inbox_capacity"
            })
        ));
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "views:\n  default_batch_size: 10\n  overrides:\n    - view_type: orders.summary\n      batch_size: 3\nexchange:\n  channel_capacity: 16\n"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();

        assert_eq!(config.views.batch_size("orders.summary"), 3);
        assert_eq!(config.views.batch_size("inventory"), 10);
        assert_eq!(config.exchange.channel_capacity, 16);
        assert_eq!(config.host.inbox_capacity, DEFAULT_INBOX_CAPACITY);
    }

    #[test]
    #[serial]
    fn test_load_rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "views:\n  overrides:\n    - view_type: totals\n      batch_size: 0\n"
        )
        .unwrap();

        let result = Config::load(file.path().to_str());

        assert!(matches!(
            result,
            Err(ConfigError::InvalidBatchSize { view_type }) if view_type == "totals"
        ));
    }

    #[test]
    #[serial]
    fn test_load_env_overrides_default_batch_size() {
        std::env::set_var("VIEWFLOW__VIEWS__DEFAULT_BATCH_SIZE", "7");

        let result = Config::load(None);
        std::env::remove_var("VIEWFLOW__VIEWS__DEFAULT_BATCH_SIZE");

        assert_eq!(result.unwrap().views.default_batch_size, 7);
    }
}
