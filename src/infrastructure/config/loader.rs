use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid task_queue.max_concurrent: {0}. Must be at least 1")]
    InvalidMaxConcurrent(usize),

    #[error("Invalid task_queue.default_timeout_ms: {0}. Must be at least 1000")]
    InvalidTimeoutMs(u64),

    #[error("Invalid optimizer.min_entries_for_optimization: {0}. Must be at least 1")]
    InvalidMinEntries(usize),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.controlplane/config.yaml`
    /// 3. `.controlplane/local.yaml` (optional overrides)
    /// 4. Environment variables (`CONTROLPLANE_` prefix, `__` nested separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".controlplane/config.yaml"))
            .merge(Yaml::file(".controlplane/local.yaml"))
            .merge(Env::prefixed("CONTROLPLANE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, for tests and alternate deployments.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.task_queue.max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(config.task_queue.max_concurrent));
        }
        if config.task_queue.default_timeout_ms < 1000 {
            return Err(ConfigError::InvalidTimeoutMs(config.task_queue.default_timeout_ms));
        }

        if config.optimizer.min_entries_for_optimization == 0 {
            return Err(ConfigError::InvalidMinEntries(config.optimizer.min_entries_for_optimization));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.database.path, ".controlplane/controlplane.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let yaml = r"
task_queue:
  max_concurrent: 4
  max_retries: 5
logging:
  level: debug
  format: pretty
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.task_queue.max_concurrent, 4);
        assert_eq!(config.logging.level, "debug");
        ConfigLoader::validate(&config).expect("parsed config should be valid");
    }

    #[test]
    fn validate_rejects_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn validate_rejects_zero_max_concurrent() {
        let mut config = Config::default();
        config.task_queue.max_concurrent = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxConcurrent(0))));
    }

    #[test]
    fn validate_rejects_sub_second_timeout() {
        let mut config = Config::default();
        config.task_queue.default_timeout_ms = 500;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidTimeoutMs(500))));
    }

    #[test]
    fn env_override_prefix_is_controlplane() {
        unsafe {
            std::env::set_var("CONTROLPLANE_LOGGING__LEVEL", "debug");
        }
        assert_eq!(std::env::var("CONTROLPLANE_LOGGING__LEVEL").unwrap(), "debug");
        unsafe {
            std::env::remove_var("CONTROLPLANE_LOGGING__LEVEL");
        }
    }

    #[test]
    fn hierarchical_merging_lets_override_file_win() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "task_queue:\n  max_concurrent: 2\nlogging:\n  level: info").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "task_queue:\n  max_concurrent: 8").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.task_queue.max_concurrent, 8);
        assert_eq!(config.logging.level, "info");
    }
}
