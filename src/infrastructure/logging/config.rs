use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::LoggingConfig as DomainLoggingConfig;

/// Logger initialization options, derived from the domain [`DomainLoggingConfig`]
/// plus process-level overrides not persisted in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Directory for log files. `None` logs to stdout only.
    pub log_dir: Option<PathBuf>,
    pub enable_stdout: bool,
    pub rotation: RotationPolicy,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

impl From<&DomainLoggingConfig> for LogConfig {
    fn from(config: &DomainLoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: if config.format == "pretty" { LogFormat::Pretty } else { LogFormat::Json },
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
            retention_days: config.retention_days,
        }
    }
}

impl LogConfig {
    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.log_dir = Some(log_dir);
        self
    }
}
