//! Runtime configuration for the control plane.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded by
/// [`crate::infrastructure::config::ConfigLoader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub task_queue: TaskQueueConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            task_queue: TaskQueueConfig::default(),
            router: RouterConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".controlplane/controlplane.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
        }
    }
}

/// Task queue configuration (§4.4, §5, §6 CLI/env surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskQueueConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// The external "chat" endpoint the executor POSTs instructions to
    /// (§6: out-of-scope collaborator whose contract the core depends on).
    #[serde(default = "default_chat_endpoint_url")]
    pub chat_endpoint_url: String,
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

const fn default_max_concurrent() -> usize {
    1
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_timeout_ms() -> u64 {
    120_000
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_chat_endpoint_url() -> String {
    "http://localhost:3000/api/chat".to_string()
}

const fn default_webhook_timeout_ms() -> u64 {
    10_000
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            default_timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            chat_endpoint_url: default_chat_endpoint_url(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

/// Router/SelfLearner configuration (§4.5–4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RouterConfig {
    #[serde(default = "default_learner_interval_secs")]
    pub self_learner_interval_secs: u64,
    #[serde(default = "default_min_calls_for_optimization")]
    pub min_calls_for_optimization: u64,
}

const fn default_learner_interval_secs() -> u64 {
    60
}

const fn default_min_calls_for_optimization() -> u64 {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            self_learner_interval_secs: default_learner_interval_secs(),
            min_calls_for_optimization: default_min_calls_for_optimization(),
        }
    }
}

/// Adaptive memory optimizer configuration (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizerConfig {
    #[serde(default = "default_optimizer_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_min_entries_for_optimization")]
    pub min_entries_for_optimization: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u64,
    #[serde(default = "default_system_prompt_tokens")]
    pub system_prompt_tokens: u64,
    #[serde(default = "default_response_reserve_tokens")]
    pub response_reserve_tokens: u64,
}

const fn default_optimizer_interval_ms() -> u64 {
    120_000
}

const fn default_min_entries_for_optimization() -> usize {
    10
}

const fn default_max_context_tokens() -> u64 {
    200_000
}

const fn default_system_prompt_tokens() -> u64 {
    2_000
}

const fn default_response_reserve_tokens() -> u64 {
    4_000
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_optimizer_interval_ms(),
            min_entries_for_optimization: default_min_entries_for_optimization(),
            max_context_tokens: default_max_context_tokens(),
            system_prompt_tokens: default_system_prompt_tokens(),
            response_reserve_tokens: default_response_reserve_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.task_queue.max_concurrent, 1);
        assert_eq!(config.task_queue.max_retries, 3);
        assert_eq!(config.task_queue.default_timeout_ms, 120_000);
        assert_eq!(config.router.self_learner_interval_secs, 60);
        assert_eq!(config.optimizer.interval_ms, 120_000);
        assert_eq!(config.optimizer.min_entries_for_optimization, 10);
    }
}
