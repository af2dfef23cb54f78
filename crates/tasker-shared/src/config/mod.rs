//! Process-level configuration (SPEC_FULL.md §6 / spec.md §6).
//!
//! Loaded via the `config` crate from a base TOML file plus environment
//! overrides (`TASKER_` prefixed env vars), mirroring the teacher's
//! layered `ConfigManager` pattern.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/tasker".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// The enumerated process-level knobs from spec.md §6, each with the
/// documented default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_finalizer_max_inline_iterations")]
    pub finalizer_max_inline_iterations: u32,
    #[serde(default = "default_retry_limit")]
    pub default_retry_limit: i32,
    #[serde(default = "default_retryable")]
    pub default_retryable: bool,
    #[serde(default = "default_backoff_cap_seconds")]
    pub backoff_cap_seconds: i64,
    #[serde(default = "default_reenqueue_min_delay_seconds")]
    pub reenqueue_min_delay_seconds: i64,
    #[serde(default = "default_reenqueue_max_delay_seconds")]
    pub reenqueue_max_delay_seconds: i64,
    #[serde(default = "default_identity_fields")]
    pub identity_fields: Vec<String>,
}

fn default_worker_pool_size() -> usize {
    5
}
fn default_finalizer_max_inline_iterations() -> u32 {
    25
}
fn default_retry_limit() -> i32 {
    3
}
fn default_retryable() -> bool {
    true
}
fn default_backoff_cap_seconds() -> i64 {
    30
}
fn default_reenqueue_min_delay_seconds() -> i64 {
    1
}
fn default_reenqueue_max_delay_seconds() -> i64 {
    30
}
fn default_identity_fields() -> Vec<String> {
    vec![
        "name".to_string(),
        "context".to_string(),
        "initiator".to_string(),
        "source_system".to_string(),
        "reason".to_string(),
        "tags".to_string(),
    ]
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            finalizer_max_inline_iterations: default_finalizer_max_inline_iterations(),
            default_retry_limit: default_retry_limit(),
            default_retryable: default_retryable(),
            backoff_cap_seconds: default_backoff_cap_seconds(),
            reenqueue_min_delay_seconds: default_reenqueue_min_delay_seconds(),
            reenqueue_max_delay_seconds: default_reenqueue_max_delay_seconds(),
            identity_fields: default_identity_fields(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl TaskerConfig {
    /// Loads `base.toml` (if present) layered with `TASKER_`-prefixed
    /// environment variables (e.g. `TASKER_DATABASE__URL`).
    pub fn load(base_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = base_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TASKER")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}
