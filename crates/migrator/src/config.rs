//! Configuration file support (`.migrator.toml`) in the workspace root.
//!
//! Supplies defaults for retry policy, batch size, validation level, and
//! transaction mode. Explicit fields on [`MigrationOptions`] always win;
//! this only fills in values a caller left at their struct default.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use migrator_types::{MigrationOptions, TransactionMode, ValidationLevel};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = ".migrator.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigratorConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub validation_level: ValidationLevel,
    #[serde(default)]
    pub transaction_mode: TransactionMode,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            validation_level: ValidationLevel::default(),
            transaction_mode: TransactionMode::default(),
            continue_on_error: false,
        }
    }
}

fn default_batch_size() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(
        default = "default_retry_delay",
        deserialize_with = "migrator_retry::deserialize_duration",
        serialize_with = "migrator_retry::serialize_duration"
    )]
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(500)
}

impl MigratorConfig {
    pub fn load_from_workspace(workspace_root: &Path) -> Result<Option<Self>> {
        let path = workspace_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Fills in any field of `options` still at its struct default with
    /// this config's value. Never overwrites a field the caller already
    /// set explicitly to something non-default.
    pub fn apply_defaults(&self, options: &mut MigrationOptions) {
        let defaults = MigrationOptions::default();
        if options.batch_size == defaults.batch_size {
            options.batch_size = self.defaults.batch_size;
        }
        if options.validation_level == defaults.validation_level {
            options.validation_level = self.defaults.validation_level;
        }
        if options.transaction_mode == defaults.transaction_mode {
            options.transaction_mode = self.defaults.transaction_mode;
        }
        if options.continue_on_error == defaults.continue_on_error {
            options.continue_on_error = self.defaults.continue_on_error;
        }
        if options.max_retries == defaults.max_retries {
            options.max_retries = self.retry.max_retries;
        }
        if options.retry_delay == defaults.retry_delay {
            options.retry_delay = self.retry.retry_delay;
        }
    }
}
