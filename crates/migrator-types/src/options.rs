use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transform_spec::FieldTransformation;

/// `atomic`: all-or-nothing target writes via the target provider's
/// transaction capability. `independent`: each item's target write stands
/// on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    #[default]
    Independent,
    Atomic,
}

/// How strictly pre-flight and per-item validation issues are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Incompatibilities are errors.
    #[default]
    Strict,
    /// Incompatibilities are warnings; only a missing required field is an error.
    Lenient,
    /// Skip compatibility checks entirely; emit one warning noting that.
    None,
}

/// Restricts which source test cases are migrated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCaseFilter {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub priorities: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub modified_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// The recognized options for one migration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    #[serde(default)]
    pub include_attachments: bool,
    #[serde(default)]
    pub include_history: bool,
    #[serde(default)]
    pub preserve_ids: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Renames custom-field keys; source key -> target key.
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub field_transformations: Vec<FieldTransformation>,
    #[serde(default)]
    pub filters: Option<TestCaseFilter>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(
        default = "default_retry_delay",
        deserialize_with = "migrator_retry::deserialize_duration",
        serialize_with = "migrator_retry::serialize_duration"
    )]
    pub retry_delay: Duration,
    #[serde(default)]
    #[serde(
        deserialize_with = "deserialize_opt_duration",
        serialize_with = "serialize_opt_duration"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub transaction_mode: TransactionMode,
    #[serde(default)]
    pub validation_level: ValidationLevel,
}

fn default_batch_size() -> usize {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> Duration {
    Duration::from_millis(500)
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => humantime::parse_duration(&s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        Some(serde_json::Value::Number(n)) => Ok(n.as_u64().map(Duration::from_millis)),
        Some(_) => Err(serde::de::Error::custom("invalid duration value")),
    }
}

fn serialize_opt_duration<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            include_attachments: false,
            include_history: false,
            preserve_ids: false,
            dry_run: false,
            field_mappings: BTreeMap::new(),
            field_transformations: Vec::new(),
            filters: None,
            batch_size: default_batch_size(),
            continue_on_error: false,
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            timeout: None,
            transaction_mode: TransactionMode::default(),
            validation_level: ValidationLevel::default(),
        }
    }
}

/// Top-level request to migrate test cases from one system to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateTestCasesInput {
    pub source_system_id: String,
    pub target_system_id: String,
    pub project_key: String,
    #[serde(default)]
    pub test_case_ids: Vec<String>,
    #[serde(default)]
    pub options: MigrationOptions,
}
