//! # migrator-state
//!
//! Persists a run's progress so it can be resumed after a crash or a
//! deliberate pause, and writes the final receipt once a run reaches a
//! terminal status: `state.json` is the in-progress snapshot,
//! `receipt.json` the immutable record of what actually happened.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use migrator_types::{MigrationResult, MigrationStatus};
use serde::{Deserialize, Serialize};

pub const CURRENT_STATE_VERSION: &str = "migrator.state.v1";
pub const CURRENT_RECEIPT_VERSION: &str = "migrator.receipt.v1";
pub const MINIMUM_SUPPORTED_RECEIPT_VERSION: &str = "migrator.receipt.v1";

pub const STATE_FILE: &str = "state.json";
pub const RECEIPT_FILE: &str = "receipt.json";

pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

pub fn receipt_path(state_dir: &Path) -> PathBuf {
    state_dir.join(RECEIPT_FILE)
}

/// In-progress snapshot of a run, written at batch boundaries so a
/// killed process can resume without re-processing already-migrated
/// items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default = "default_state_version")]
    pub schema_version: String,
    pub result: MigrationResult,
    /// Source ids already processed (migrated, skipped, or failed) —
    /// resume skips these rather than re-running them.
    pub processed_source_ids: BTreeSet<String>,
}

fn default_state_version() -> String {
    CURRENT_STATE_VERSION.to_string()
}

impl RunState {
    pub fn new(result: MigrationResult) -> Self {
        Self {
            schema_version: CURRENT_STATE_VERSION.to_string(),
            result,
            processed_source_ids: BTreeSet::new(),
        }
    }
}

/// The immutable record of a finished run, written once the run reaches
/// a terminal [`MigrationStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default = "default_receipt_version")]
    pub receipt_version: String,
    pub run_id: String,
    pub status: MigrationStatus,
    pub result: MigrationResult,
}

fn default_receipt_version() -> String {
    CURRENT_RECEIPT_VERSION.to_string()
}

pub fn load_state(state_dir: &Path) -> Result<Option<RunState>> {
    let path = state_path(state_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let state: RunState = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state JSON {}", path.display()))?;
    Ok(Some(state))
}

pub fn save_state(state_dir: &Path, state: &RunState) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;
    atomic_write_json(&state_path(state_dir), state)
}

pub fn clear_state(state_dir: &Path) -> Result<()> {
    let path = state_path(state_dir);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove state file {}", path.display()))?;
    }
    Ok(())
}

/// A run that was interrupted mid-flight: `state.json` exists but
/// `receipt.json` doesn't, meaning no terminal status was ever reached.
pub fn has_incomplete_state(state_dir: &Path) -> bool {
    state_path(state_dir).exists() && !receipt_path(state_dir).exists()
}

pub fn write_receipt(state_dir: &Path, receipt: &Receipt) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("failed to create state dir {}", state_dir.display()))?;
    atomic_write_json(&receipt_path(state_dir), receipt)
}

pub fn load_receipt(state_dir: &Path) -> Result<Option<Receipt>> {
    let path = receipt_path(state_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read receipt file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse receipt JSON {}", path.display()))?;
    let version = value
        .get("receipt_version")
        .and_then(|v| v.as_str())
        .unwrap_or(CURRENT_RECEIPT_VERSION)
        .to_string();
    validate_receipt_version(&version)?;
    let receipt: Receipt = serde_json::from_value(value)
        .with_context(|| format!("failed to deserialize receipt from {}", path.display()))?;
    Ok(Some(receipt))
}

pub fn validate_receipt_version(version: &str) -> Result<()> {
    let version_num = parse_schema_version(version)
        .with_context(|| format!("invalid receipt version format: {version}"))?;
    let minimum_num = parse_schema_version(MINIMUM_SUPPORTED_RECEIPT_VERSION)
        .expect("MINIMUM_SUPPORTED_RECEIPT_VERSION is well-formed");
    if version_num < minimum_num {
        anyhow::bail!(
            "receipt version {version} is too old; minimum supported version is {MINIMUM_SUPPORTED_RECEIPT_VERSION}"
        );
    }
    Ok(())
}

fn parse_schema_version(version: &str) -> Result<u32> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 3 || parts[0] != "migrator" || !parts[2].starts_with('v') {
        anyhow::bail!("invalid schema version format: {version}");
    }
    parts[2][1..]
        .parse::<u32>()
        .with_context(|| format!("invalid version number in schema version: {version}"))
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;
    {
        let mut f = File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }
    fs::rename(&tmp, path).with_context(|| {
        format!("failed to rename tmp file {} to {}", tmp.display(), path.display())
    })?;
    Ok(())
}
