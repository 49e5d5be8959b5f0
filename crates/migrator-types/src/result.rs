use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrationError;
use crate::testcase::{TestCasePriority, TestCaseStatus};

/// The migration lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Validating,
    Running,
    Paused,
    Completed,
    PartiallyCompleted,
    Failed,
    Cancelled,
    RollbackInProgress,
    RollbackCompleted,
    RollbackFailed,
}

impl MigrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed
                | MigrationStatus::PartiallyCompleted
                | MigrationStatus::Failed
                | MigrationStatus::Cancelled
                | MigrationStatus::RollbackCompleted
                | MigrationStatus::RollbackFailed
        )
    }
}

/// Final disposition of a single source test case within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Retrying,
    Migrated,
    Skipped,
    Failed,
}

/// Per-item detail recorded into one of `MigrationResult`'s three buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseDetail {
    pub source_id: String,
    pub target_id: Option<String>,
    pub name: String,
    pub status: ItemStatus,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
    /// Warning-severity issues (transformation failures, id reassignment)
    /// that did not stop this item from migrating.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<MigrationError>,
    #[serde(default)]
    pub transformations_applied: Vec<String>,
    #[serde(default)]
    pub transformations_skipped: u32,
    #[serde(default)]
    pub transformations_failed: u32,
    #[serde(default)]
    pub attachments_migrated: u32,
    #[serde(default)]
    pub attachments_failed: u32,
    #[serde(default)]
    pub history_migrated: bool,
}

/// Aggregate counters over a run, broken down several ways.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub by_status: BTreeMap<String, u32>,
    pub by_priority: BTreeMap<String, u32>,
    pub transformations_applied: u32,
    pub transformations_skipped: u32,
    pub transformations_failed: u32,
    pub attachment_stats: AttachmentStats,
    pub history_stats: HistoryStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentStats {
    pub total: u32,
    pub migrated: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: u32,
    pub migrated: u32,
    pub failed: u32,
}

impl MigrationSummary {
    pub fn record_status(&mut self, status: TestCaseStatus) {
        *self
            .by_status
            .entry(format!("{status:?}").to_lowercase())
            .or_insert(0) += 1;
    }

    pub fn record_priority(&mut self, priority: TestCasePriority) {
        *self
            .by_priority
            .entry(format!("{priority:?}").to_lowercase())
            .or_insert(0) += 1;
    }
}

/// The outcome of a migration run. Invariants (enforced by the Controller,
/// never by this struct alone):
/// - `migrated_count + skipped_count + failed_count <= total_count` always;
///   equality holds at terminal status.
/// - each source id appears in at most one of `migrated`/`skipped`/`failed`.
/// - `progress` is monotonically non-decreasing within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub run_id: String,
    pub source_system_id: String,
    pub target_system_id: String,
    pub total_count: u32,
    pub migrated_count: u32,
    pub skipped_count: u32,
    pub failed_count: u32,
    pub migrated: Vec<TestCaseDetail>,
    pub skipped: Vec<TestCaseDetail>,
    pub failed: Vec<TestCaseDetail>,
    pub errors: Vec<MigrationError>,
    pub summary: MigrationSummary,
    pub status: MigrationStatus,
    /// 0-100.
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_deep_link: Option<String>,
}

impl MigrationResult {
    pub fn new(
        run_id: impl Into<String>,
        source_system_id: impl Into<String>,
        target_system_id: impl Into<String>,
        total_count: u32,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            source_system_id: source_system_id.into(),
            target_system_id: target_system_id.into(),
            total_count,
            migrated_count: 0,
            skipped_count: 0,
            failed_count: 0,
            migrated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            errors: Vec::new(),
            summary: MigrationSummary::default(),
            status: MigrationStatus::Pending,
            progress: 0,
            started_at: Utc::now(),
            finished_at: None,
            target_deep_link: None,
        }
    }

    /// Items processed so far. Progress counts every processed item
    /// (successes, failures, and skips), not only successes.
    pub fn processed_count(&self) -> u32 {
        self.migrated_count + self.skipped_count + self.failed_count
    }

    pub fn recompute_progress(&mut self) {
        if self.total_count == 0 {
            self.progress = 100;
            return;
        }
        let pct = (self.processed_count() as f64 / self.total_count as f64 * 100.0).round() as u8;
        self.progress = self.progress.max(pct.min(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_count_sums_three_buckets() {
        let mut result = MigrationResult::new("run-1", "src", "tgt", 10);
        result.migrated_count = 3;
        result.skipped_count = 1;
        result.failed_count = 2;
        assert_eq!(result.processed_count(), 6);
    }

    #[test]
    fn progress_is_monotonic_non_decreasing() {
        let mut result = MigrationResult::new("run-1", "src", "tgt", 4);
        result.migrated_count = 1;
        result.recompute_progress();
        let first = result.progress;
        result.migrated_count = 2;
        result.recompute_progress();
        assert!(result.progress >= first);
    }

    #[test]
    fn zero_total_is_immediately_complete() {
        let mut result = MigrationResult::new("run-1", "src", "tgt", 0);
        result.recompute_progress();
        assert_eq!(result.progress, 100);
    }
}
