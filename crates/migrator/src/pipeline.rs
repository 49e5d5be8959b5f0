//! The per-test-case pipeline: map, transform, create, then the
//! optional attachments/history legs, for a single source test case.
//! The Controller drives this once per item; nothing here knows about
//! batching, pausing, or the overall run.

use migrator_providers::{SourceProvider, TargetProvider};
use migrator_retry::{RetryExecutor, RetryStrategyConfig};
use migrator_transform::{apply_field_mappings, apply_transformations};
use migrator_types::{
    ErrorKind, ItemStatus, MigrationError, MigrationOptions, TestCase, TestCaseDetail,
};

/// Runs the full per-item sequence against one source test case: map,
/// transform, create, and (if requested) attachments and history. Never
/// panics — every failure is captured in the returned [`TestCaseDetail`].
pub fn process_test_case(
    source: &dyn SourceProvider,
    target: &dyn TargetProvider,
    project_key: &str,
    mut case: TestCase,
    options: &MigrationOptions,
    retry_config: RetryStrategyConfig,
) -> TestCaseDetail {
    let source_id = case.id.clone();
    let name = case.name.clone();

    apply_field_mappings(&mut case, &options.field_mappings);
    let transform_outcome = apply_transformations(&mut case, &options.field_transformations);

    let use_create_with_id = options.preserve_ids && target.get_capabilities().supports_create_with_id;

    let retry = RetryExecutor::new(retry_config);
    let mut retry_count = 0;
    let (create_result, attempts) = retry.run(|attempt| {
        if attempt > 1 {
            retry_count = attempt - 1;
        }
        if use_create_with_id {
            target.create_test_case_with_id(project_key, &source_id, &case)
        } else {
            target.create_test_case(project_key, &case)
        }
    });
    let _ = attempts;

    let mut detail = TestCaseDetail {
        source_id: source_id.clone(),
        target_id: None,
        name,
        status: ItemStatus::InProgress,
        retry_count,
        error: None,
        warnings: Vec::new(),
        transformations_applied: transform_outcome.applied,
        transformations_skipped: transform_outcome.skipped.len() as u32,
        transformations_failed: transform_outcome.failed.len() as u32,
        attachments_migrated: 0,
        attachments_failed: 0,
        history_migrated: false,
    };

    for failure in &transform_outcome.failed {
        detail.warnings.push(
            MigrationError::warning(
                "TRANSFORMATION_FAILED",
                ErrorKind::ItemFailure,
                format!(
                    "transformation {} -> {} failed: {}",
                    failure.source_path, failure.target_path, failure.reason
                ),
            )
            .with_field(failure.source_path.clone())
            .with_test_case_id(source_id.clone()),
        );
    }

    let created = match create_result {
        Ok(created) => created,
        Err(err) => {
            detail.status = ItemStatus::Failed;
            detail.error = Some(
                MigrationError::new(
                    "CREATE_FAILED",
                    ErrorKind::ItemFailure,
                    format!("failed to create test case '{source_id}' in target: {err:#}"),
                )
                .with_test_case_id(source_id.clone()),
            );
            return detail;
        }
    };

    if options.preserve_ids && !use_create_with_id && created.id != source_id {
        detail.warnings.push(
            MigrationError::warning(
                "ID_NOT_PRESERVED",
                ErrorKind::ItemFailure,
                format!(
                    "preserveIds requested but target assigned id '{}' instead of '{source_id}'",
                    created.id
                ),
            )
            .with_test_case_id(source_id.clone()),
        );
    }

    detail.target_id = Some(created.id.clone());

    if options.include_attachments {
        let (migrated, failed) = migrate_attachments(source, target, &source_id, &created.id);
        detail.attachments_migrated = migrated;
        detail.attachments_failed = failed;
    }

    if options.include_history {
        detail.history_migrated = migrate_history(source, target, &source_id, &created.id);
    }

    detail.status = ItemStatus::Migrated;
    detail
}

/// Fetches every attachment for the source id and posts each to the
/// target individually, so one bad attachment doesn't sink the rest.
fn migrate_attachments(
    source: &dyn SourceProvider,
    target: &dyn TargetProvider,
    source_id: &str,
    target_id: &str,
) -> (u32, u32) {
    let attachments = match source.get_test_case_attachments(source_id) {
        Ok(items) => items,
        Err(_) => return (0, 0),
    };

    let mut migrated = 0;
    let mut failed = 0;
    for attachment in &attachments {
        match target.add_test_case_attachment(target_id, attachment) {
            Ok(()) => migrated += 1,
            Err(_) => failed += 1,
        }
    }
    (migrated, failed)
}

/// Fetches and posts history as a single call: either every entry
/// migrates or none does.
fn migrate_history(
    source: &dyn SourceProvider,
    target: &dyn TargetProvider,
    source_id: &str,
    target_id: &str,
) -> bool {
    let history = match source.get_test_case_history(source_id) {
        Ok(items) => items,
        Err(_) => return false,
    };
    if history.is_empty() {
        return true;
    }
    target.add_test_case_history(target_id, &history).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator_providers::mock::{MockSourceProvider, MockTargetProvider};
    use migrator_retry::RetryPolicy;
    use migrator_types::{Attachment, HistoryEntry, TestCasePriority, TestCaseStatus};
    use std::collections::BTreeMap;

    fn sample_case(id: &str) -> TestCase {
        TestCase {
            id: id.to_string(),
            name: "Login works".into(),
            description: String::new(),
            status: TestCaseStatus::Active,
            priority: TestCasePriority::Medium,
            steps: vec![],
            custom_fields: BTreeMap::new(),
            attachments: None,
            history: None,
        }
    }

    fn fast_retry() -> RetryStrategyConfig {
        RetryStrategyConfig { max_attempts: 2, jitter: 0.0, ..RetryPolicy::Default.to_config() }
    }

    #[test]
    fn a_successful_create_yields_a_migrated_item() {
        let source = MockSourceProvider::new("SRC").with_test_case(sample_case("TC-1"));
        let target = MockTargetProvider::new("TGT");
        let detail = process_test_case(
            &source,
            &target,
            "TGT",
            sample_case("TC-1"),
            &MigrationOptions::default(),
            fast_retry(),
        );
        assert_eq!(detail.status, ItemStatus::Migrated);
        assert!(detail.target_id.is_some());
        assert_eq!(target.created_test_cases().len(), 1);
    }

    #[test]
    fn a_create_that_always_fails_yields_a_failed_item() {
        let source = MockSourceProvider::new("SRC");
        let target = MockTargetProvider::new("TGT").fail_create_for("TC-1");
        let detail = process_test_case(
            &source,
            &target,
            "TGT",
            sample_case("TC-1"),
            &MigrationOptions::default(),
            fast_retry(),
        );
        assert_eq!(detail.status, ItemStatus::Failed);
        assert!(detail.error.is_some());
        assert!(detail.target_id.is_none());
    }

    #[test]
    fn preserve_ids_uses_create_with_id_when_supported() {
        let source = MockSourceProvider::new("SRC");
        let target = MockTargetProvider::new("TGT");
        let options = MigrationOptions { preserve_ids: true, ..Default::default() };
        let detail =
            process_test_case(&source, &target, "TGT", sample_case("TC-1"), &options, fast_retry());
        assert_eq!(detail.target_id.as_deref(), Some("TC-1"));
    }

    #[test]
    fn attachments_are_migrated_when_requested() {
        let attachment = Attachment {
            id: "A-1".into(),
            file_name: "screenshot.png".into(),
            content_type: "image/png".into(),
            content: vec![1, 2, 3],
            size_bytes: 3,
            checksum: None,
        };
        let source = MockSourceProvider::new("SRC").with_attachments("TC-1", vec![attachment]);
        let target = MockTargetProvider::new("TGT");
        let options = MigrationOptions { include_attachments: true, ..Default::default() };
        let detail =
            process_test_case(&source, &target, "TGT", sample_case("TC-1"), &options, fast_retry());
        assert_eq!(detail.attachments_migrated, 1);
        assert_eq!(detail.attachments_failed, 0);
    }

    #[test]
    fn history_is_migrated_as_one_call_when_requested() {
        let entry = HistoryEntry {
            id: "H-1".into(),
            timestamp: chrono::Utc::now(),
            author: "alice".into(),
            field: "status".into(),
            old_value: Some("draft".into()),
            new_value: Some("active".into()),
            comment: None,
            change_type: None,
        };
        let source = MockSourceProvider::new("SRC").with_history("TC-1", vec![entry]);
        let target = MockTargetProvider::new("TGT");
        let options = MigrationOptions { include_history: true, ..Default::default() };
        let detail =
            process_test_case(&source, &target, "TGT", sample_case("TC-1"), &options, fast_retry());
        assert!(detail.history_migrated);
    }

    #[test]
    fn retries_are_recorded_before_eventual_success() {
        struct FlakyTarget {
            inner: MockTargetProvider,
            attempts: std::sync::atomic::AtomicU32,
        }
        impl TargetProvider for FlakyTarget {
            fn test_connection(&self) -> anyhow::Result<migrator_providers::ConnectionStatus> {
                self.inner.test_connection()
            }
            fn get_api_contract(
                &self,
            ) -> anyhow::Result<std::collections::BTreeMap<migrator_types::OperationType, migrator_types::OperationDefinition>>
            {
                self.inner.get_api_contract()
            }
            fn get_projects(&self) -> anyhow::Result<Vec<migrator_providers::Project>> {
                self.inner.get_projects()
            }
            fn get_project(&self, key: &str) -> anyhow::Result<migrator_providers::Project> {
                self.inner.get_project(key)
            }
            fn create_test_case(&self, project_key: &str, case: &TestCase) -> anyhow::Result<TestCase> {
                let n = self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    anyhow::bail!("transient failure");
                }
                self.inner.create_test_case(project_key, case)
            }
            fn add_test_case_attachment(
                &self,
                id: &str,
                attachment: &migrator_types::Attachment,
            ) -> anyhow::Result<()> {
                self.inner.add_test_case_attachment(id, attachment)
            }
            fn add_test_case_history(
                &self,
                id: &str,
                history: &[migrator_types::HistoryEntry],
            ) -> anyhow::Result<()> {
                self.inner.add_test_case_history(id, history)
            }
        }

        let source = MockSourceProvider::new("SRC");
        let target = FlakyTarget { inner: MockTargetProvider::new("TGT"), attempts: Default::default() };
        let detail = process_test_case(
            &source,
            &target,
            "TGT",
            sample_case("TC-1"),
            &MigrationOptions::default(),
            fast_retry(),
        );
        assert_eq!(detail.status, ItemStatus::Migrated);
        assert_eq!(detail.retry_count, 1);
    }
}
