//! End-to-end scenarios for the migration controller, written
//! Given-When-Then style against the in-memory provider pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use migrator::controller::{ControlHandle, MigrationController, PauseReason};
use migrator_events::Subscriber;
use migrator_providers::mock::{MockSourceProvider, MockTargetProvider};
use migrator_providers::{FieldDataType, FieldSchema};
use migrator_types::{
    Attachment, EventKind, ItemStatus, MigrateTestCasesInput, MigrationEvent, MigrationOptions,
    MigrationStatus, OperationDefinition, OperationType, TestCase, TestCasePriority,
    TestCaseStatus, TransactionMode,
};

fn sample_case(id: &str) -> TestCase {
    TestCase {
        id: id.to_string(),
        name: format!("Case {id}"),
        description: String::new(),
        status: TestCaseStatus::Active,
        priority: TestCasePriority::Medium,
        steps: vec![],
        custom_fields: Default::default(),
        attachments: None,
        history: None,
    }
}

fn sample_attachment(id: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        file_name: format!("{id}.png"),
        content_type: "image/png".into(),
        content: vec![0xde, 0xad],
        size_bytes: 2,
        checksum: None,
    }
}

fn fast_options() -> MigrationOptions {
    MigrationOptions {
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

fn input_with(options: MigrationOptions) -> MigrateTestCasesInput {
    MigrateTestCasesInput {
        source_system_id: "zephyr".into(),
        target_system_id: "testrail".into(),
        project_key: "PROJ".into(),
        test_case_ids: vec![],
        options,
    }
}

/// Collects every published event so tests can assert on ordering.
#[derive(Clone, Default)]
struct EventCollector {
    events: Arc<Mutex<Vec<MigrationEvent>>>,
}

impl Subscriber for EventCollector {
    fn on_event(&self, event: &MigrationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl EventCollector {
    fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| label(&e.kind)).collect()
    }
}

fn label(kind: &EventKind) -> String {
    match kind {
        EventKind::Started { .. } => "started".into(),
        EventKind::StatusChanged { status } => format!("status_changed:{status:?}"),
        EventKind::ProgressUpdated { .. } => "progress_updated".into(),
        EventKind::TestCasesLoaded { .. } => "test_cases_loaded".into(),
        EventKind::BatchCompleted { .. } => "batch_completed".into(),
        EventKind::TestCaseProcessed { .. } => "test_case_processed".into(),
        EventKind::Paused { .. } => "paused".into(),
        EventKind::Resumed => "resumed".into(),
        EventKind::Cancelled => "cancelled".into(),
        EventKind::Completed { .. } => "completed".into(),
        EventKind::Failed { .. } => "failed".into(),
    }
}

/// Asserts `expected` appears within `labels` in order (other labels may
/// be interleaved).
fn assert_subsequence(labels: &[String], expected: &[&str]) {
    let mut cursor = 0;
    for want in expected {
        let found = labels[cursor..].iter().position(|l| l == want);
        match found {
            Some(offset) => cursor += offset + 1,
            None => panic!("expected '{want}' after position {cursor} in {labels:?}"),
        }
    }
}

/// Given three source cases with one attachment each, when the run asks
/// for attachments, then everything lands and progress ends at 100.
#[test]
fn happy_path_migrates_three_cases_with_attachments() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"))
        .with_test_case(sample_case("TC-3"))
        .with_attachments("TC-1", vec![sample_attachment("A-1")])
        .with_attachments("TC-2", vec![sample_attachment("A-2")])
        .with_attachments("TC-3", vec![sample_attachment("A-3")]);
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        include_attachments: true,
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.migrated_count, 3);
    assert_eq!(result.summary.attachment_stats.total, 3);
    assert_eq!(result.summary.attachment_stats.migrated, 3);
    assert_eq!(result.summary.attachment_stats.failed, 0);
    assert_eq!(result.progress, 100);
    assert_eq!(target.created_test_cases().len(), 3);
}

/// Given a provider contract whose operations depend on each other in a
/// cycle, when the run starts, then validation rejects the plan before a
/// single provider write happens.
#[test]
fn a_cyclic_contract_fails_the_run_before_any_write() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_contract_operation(
            OperationDefinition::new("sync_folders", "Sync folders")
                .depends_on([OperationType::from("sync_labels")]),
        )
        .with_contract_operation(
            OperationDefinition::new("sync_labels", "Sync labels")
                .depends_on([OperationType::from("sync_folders")]),
        );
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let mut controller = MigrationController::new(Arc::new(source), target.clone());
    let collector = EventCollector::default();
    controller.subscribe(Box::new(collector.clone()));

    let result = controller.run(&input_with(fast_options())).unwrap();

    assert_eq!(result.status, MigrationStatus::Failed);
    assert!(result.errors.iter().any(|e| e.code == "GRAPH_INVALID"));
    assert!(target.created_test_cases().is_empty());
    assert!(collector.labels().contains(&"failed".to_string()));
}

/// Given a target that fails the first two creates for one case, when the
/// retry budget allows three attempts, then the item migrates with its
/// retry count recorded.
#[test]
fn transient_create_failures_retry_to_success() {
    let source = MockSourceProvider::new("PROJ").with_test_case(sample_case("TC-1"));
    let target = Arc::new(MockTargetProvider::new("PROJ").fail_create_times("TC-1", 2));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        max_retries: 3,
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.migrated_count, 1);
    let detail = &result.migrated[0];
    assert_eq!(detail.status, ItemStatus::Migrated);
    assert_eq!(detail.retry_count, 2);
}

/// Given a number-typed source field mapped onto a required boolean
/// target field, when validation is strict, then the run fails pre-flight
/// with no items processed.
#[test]
fn strict_validation_rejects_incompatible_field_types() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_field(FieldSchema {
            name: "flag".into(),
            data_type: FieldDataType::Number,
            required: false,
            max_length: None,
            allowed_values: None,
        });
    let target = Arc::new(MockTargetProvider::new("PROJ").with_field(FieldSchema {
        name: "flag".into(),
        data_type: FieldDataType::Boolean,
        required: true,
        max_length: None,
        allowed_values: None,
    }));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        field_mappings: [("flag".to_string(), "flag".to_string())].into_iter().collect(),
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::Failed);
    assert!(result.errors.iter().any(|e| e.code == "INCOMPATIBLE_FIELD_TYPE"));
    assert_eq!(result.migrated_count + result.skipped_count + result.failed_count, 0);
    assert!(target.created_test_cases().is_empty());
}

/// Pauses the run as soon as the first batch completes; the paired thread
/// resumes it shortly after.
struct PauseAfterFirstBatch {
    handle: ControlHandle,
    fired: AtomicBool,
}

impl Subscriber for PauseAfterFirstBatch {
    fn on_event(&self, event: &MigrationEvent) {
        if matches!(event.kind, EventKind::BatchCompleted { .. })
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            self.handle.pause(Some(PauseReason::Review));
        }
    }
}

/// Given a four-item run in batches of two, when pause lands after the
/// first batch and resume arrives later, then the event stream shows the
/// full pause/resume cycle and all four items still migrate.
#[test]
fn pause_after_a_batch_then_resume_completes_the_run() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"))
        .with_test_case(sample_case("TC-3"))
        .with_test_case(sample_case("TC-4"));
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let mut controller = MigrationController::new(Arc::new(source), target.clone());

    let collector = EventCollector::default();
    controller.subscribe(Box::new(collector.clone()));
    let handle = controller.control_handle();
    controller.subscribe(Box::new(PauseAfterFirstBatch {
        handle: handle.clone(),
        fired: AtomicBool::new(false),
    }));

    let resumer = std::thread::spawn({
        let handle = handle.clone();
        move || {
            while !handle.is_paused() {
                std::thread::sleep(Duration::from_millis(5));
            }
            std::thread::sleep(Duration::from_millis(50));
            handle.resume();
        }
    });

    let options = MigrationOptions {
        batch_size: 2,
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();
    resumer.join().unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.migrated_count, 4);
    assert_subsequence(
        &collector.labels(),
        &[
            "batch_completed",
            "paused",
            "status_changed:Paused",
            "resumed",
            "status_changed:Running",
            "batch_completed",
            "completed",
        ],
    );
}

/// Given atomic transaction mode and a mid-run item failure with
/// continue-on-error off, when the run aborts, then the open transaction
/// rolls back and nothing remains in the target.
#[test]
fn atomic_mode_rolls_back_on_item_failure() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"))
        .with_test_case(sample_case("TC-3"));
    let target = Arc::new(MockTargetProvider::new("PROJ").fail_create_for("TC-2"));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        transaction_mode: TransactionMode::Atomic,
        continue_on_error: false,
        max_retries: 0,
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::RollbackCompleted);
    assert_eq!(target.rolled_back_transactions().len(), 1);
    assert!(!target.has_open_transaction());
    assert!(target.created_test_cases().is_empty());
    assert!(result.errors.iter().any(|e| e.code == "CREATE_FAILED"));
    assert_eq!(result.migrated_count, 1);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.skipped_count, 1);
}

/// A dry run simulates every item without touching the target.
#[test]
fn dry_run_counts_everything_and_writes_nothing() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"));
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        dry_run: true,
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.migrated_count, result.total_count);
    assert!(result.errors.iter().any(|e| e.code == "DRY_RUN" && e.is_warning()));
    assert!(target.created_test_cases().is_empty());
}

/// With continue-on-error on, one bad item never stops the rest, and at
/// terminal status every source id sits in exactly one bucket.
#[test]
fn continue_on_error_buckets_every_item_exactly_once() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"))
        .with_test_case(sample_case("TC-3"));
    let target = Arc::new(MockTargetProvider::new("PROJ").fail_create_for("TC-2"));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        continue_on_error: true,
        max_retries: 0,
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::PartiallyCompleted);
    assert_eq!(
        result.migrated_count + result.skipped_count + result.failed_count,
        result.total_count
    );
    let mut seen: Vec<&str> = result
        .migrated
        .iter()
        .chain(&result.skipped)
        .chain(&result.failed)
        .map(|d| d.source_id.as_str())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec!["TC-1", "TC-2", "TC-3"]);
}

/// A zero timeout converts into the cooperative cancel path before the
/// first item is touched.
#[test]
fn an_expired_timeout_cancels_the_run() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"));
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        timeout: Some(Duration::ZERO),
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::Cancelled);
    assert!(result.errors.iter().any(|e| e.code == "TIMEOUT"));
    assert!(target.created_test_cases().is_empty());
    assert_eq!(result.skipped_count, result.total_count);
}

/// Resuming from a saved snapshot skips the items the first run already
/// migrated.
#[test]
fn resume_skips_previously_processed_items() {
    use migrator_state::{RunState, save_state, CURRENT_STATE_VERSION};
    use migrator_types::{MigrationResult, TestCaseDetail};

    let td = tempfile::tempdir().unwrap();
    let mut prior_result = MigrationResult::new("run-prior", "zephyr", "testrail", 2);
    prior_result.status = MigrationStatus::Running;
    prior_result.migrated_count = 1;
    prior_result.migrated.push(TestCaseDetail {
        source_id: "TC-1".into(),
        target_id: Some("TGT-1".into()),
        name: "Case TC-1".into(),
        status: ItemStatus::Migrated,
        retry_count: 0,
        error: None,
        warnings: vec![],
        transformations_applied: vec![],
        transformations_skipped: 0,
        transformations_failed: 0,
        attachments_migrated: 0,
        attachments_failed: 0,
        history_migrated: false,
    });
    let mut state = RunState {
        schema_version: CURRENT_STATE_VERSION.to_string(),
        result: prior_result,
        processed_source_ids: Default::default(),
    };
    state.processed_source_ids.insert("TC-1".into());
    save_state(td.path(), &state).unwrap();

    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"));
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let controller = MigrationController::new(Arc::new(source), target.clone())
        .with_state_dir(td.path());

    let result = controller.resume(&input_with(fast_options())).unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.run_id, "run-prior");
    assert_eq!(result.migrated_count, 2);
    assert_eq!(target.created_test_cases().len(), 1);
}

/// Requesting atomic mode against a non-transactional target demotes to
/// independent mode with a warning instead of failing the run.
#[test]
fn atomic_mode_without_target_support_demotes_with_a_warning() {
    let source = MockSourceProvider::new("PROJ").with_test_case(sample_case("TC-1"));
    let target = Arc::new(MockTargetProvider::new("PROJ").without_transactions());
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let options = MigrationOptions {
        transaction_mode: TransactionMode::Atomic,
        ..fast_options()
    };
    let result = controller.run(&input_with(options)).unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert!(result
        .errors
        .iter()
        .any(|e| e.code == "TRANSACTIONS_UNSUPPORTED" && e.is_warning()));
    assert_eq!(target.created_test_cases().len(), 1);
}

/// Explicit test-case ids restrict the run to per-id fetches.
#[test]
fn explicit_ids_migrate_only_the_requested_cases() {
    let source = MockSourceProvider::new("PROJ")
        .with_test_case(sample_case("TC-1"))
        .with_test_case(sample_case("TC-2"))
        .with_test_case(sample_case("TC-3"));
    let target = Arc::new(MockTargetProvider::new("PROJ"));
    let controller = MigrationController::new(Arc::new(source), target.clone());

    let mut input = input_with(fast_options());
    input.test_case_ids = vec!["TC-1".into(), "TC-3".into()];
    let result = controller.run(&input).unwrap();

    assert_eq!(result.status, MigrationStatus::Completed);
    assert_eq!(result.total_count, 2);
    assert_eq!(target.created_test_cases().len(), 2);
}
