//! The migration controller: owns one run's lifecycle state machine and
//! drives validator → plan builder → resolver → executor, batching the
//! per-item work and reacting to pause, resume, and cancel signals
//! between items.
//!
//! Pause and cancel are cooperative: signals are observed at item
//! boundaries and retry boundaries, never mid-provider-call, so
//! target-side state stays well-defined. A caller steers a running
//! migration through a cloned [`ControlHandle`] from any thread.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;

use migrator_events::{EventBus, EventLog, Subscriber};
use migrator_providers::{OperationContext, SourceProvider, TargetProvider};
use migrator_retry::{RetryStrategyConfig, RetryStrategyType};
use migrator_state::{self as state, Receipt, RunState};
use migrator_types::{
    ErrorKind, EventKind, ItemStatus, MigrateTestCasesInput, MigrationError, MigrationEvent,
    MigrationOptions, MigrationResult, MigrationStatus, OperationDefinition, OperationType,
    Severity, TestCase, TestCaseDetail, TransactionMode, ValidationLevel,
};

use crate::executor::{self, OperationExecutable};
use crate::pipeline;
use crate::plan;
use crate::validator;

/// Why a caller paused the run. Telemetry only — the controller behaves
/// identically for every reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Temporary,
    Review,
    Resources,
    RateLimit,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseReason::Temporary => "temporary",
            PauseReason::Review => "review",
            PauseReason::Resources => "resources",
            PauseReason::RateLimit => "rate-limit",
        }
    }
}

#[derive(Default)]
struct Signals {
    paused: bool,
    cancelled: bool,
    pause_reason: Option<String>,
}

#[derive(Default)]
struct ControlInner {
    signals: Mutex<Signals>,
    condvar: Condvar,
}

/// Cloneable handle for steering a run from another thread. All methods
/// are signal-only: they return immediately and the run reacts at its
/// next suspension point.
#[derive(Clone, Default)]
pub struct ControlHandle {
    inner: Arc<ControlInner>,
}

impl ControlHandle {
    pub fn pause(&self, reason: Option<PauseReason>) {
        let mut signals = self.inner.signals.lock().unwrap();
        signals.paused = true;
        signals.pause_reason = reason.map(|r| r.as_str().to_string());
        self.inner.condvar.notify_all();
    }

    pub fn resume(&self) {
        let mut signals = self.inner.signals.lock().unwrap();
        signals.paused = false;
        signals.pause_reason = None;
        self.inner.condvar.notify_all();
    }

    pub fn cancel(&self) {
        let mut signals = self.inner.signals.lock().unwrap();
        signals.cancelled = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.signals.lock().unwrap().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.signals.lock().unwrap().cancelled
    }
}

enum Gate {
    Proceed,
    Cancelled,
}

/// Runs migrations between one source and one target provider, emitting
/// progress on its event bus and (optionally) persisting run state and a
/// final receipt to a state directory.
pub struct MigrationController {
    source: Arc<dyn SourceProvider>,
    target: Arc<dyn TargetProvider>,
    bus: EventBus,
    control: ControlHandle,
    state_dir: Option<PathBuf>,
}

impl MigrationController {
    pub fn new(source: Arc<dyn SourceProvider>, target: Arc<dyn TargetProvider>) -> Self {
        Self {
            source,
            target,
            bus: EventBus::new(),
            control: ControlHandle::default(),
            state_dir: None,
        }
    }

    /// Enables run-state snapshots at batch boundaries, the final receipt,
    /// and the JSONL event log, all under `dir`.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber>) {
        self.bus.subscribe(subscriber);
    }

    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Runs one migration to a terminal status. Returns `Err` only for
    /// configuration errors (same source and target, zero batch size) —
    /// every other failure is captured in the returned result per the
    /// error-propagation policy.
    pub fn run(&self, input: &MigrateTestCasesInput) -> Result<MigrationResult> {
        self.run_inner(input, None)
    }

    /// Continues a previously-interrupted run from its persisted state,
    /// skipping items that already reached a terminal per-item status.
    pub fn resume(&self, input: &MigrateTestCasesInput) -> Result<MigrationResult> {
        let dir = self
            .state_dir
            .as_ref()
            .context("resuming requires a state directory")?;
        let prior = state::load_state(dir)?.context("no saved run state to resume from")?;
        if prior.result.status.is_terminal() {
            bail!(
                "run '{}' already reached terminal status {:?}; nothing to resume",
                prior.result.run_id,
                prior.result.status
            );
        }
        self.run_inner(input, Some(prior))
    }

    fn run_inner(
        &self,
        input: &MigrateTestCasesInput,
        prior: Option<RunState>,
    ) -> Result<MigrationResult> {
        validate_input(input)?;

        let options = &input.options;
        let (mut result, mut processed) = match prior {
            Some(prior_state) => (prior_state.result, prior_state.processed_source_ids),
            None => (
                MigrationResult::new(
                    generate_run_id(),
                    &input.source_system_id,
                    &input.target_system_id,
                    0,
                ),
                BTreeSet::new(),
            ),
        };
        result.status = MigrationStatus::Pending;
        let run_id = result.run_id.clone();
        let log = EventLog::new();

        let span = tracing::info_span!("migration", run_id = %run_id);
        let _guard = span.enter();

        let started = Instant::now();
        let deadline = options.timeout.map(|t| started + t);

        self.emit(
            &log,
            &run_id,
            EventKind::Started {
                total_count: input.test_case_ids.len() as u32,
            },
        );
        self.set_status(&mut result, &log, MigrationStatus::Validating);

        let source_caps = self.source.get_capabilities();
        let target_caps = self.target.get_capabilities();
        let possibility = validator::validate_migration_possibility(
            &source_caps,
            &target_caps,
            &self.target.get_fields(),
            options,
        );
        if self.collect_issues(&mut result, possibility, options.validation_level) {
            return self.fail_pre_run(result, &log, "pre-flight capability validation failed");
        }

        let source_contract = self.source.get_api_contract().unwrap_or_default();
        let target_contract = self.target.get_api_contract().unwrap_or_default();
        let ops = plan::build_plan_with_contracts(input, &source_contract, &target_contract);
        let plan_id = plan::compute_plan_id(&ops);
        tracing::info!(%plan_id, operations = ops.len(), "plan built");

        let graph = match migrator_graph::build_dependency_graph(&ops) {
            Ok(graph) => graph,
            Err(err) => {
                result.errors.push(MigrationError::new(
                    "GRAPH_INVALID",
                    ErrorKind::GraphInvalid,
                    err.to_string(),
                ));
                return self.fail_pre_run(result, &log, "operation graph construction failed");
            }
        };
        let report = migrator_graph::validate_dependencies(&graph);
        if !report.valid {
            result.errors.push(
                MigrationError::new(
                    "GRAPH_INVALID",
                    ErrorKind::GraphInvalid,
                    format!("operation graph is invalid: {}", report.errors.join("; ")),
                )
                .with_details(serde_json::json!({ "unreachable": report.unreachable })),
            );
            return self.fail_pre_run(result, &log, "operation graph validation failed");
        }
        let ordered = migrator_graph::resolve_execution_order(&graph);

        let definitions: BTreeMap<OperationType, OperationDefinition> = ops
            .iter()
            .map(|o| (o.operation_type.clone(), o.clone()))
            .collect();
        let executables = self.build_executables(input);
        let mut context = OperationContext::new(&run_id, &input.project_key);
        let op_retry = operation_retry_config(options);

        for op_type in &ordered {
            if op_type.as_str() == plan::CREATE_TEST_CASE {
                continue;
            }
            let def = &definitions[op_type];
            let Some(executable) = executables.get(op_type) else {
                tracing::debug!(operation = %op_type, "no executable bound, skipping contract operation");
                continue;
            };
            tracing::debug!(operation = %op_type, "executing operation");
            let outcome =
                executor::execute_operation(def, executable.as_ref(), &mut context, &op_retry);
            if !outcome.success {
                let mut error = outcome.error.unwrap_or_else(|| {
                    MigrationError::new(
                        "OPERATION_FAILED",
                        ErrorKind::Transient,
                        format!("operation '{op_type}' failed"),
                    )
                });
                if op_type.as_str().starts_with("authenticate") {
                    error.code = "CONNECTION_FAILED".into();
                    error.kind = ErrorKind::Connectivity;
                }
                result.errors.push(error);
                return self.fail_pre_run(result, &log, "upstream operation failed");
            }
        }

        let cases: Vec<TestCase> = if input.test_case_ids.is_empty() {
            context
                .results
                .get::<Vec<TestCase>>(&OperationType::from(plan::GET_TEST_CASES))
                .map(Vec::clone)
                .map_err(|e| anyhow::anyhow!("bulk fetch produced no result: {e}"))?
        } else {
            let mut fetched = Vec::with_capacity(input.test_case_ids.len());
            for id in &input.test_case_ids {
                let case = context
                    .results
                    .get::<TestCase>(&plan::get_test_case_op(id))
                    .map_err(|e| anyhow::anyhow!("fetch for '{id}' produced no result: {e}"))?;
                fetched.push(case.clone());
            }
            fetched
        };

        result.total_count = cases.len() as u32;
        self.emit(
            &log,
            &run_id,
            EventKind::TestCasesLoaded {
                count: cases.len() as u32,
            },
        );

        let issues = validator::validate_migration(
            &cases,
            &self.source.get_fields(),
            &self.target.get_fields(),
            &target_caps,
            options,
        );
        if self.collect_issues(&mut result, issues, options.validation_level) {
            return self.fail_pre_run(result, &log, "pre-flight field validation failed");
        }

        self.set_status(&mut result, &log, MigrationStatus::Running);

        if options.dry_run {
            return Ok(self.run_dry(input, &cases, result, &log));
        }

        let mut txn_id: Option<String> = None;
        if options.transaction_mode == TransactionMode::Atomic {
            if target_caps.supports_transactions {
                match self.target.begin_transaction() {
                    Ok(id) => {
                        tracing::info!(txn_id = %id, "target transaction opened");
                        txn_id = Some(id);
                    }
                    Err(err) => {
                        result.errors.push(MigrationError::new(
                            "TRANSACTION_BEGIN_FAILED",
                            ErrorKind::Transaction,
                            format!("failed to begin target transaction: {err:#}"),
                        ));
                        return self.fail_pre_run(result, &log, "transaction begin failed");
                    }
                }
            } else {
                result.errors.push(MigrationError::warning(
                    "TRANSACTIONS_UNSUPPORTED",
                    ErrorKind::CapabilityMissing,
                    "transactionMode 'atomic' requested but the target has no transaction \
                     support; continuing in 'independent' mode",
                ));
            }
        }

        let batch_size = options.batch_size.max(1);
        let item_retry = item_retry_config(options);
        let mut aborted = false;
        let mut cancelled = false;

        'batches: for (batch_index, batch) in cases.chunks(batch_size).enumerate() {
            for case in batch {
                if let Some(deadline) = deadline
                    && Instant::now() >= deadline
                {
                    result.errors.push(MigrationError::new(
                        "TIMEOUT",
                        ErrorKind::Transient,
                        format!(
                            "run exceeded its configured timeout of {}",
                            humantime::format_duration(options.timeout.unwrap_or_default())
                        ),
                    ));
                    self.control.cancel();
                }
                match self.checkpoint(&mut result, &log) {
                    Gate::Cancelled => {
                        cancelled = true;
                        break 'batches;
                    }
                    Gate::Proceed => {}
                }
                if processed.contains(&case.id) {
                    continue;
                }

                let item_span = tracing::info_span!("test_case", id = %case.id);
                let _item_guard = item_span.enter();
                let detail = pipeline::process_test_case(
                    self.source.as_ref(),
                    self.target.as_ref(),
                    &input.project_key,
                    case.clone(),
                    options,
                    item_retry.clone(),
                );
                processed.insert(case.id.clone());
                let failed = detail.status == ItemStatus::Failed;
                self.record_item(&mut result, &log, case, detail, options);
                if failed && !options.continue_on_error {
                    aborted = true;
                    break 'batches;
                }
            }
            self.emit(
                &log,
                &run_id,
                EventKind::BatchCompleted {
                    batch_index,
                    batch_size: batch.len(),
                },
            );
            self.persist_snapshot(&result, &processed);
        }

        // An interrupted run still buckets every source id exactly once:
        // unprocessed items land in `skipped` so the three counters sum to
        // the total at terminal status.
        if aborted || cancelled {
            let reason = if cancelled {
                "run cancelled before this item was processed"
            } else {
                "run aborted before this item was processed"
            };
            for case in &cases {
                if processed.contains(&case.id) {
                    continue;
                }
                processed.insert(case.id.clone());
                let detail = TestCaseDetail {
                    source_id: case.id.clone(),
                    target_id: None,
                    name: case.name.clone(),
                    status: ItemStatus::Skipped,
                    retry_count: 0,
                    error: None,
                    warnings: vec![
                        MigrationError::warning("NOT_PROCESSED", ErrorKind::ItemFailure, reason)
                            .with_test_case_id(case.id.clone()),
                    ],
                    transformations_applied: Vec::new(),
                    transformations_skipped: 0,
                    transformations_failed: 0,
                    attachments_migrated: 0,
                    attachments_failed: 0,
                    history_migrated: false,
                };
                self.record_item(&mut result, &log, case, detail, options);
            }
        }

        let mut final_status = if cancelled {
            MigrationStatus::Cancelled
        } else if result.failed_count == 0 {
            MigrationStatus::Completed
        } else if result.migrated_count > 0 {
            MigrationStatus::PartiallyCompleted
        } else {
            MigrationStatus::Failed
        };

        if let Some(txn) = txn_id {
            final_status = self.finalize_transaction(&mut result, &log, &txn, final_status);
        }

        self.set_status(&mut result, &log, final_status);
        match final_status {
            MigrationStatus::Cancelled => self.emit(&log, &run_id, EventKind::Cancelled),
            MigrationStatus::Failed | MigrationStatus::RollbackFailed => {
                let error = first_error(&result).unwrap_or_else(|| {
                    MigrationError::new("RUN_FAILED", ErrorKind::ItemFailure, "migration failed")
                });
                self.emit(&log, &run_id, EventKind::Failed { error });
            }
            status => self.emit(&log, &run_id, EventKind::Completed { status }),
        }
        result.finished_at = Some(Utc::now());
        self.persist_terminal(&result, &log);
        Ok(result)
    }

    /// A dry run walks the same mapping and transformation stages as a
    /// real run but never touches the target; every item counts as
    /// migrated so callers can preview the final tallies.
    fn run_dry(
        &self,
        input: &MigrateTestCasesInput,
        cases: &[TestCase],
        mut result: MigrationResult,
        log: &EventLog,
    ) -> MigrationResult {
        let options = &input.options;
        result.errors.push(MigrationError::warning(
            "DRY_RUN",
            ErrorKind::Validation,
            "dry run: writes were simulated, nothing was created in the target",
        ));
        for case in cases {
            let mut staged = case.clone();
            migrator_transform::apply_field_mappings(&mut staged, &options.field_mappings);
            let outcome =
                migrator_transform::apply_transformations(&mut staged, &options.field_transformations);
            let detail = TestCaseDetail {
                source_id: case.id.clone(),
                target_id: None,
                name: case.name.clone(),
                status: ItemStatus::Migrated,
                retry_count: 0,
                error: None,
                warnings: Vec::new(),
                transformations_applied: outcome.applied,
                transformations_skipped: outcome.skipped.len() as u32,
                transformations_failed: outcome.failed.len() as u32,
                attachments_migrated: 0,
                attachments_failed: 0,
                history_migrated: false,
            };
            self.record_item(&mut result, log, case, detail, options);
        }
        self.set_status(&mut result, log, MigrationStatus::Completed);
        self.emit(
            log,
            &result.run_id.clone(),
            EventKind::Completed {
                status: MigrationStatus::Completed,
            },
        );
        result.finished_at = Some(Utc::now());
        self.persist_terminal(&result, log);
        result
    }

    fn build_executables(
        &self,
        input: &MigrateTestCasesInput,
    ) -> BTreeMap<OperationType, Box<dyn OperationExecutable>> {
        let mut map: BTreeMap<OperationType, Box<dyn OperationExecutable>> = BTreeMap::new();

        let source = Arc::clone(&self.source);
        map.insert(
            OperationType::from(plan::AUTHENTICATE_SOURCE),
            boxed(move |_ctx: &OperationContext| {
                let status = source.test_connection()?;
                if !status.connected {
                    bail!("source connection failed: {}", status.message);
                }
                Ok(erase(status))
            }),
        );

        let target = Arc::clone(&self.target);
        map.insert(
            OperationType::from(plan::AUTHENTICATE_TARGET),
            boxed(move |_ctx: &OperationContext| {
                let status = target.test_connection()?;
                if !status.connected {
                    bail!("target connection failed: {}", status.message);
                }
                Ok(erase(status))
            }),
        );

        let source = Arc::clone(&self.source);
        map.insert(
            OperationType::from(plan::GET_SOURCE_PROJECT),
            boxed(move |ctx: &OperationContext| Ok(erase(source.get_project(&ctx.project_key)?))),
        );

        let target = Arc::clone(&self.target);
        map.insert(
            OperationType::from(plan::GET_TARGET_PROJECT),
            boxed(move |ctx: &OperationContext| Ok(erase(target.get_project(&ctx.project_key)?))),
        );

        if input.test_case_ids.is_empty() {
            let source = Arc::clone(&self.source);
            let filters = input.options.filters.clone();
            map.insert(
                OperationType::from(plan::GET_TEST_CASES),
                boxed(move |ctx: &OperationContext| {
                    let cases = match &filters {
                        Some(filter) => source.get_filtered_test_cases(&ctx.project_key, filter)?,
                        None => source.get_test_cases(&ctx.project_key)?,
                    };
                    Ok(erase(cases))
                }),
            );
        } else {
            for id in &input.test_case_ids {
                let source = Arc::clone(&self.source);
                let test_case_id = id.clone();
                map.insert(
                    plan::get_test_case_op(id),
                    boxed(move |ctx: &OperationContext| {
                        Ok(erase(source.get_test_case(&ctx.project_key, &test_case_id)?))
                    }),
                );

                if input.options.include_attachments {
                    let source = Arc::clone(&self.source);
                    let test_case_id = id.clone();
                    map.insert(
                        plan::get_attachments_op(id),
                        boxed(move |_ctx: &OperationContext| {
                            Ok(erase(source.get_test_case_attachments(&test_case_id)?))
                        }),
                    );
                }
            }
        }

        map
    }

    /// Observes pause/cancel at an item boundary. Blocks while paused,
    /// without busy-polling, until a resume or cancel signal arrives.
    fn checkpoint(&self, result: &mut MigrationResult, log: &EventLog) -> Gate {
        {
            let signals = self.control.inner.signals.lock().unwrap();
            if signals.cancelled {
                return Gate::Cancelled;
            }
            if !signals.paused {
                return Gate::Proceed;
            }
        }

        let reason = self.control.inner.signals.lock().unwrap().pause_reason.clone();
        let run_id = result.run_id.clone();
        self.emit(log, &run_id, EventKind::Paused { reason });
        self.set_status(result, log, MigrationStatus::Paused);
        tracing::info!("run paused, waiting for resume");

        let mut signals = self.control.inner.signals.lock().unwrap();
        while signals.paused && !signals.cancelled {
            signals = self.control.inner.condvar.wait(signals).unwrap();
        }
        let cancelled = signals.cancelled;
        drop(signals);

        if cancelled {
            return Gate::Cancelled;
        }
        self.emit(log, &run_id, EventKind::Resumed);
        self.set_status(result, log, MigrationStatus::Running);
        Gate::Proceed
    }

    /// Folds one finished item into the result: buckets, counters, the
    /// summary breakdowns, and the progress/processed events.
    fn record_item(
        &self,
        result: &mut MigrationResult,
        log: &EventLog,
        case: &TestCase,
        detail: TestCaseDetail,
        options: &MigrationOptions,
    ) {
        result.summary.record_status(case.status);
        result.summary.record_priority(case.priority);
        result.summary.transformations_applied += detail.transformations_applied.len() as u32;
        result.summary.transformations_skipped += detail.transformations_skipped;
        result.summary.transformations_failed += detail.transformations_failed;
        if options.include_attachments {
            result.summary.attachment_stats.total +=
                detail.attachments_migrated + detail.attachments_failed;
            result.summary.attachment_stats.migrated += detail.attachments_migrated;
            result.summary.attachment_stats.failed += detail.attachments_failed;
        }
        if options.include_history && detail.status == ItemStatus::Migrated {
            result.summary.history_stats.total += 1;
            if detail.history_migrated {
                result.summary.history_stats.migrated += 1;
            } else {
                result.summary.history_stats.failed += 1;
            }
        }
        result.errors.extend(detail.warnings.iter().cloned());

        let status = detail.status;
        let source_id = detail.source_id.clone();
        match status {
            ItemStatus::Skipped => {
                result.skipped_count += 1;
                result.skipped.push(detail);
            }
            ItemStatus::Failed => {
                result.failed_count += 1;
                if let Some(error) = detail.error.clone() {
                    result.errors.push(error);
                }
                result.failed.push(detail);
            }
            _ => {
                result.migrated_count += 1;
                result.migrated.push(detail);
            }
        }
        result.recompute_progress();

        let run_id = result.run_id.clone();
        self.emit(log, &run_id, EventKind::TestCaseProcessed { source_id, status });
        self.emit(
            log,
            &run_id,
            EventKind::ProgressUpdated {
                progress: result.progress,
            },
        );
    }

    fn finalize_transaction(
        &self,
        result: &mut MigrationResult,
        log: &EventLog,
        txn_id: &str,
        final_status: MigrationStatus,
    ) -> MigrationStatus {
        if final_status == MigrationStatus::Completed {
            match self.target.commit_transaction(txn_id) {
                Ok(()) => return final_status,
                Err(err) => {
                    result.errors.push(MigrationError::new(
                        "TRANSACTION_COMMIT_FAILED",
                        ErrorKind::Transaction,
                        format!("failed to commit target transaction: {err:#}"),
                    ));
                }
            }
        }
        self.set_status(result, log, MigrationStatus::RollbackInProgress);
        tracing::warn!(%txn_id, "rolling back target transaction");
        match self.target.rollback_transaction(txn_id) {
            Ok(()) => MigrationStatus::RollbackCompleted,
            Err(err) => {
                result.errors.push(MigrationError::new(
                    "TRANSACTION_ROLLBACK_FAILED",
                    ErrorKind::Transaction,
                    format!("failed to roll back target transaction: {err:#}"),
                ));
                MigrationStatus::RollbackFailed
            }
        }
    }

    /// Demotes what the validation level allows, records everything, and
    /// reports whether any error-severity issue remains.
    fn collect_issues(
        &self,
        result: &mut MigrationResult,
        issues: Vec<MigrationError>,
        level: ValidationLevel,
    ) -> bool {
        let mut fatal = false;
        for mut issue in issues {
            if level != ValidationLevel::Strict && issue.kind == ErrorKind::CapabilityMissing {
                issue.severity = Severity::Warning;
            }
            if !issue.is_warning() {
                fatal = true;
            }
            result.errors.push(issue);
        }
        fatal
    }

    fn fail_pre_run(
        &self,
        mut result: MigrationResult,
        log: &EventLog,
        message: &str,
    ) -> Result<MigrationResult> {
        tracing::error!(run_id = %result.run_id, "{message}");
        let error = first_error(&result).unwrap_or_else(|| {
            MigrationError::new("RUN_FAILED", ErrorKind::Validation, message)
        });
        self.set_status(&mut result, log, MigrationStatus::Failed);
        self.emit(log, &result.run_id.clone(), EventKind::Failed { error });
        result.finished_at = Some(Utc::now());
        self.persist_terminal(&result, log);
        Ok(result)
    }

    fn set_status(&self, result: &mut MigrationResult, log: &EventLog, status: MigrationStatus) {
        if result.status == status {
            return;
        }
        result.status = status;
        self.emit(
            log,
            &result.run_id.clone(),
            EventKind::StatusChanged { status },
        );
    }

    fn emit(&self, log: &EventLog, run_id: &str, kind: EventKind) {
        let event = MigrationEvent::new(run_id, kind);
        log.record(event.clone());
        self.bus.publish(&event);
    }

    fn persist_snapshot(&self, result: &MigrationResult, processed: &BTreeSet<String>) {
        let Some(dir) = &self.state_dir else { return };
        let snapshot = RunState {
            schema_version: state::CURRENT_STATE_VERSION.to_string(),
            result: result.clone(),
            processed_source_ids: processed.clone(),
        };
        if let Err(err) = state::save_state(dir, &snapshot) {
            tracing::warn!(error = %err, "failed to persist run state at batch boundary");
        }
    }

    fn persist_terminal(&self, result: &MigrationResult, log: &EventLog) {
        let Some(dir) = &self.state_dir else { return };
        let processed: BTreeSet<String> = result
            .migrated
            .iter()
            .chain(&result.skipped)
            .chain(&result.failed)
            .map(|d| d.source_id.clone())
            .collect();
        self.persist_snapshot(result, &processed);
        let receipt = Receipt {
            receipt_version: state::CURRENT_RECEIPT_VERSION.to_string(),
            run_id: result.run_id.clone(),
            status: result.status,
            result: result.clone(),
        };
        if let Err(err) = state::write_receipt(dir, &receipt) {
            tracing::warn!(error = %err, "failed to write run receipt");
        }
        if let Err(err) = log.write_to_file(&migrator_events::events_path(dir)) {
            tracing::warn!(error = %err, "failed to write event log");
        }
    }
}

fn boxed<F>(f: F) -> Box<dyn OperationExecutable>
where
    F: Fn(&OperationContext) -> anyhow::Result<Box<dyn std::any::Any + Send + Sync>>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

fn erase<T: Send + Sync + 'static>(value: T) -> Box<dyn std::any::Any + Send + Sync> {
    Box::new(value)
}

fn first_error(result: &MigrationResult) -> Option<MigrationError> {
    result.errors.iter().find(|e| !e.is_warning()).cloned()
}

fn validate_input(input: &MigrateTestCasesInput) -> Result<()> {
    if input.source_system_id == input.target_system_id {
        bail!(
            "source and target systems must differ (both are '{}')",
            input.source_system_id
        );
    }
    if input.project_key.trim().is_empty() {
        bail!("projectKey must not be empty");
    }
    if input.options.batch_size == 0 {
        bail!("batchSize must be at least 1");
    }
    Ok(())
}

/// Graph operations back off exponentially from `retryDelayMs`, capped.
fn operation_retry_config(options: &MigrationOptions) -> RetryStrategyConfig {
    RetryStrategyConfig {
        strategy: RetryStrategyType::Exponential,
        max_attempts: options.max_retries.max(1),
        base_delay: options.retry_delay,
        max_delay: Duration::from_secs(30),
        jitter: 0.0,
    }
}

/// Per-item creates get `maxRetries` retries on top of the first attempt,
/// spaced by a constant `retryDelayMs`.
fn item_retry_config(options: &MigrationOptions) -> RetryStrategyConfig {
    RetryStrategyConfig {
        strategy: RetryStrategyType::Constant,
        max_attempts: options.max_retries + 1,
        base_delay: options.retry_delay,
        max_delay: options.retry_delay,
        jitter: 0.0,
    }
}

fn generate_run_id() -> String {
    format!(
        "run-{}-{:04x}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        rand::random::<u16>()
    )
}
