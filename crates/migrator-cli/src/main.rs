use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use migrator::config::MigratorConfig;
use migrator::controller::MigrationController;
use migrator::graph;
use migrator::plan;
use migrator_events::Subscriber;
use migrator_providers::mock::{MockSourceProvider, MockTargetProvider};
use migrator_types::{
    Attachment, EventKind, HistoryEntry, MigrateTestCasesInput, MigrationEvent, MigrationResult,
    MigrationStatus, TestCase,
};

#[derive(Parser, Debug)]
#[command(name = "migrator", version)]
#[command(about = "Operation-graph migration of test cases between test-management systems")]
struct Cli {
    /// Path to the migration request JSON (a MigrateTestCasesInput document).
    #[arg(long, default_value = "migration.json")]
    input: PathBuf,

    /// Path to a source fixture JSON backing the in-memory source provider.
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Directory for run state, the receipt, and the event log.
    #[arg(long, default_value = ".migrator")]
    state_dir: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the deterministic operation plan (dependency-first ordering).
    Plan,
    /// Run pre-flight validation without migrating anything.
    Validate,
    /// Execute the migration.
    Migrate,
    /// Continue a previously-interrupted run from its saved state.
    Resume,
    /// Show the last run's persisted state and receipt.
    Status,
}

/// Source-side fixture: the test cases (plus optional attachments and
/// history keyed by test-case id) the in-memory provider serves up.
#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    test_cases: Vec<TestCase>,
    #[serde(default)]
    attachments: BTreeMap<String, Vec<Attachment>>,
    #[serde(default)]
    history: BTreeMap<String, Vec<HistoryEntry>>,
}

/// Bridges the event bus to the terminal: one line per lifecycle event,
/// prefixed the same way the rest of the CLI logs.
struct CliSubscriber;

impl Subscriber for CliSubscriber {
    fn on_event(&self, event: &MigrationEvent) {
        match &event.kind {
            EventKind::Started { total_count } => {
                eprintln!("[info] {}: started ({total_count} requested)", event.run_id);
            }
            EventKind::StatusChanged { status } => {
                eprintln!("[info] {}: status -> {status:?}", event.run_id);
            }
            EventKind::ProgressUpdated { progress } => {
                eprintln!("[info] {}: {progress}%", event.run_id);
            }
            EventKind::TestCasesLoaded { count } => {
                eprintln!("[info] {}: {count} test case(s) loaded", event.run_id);
            }
            EventKind::BatchCompleted { batch_index, batch_size } => {
                eprintln!(
                    "[info] {}: batch {} done ({batch_size} item(s))",
                    event.run_id,
                    batch_index + 1
                );
            }
            EventKind::TestCaseProcessed { source_id, status } => {
                eprintln!("[info] {}: {source_id} -> {status:?}", event.run_id);
            }
            EventKind::Paused { reason } => {
                let reason = reason.as_deref().unwrap_or("unspecified");
                eprintln!("[warn] {}: paused ({reason})", event.run_id);
            }
            EventKind::Resumed => eprintln!("[info] {}: resumed", event.run_id),
            EventKind::Cancelled => eprintln!("[warn] {}: cancelled", event.run_id),
            EventKind::Completed { status } => {
                eprintln!("[info] {}: finished ({status:?})", event.run_id);
            }
            EventKind::Failed { error } => {
                eprintln!("[error] {}: {error}", event.run_id);
            }
        }
    }
}

fn main() -> Result<()> {
    migrator::logging::init();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Plan => {
            let input = load_input(&cli.input)?;
            print_plan(&input);
        }
        Commands::Validate => {
            let input = load_input(&cli.input)?;
            let fixture = load_fixture(cli.fixture.as_deref())?;
            run_validate(&input, fixture)?;
        }
        Commands::Migrate => {
            let input = load_input(&cli.input)?;
            let fixture = load_fixture(cli.fixture.as_deref())?;
            let result = run_migrate(&input, fixture, &cli.state_dir, false)?;
            print_result(&result, &cli.state_dir);
            exit_code_for(&result)?;
        }
        Commands::Resume => {
            let input = load_input(&cli.input)?;
            let fixture = load_fixture(cli.fixture.as_deref())?;
            let result = run_migrate(&input, fixture, &cli.state_dir, true)?;
            print_result(&result, &cli.state_dir);
            exit_code_for(&result)?;
        }
        Commands::Status => {
            run_status(&cli.state_dir)?;
        }
    }

    Ok(())
}

fn load_input(path: &Path) -> Result<MigrateTestCasesInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read migration request {}", path.display()))?;
    let mut input: MigrateTestCasesInput = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse migration request {}", path.display()))?;
    if let Some(config) = MigratorConfig::load_from_workspace(Path::new("."))? {
        config.apply_defaults(&mut input.options);
    }
    Ok(input)
}

fn load_fixture(path: Option<&Path>) -> Result<Fixture> {
    let Some(path) = path else {
        return Ok(Fixture::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse fixture {}", path.display()))
}

fn build_source(fixture: Fixture, project_key: &str) -> MockSourceProvider {
    let mut source = MockSourceProvider::new(project_key);
    for case in fixture.test_cases {
        source = source.with_test_case(case);
    }
    for (id, attachments) in fixture.attachments {
        source = source.with_attachments(id, attachments);
    }
    for (id, history) in fixture.history {
        source = source.with_history(id, history);
    }
    source
}

fn print_plan(input: &MigrateTestCasesInput) {
    let ops = plan::build_plan(input);
    let plan_id = plan::compute_plan_id(&ops);
    println!("plan_id: {plan_id}");
    println!("project: {}", input.project_key);
    println!();

    let ordered = match graph::build_dependency_graph(&ops) {
        Ok(g) => graph::resolve_execution_order(&g),
        Err(_) => Vec::new(),
    };
    for (idx, op_type) in ordered.iter().enumerate() {
        let def = ops.iter().find(|o| &o.operation_type == op_type);
        let deps = def
            .map(|d| {
                d.depends_on
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        if deps.is_empty() {
            println!("{:>3}. {op_type}", idx + 1);
        } else {
            println!("{:>3}. {op_type}  (after: {deps})", idx + 1);
        }
    }
}

fn run_validate(input: &MigrateTestCasesInput, fixture: Fixture) -> Result<()> {
    let source = build_source(fixture, &input.project_key);
    let target = MockTargetProvider::new(&input.project_key);

    use migrator_providers::{SourceProvider, TargetProvider};
    let mut issues = migrator::validator::validate_migration_possibility(
        &SourceProvider::get_capabilities(&source),
        &TargetProvider::get_capabilities(&target),
        &TargetProvider::get_fields(&target),
        &input.options,
    );
    let cases = source.get_test_cases(&input.project_key)?;
    issues.extend(migrator::validator::validate_migration(
        &cases,
        &SourceProvider::get_fields(&source),
        &TargetProvider::get_fields(&target),
        &TargetProvider::get_capabilities(&target),
        &input.options,
    ));

    if issues.is_empty() {
        println!("validation passed: no issues");
        return Ok(());
    }
    let mut errors = 0;
    for issue in &issues {
        let level = if issue.is_warning() { "warn" } else { "error" };
        if !issue.is_warning() {
            errors += 1;
        }
        println!("[{level}] {issue}");
    }
    if errors > 0 {
        bail!("validation found {errors} error(s)");
    }
    Ok(())
}

fn run_migrate(
    input: &MigrateTestCasesInput,
    fixture: Fixture,
    state_dir: &Path,
    resume: bool,
) -> Result<MigrationResult> {
    let source = build_source(fixture, &input.project_key);
    let target = MockTargetProvider::new(&input.project_key);
    let mut controller = MigrationController::new(Arc::new(source), Arc::new(target))
        .with_state_dir(state_dir);
    controller.subscribe(Box::new(CliSubscriber));

    if resume {
        controller.resume(input)
    } else {
        controller.run(input)
    }
}

fn print_result(result: &MigrationResult, state_dir: &Path) {
    println!("run_id:  {}", result.run_id);
    println!("status:  {:?}", result.status);
    println!(
        "counts:  {} migrated, {} skipped, {} failed of {}",
        result.migrated_count, result.skipped_count, result.failed_count, result.total_count
    );
    println!("state:   {}", migrator_state::state_path(state_dir).display());
    println!("receipt: {}", migrator_state::receipt_path(state_dir).display());
    println!();

    for detail in &result.migrated {
        let target_id = detail.target_id.as_deref().unwrap_or("-");
        println!(
            "{} -> {target_id} ({:?}, retries={})",
            detail.source_id, detail.status, detail.retry_count
        );
    }
    for detail in result.skipped.iter().chain(&result.failed) {
        println!("{} ({:?})", detail.source_id, detail.status);
    }

    let errors: Vec<_> = result.errors.iter().filter(|e| !e.is_warning()).collect();
    if !errors.is_empty() {
        println!();
        for error in errors {
            println!("[error] {error}");
        }
    }
}

fn exit_code_for(result: &MigrationResult) -> Result<()> {
    match result.status {
        MigrationStatus::Failed | MigrationStatus::RollbackFailed => {
            bail!("migration finished with status {:?}", result.status)
        }
        _ => Ok(()),
    }
}

fn run_status(state_dir: &Path) -> Result<()> {
    match migrator_state::load_state(state_dir)? {
        Some(state) => {
            println!("run_id:   {}", state.result.run_id);
            println!("status:   {:?}", state.result.status);
            println!("progress: {}%", state.result.progress);
            println!(
                "counts:   {} migrated, {} skipped, {} failed of {}",
                state.result.migrated_count,
                state.result.skipped_count,
                state.result.failed_count,
                state.result.total_count
            );
        }
        None => println!("no run state in {}", state_dir.display()),
    }

    match migrator_state::load_receipt(state_dir)? {
        Some(receipt) => {
            println!("receipt:  {:?} ({})", receipt.status, receipt.receipt_version);
        }
        None => {
            if migrator_state::has_incomplete_state(state_dir) {
                println!("receipt:  none (run interrupted — `migrator resume` can continue it)");
            }
        }
    }
    Ok(())
}
