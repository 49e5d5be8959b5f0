//! # Migrator
//!
//! An operation-graph scheduler with lifecycle control for moving test
//! artifacts (test cases, attachments, change history) between two
//! pluggable test-management systems.
//!
//! Given a source provider, a target provider, and a migration request,
//! the library discovers the operations required to move the data,
//! resolves their dependency order, executes them with bounded retries,
//! and surfaces live progress so an external monitor can watch and steer
//! the run.
//!
//! ## Features
//!
//! - **Deterministic planning** — the same request always produces the
//!   same operation plan and the same execution order, identified by a
//!   SHA-256 plan id.
//! - **Cycle-safe scheduling** — provider-declared operations join the
//!   dependency graph; cycles, dangling references, and unreachable
//!   operations are rejected before anything side-effecting runs.
//! - **Bounded retries** — transient failures back off and retry at both
//!   the operation and the per-test-case level, with per-operation
//!   overrides.
//! - **Cooperative lifecycle control** — pause, resume, and cancel from
//!   any thread through a [`controller::ControlHandle`]; signals are
//!   observed at item boundaries so target-side state stays well-defined.
//! - **Optional transactional isolation** — in `atomic` mode all target
//!   writes ride one target-side transaction, committed on success and
//!   rolled back on failure or cancellation.
//! - **Resumable execution** — run state persists at batch boundaries;
//!   an interrupted run continues from the first unprocessed item.
//! - **Evidence capture** — a receipt and an append-only JSONL event log
//!   record what every run actually did.
//!
//! ## Pipeline
//!
//! The core flow is **validate → plan → resolve → execute**:
//!
//! 1. [`validator`] checks capability and field compatibility between the
//!    two providers before anything side-effecting runs.
//! 2. [`plan::build_plan`] turns the request (plus the providers' API
//!    contracts) into concrete operation definitions.
//! 3. `migrator-graph` orders them, rejecting cycles and dangling
//!    references.
//! 4. [`executor`] runs the ordered operations, publishing each result
//!    into the shared context; the terminal create operation hands each
//!    test case to [`pipeline::process_test_case`].
//!
//! [`controller::MigrationController`] owns that whole sequence plus the
//! lifecycle state machine around it.
//!
//! ## Modules
//!
//! - [`controller`] — run lifecycle, batching, pause/resume/cancel,
//!   transactions
//! - [`executor`] — ordered operation execution with retries and
//!   level-parallel fan-out
//! - [`pipeline`] — per-test-case map → transform → create → attachments
//!   → history
//! - [`plan`] — operation plan construction from request and contracts
//! - [`validator`] — pre-flight capability and field compatibility checks
//! - [`config`] — `.migrator.toml` defaults merged under explicit options
//! - [`logging`] — `tracing` subscriber setup
//!
//! For command-line usage, see the `migrator-cli` crate.

/// `.migrator.toml` loading and option-default merging.
pub mod config;

/// Run lifecycle, batching, pause/resume/cancel, and transactions.
pub mod controller;

/// Ordered operation execution with retries and level-parallel fan-out.
pub mod executor;

/// Structured logging setup.
pub mod logging;

/// Per-test-case processing: map, transform, create, attachments, history.
pub mod pipeline;

/// Operation plan construction from the request and provider contracts.
pub mod plan;

/// Pre-flight capability and field compatibility validation.
pub mod validator;

pub use controller::{ControlHandle, MigrationController, PauseReason};
pub use executor::{OperationExecutable, OperationOutcome};

/// Dependency graph and execution ordering.
/// Re-exported from the migrator-graph crate.
pub use migrator_graph as graph;

/// Configurable retry strategies with backoff and jitter.
/// Re-exported from the migrator-retry crate.
pub use migrator_retry as retry;

/// Field mapping and transformation engine.
/// Re-exported from the migrator-transform crate.
pub use migrator_transform as transform;
