//! # migrator-types
//!
//! Core domain types for the test-case migration execution core: the
//! `TestCase`/`Attachment`/`HistoryEntry` data model, operation metadata,
//! the migration request/result/status types, the error taxonomy, and
//! event payloads.
//!
//! Nothing in this crate is side-effecting — it is pure data, shared by
//! every other crate in the workspace so they agree on one vocabulary.

pub mod error;
pub mod events;
pub mod operation;
pub mod options;
pub mod result;
pub mod testcase;
pub mod transform_spec;

pub use error::{ErrorKind, MigrationError, Severity};
pub use events::{EventKind, MigrationEvent};
pub use operation::{OperationDefinition, OperationType, RetryOverride};
pub use options::{
    MigrateTestCasesInput, MigrationOptions, TestCaseFilter, TransactionMode, ValidationLevel,
};
pub use result::{
    AttachmentStats, HistoryStats, ItemStatus, MigrationResult, MigrationStatus,
    MigrationSummary, TestCaseDetail,
};
pub use testcase::{Attachment, HistoryEntry, TestCase, TestCasePriority, TestCaseStatus, TestStep};
pub use transform_spec::{AtomicTransformation, FieldTransformation};
