use serde::{Deserialize, Serialize};

/// Severity of a [`MigrationError`]. Warnings are always collected and
/// never abort a run; errors may or may not, depending on kind and
/// `continueOnError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// The nine error kinds recognized by the core. A kind, not a type
/// hierarchy: every [`MigrationError`] carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing/invalid input (e.g. `batchSize <= 0`, source == target). Fatal, pre-run.
    Configuration,
    /// Requested provider id is unknown. Fatal, pre-run.
    ProviderNotFound,
    /// `testConnection`/`validateConnection` failed. Fatal, pre-run.
    Connectivity,
    /// Required feature unavailable on one side. Fatal at `strict`, warning at `lenient`.
    CapabilityMissing,
    /// Missing dependency, cycle, or unreachable node in the operation graph. Fatal, pre-run.
    GraphInvalid,
    /// Network, rate-limit, timeout. Retried up to `maxRetries`; becomes `ItemFailure` on exhaustion.
    Transient,
    /// Transformation, create, attachment, or history call failed for one item.
    ItemFailure,
    /// Transaction begin/commit/rollback failure.
    Transaction,
    /// Pre-flight or per-item schema/value violation; behavior per `validationLevel`.
    Validation,
}

/// A single user-visible error or warning, carrying enough structure for a
/// UI to render it and enough identity for a test to assert on it.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct MigrationError {
    /// Stable machine-readable code, e.g. `"INCOMPATIBLE_FIELD_TYPE"`.
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl MigrationError {
    pub fn new(code: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind,
            message: message.into(),
            severity: Severity::Error,
            field: None,
            test_case_id: None,
            details: None,
        }
    }

    pub fn warning(code: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind,
            message: message.into(),
            severity: Severity::Warning,
            field: None,
            test_case_id: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_test_case_id(mut self, id: impl Into<String>) -> Self {
        self.test_case_id = Some(id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}
