use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable type tag for an operation (e.g. `"authenticate_source"`,
/// `"get_test_case_TC-1"`). Cheap to hash, compare, and clone — it is the
/// key used everywhere an operation needs to be referenced by name: graph
/// nodes, `OperationContext::results`, dependency lists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationType(pub String);

impl OperationType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OperationType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OperationType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pure metadata describing an operation: its type tag, human name, the
/// operations it depends on, and the context inputs it requires. Safe to
/// hash and compare; nothing here is side-effecting, unlike the runtime
/// half an executor pairs it with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub operation_type: OperationType,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<OperationType>,
    #[serde(default)]
    pub required_params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_override: Option<RetryOverride>,
}

impl OperationDefinition {
    pub fn new(operation_type: impl Into<OperationType>, name: impl Into<String>) -> Self {
        Self {
            operation_type: operation_type.into(),
            name: name.into(),
            depends_on: Vec::new(),
            required_params: Vec::new(),
            retry_override: None,
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = OperationType>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    pub fn requires_params(mut self, params: impl IntoIterator<Item = String>) -> Self {
        self.required_params.extend(params);
        self
    }

    pub fn with_retry_override(mut self, retry_override: RetryOverride) -> Self {
        self.retry_override = Some(retry_override);
        self
    }
}

/// Per-operation override of the default retry policy. Retries apply
/// only at the `execute` boundary; business validation failures are
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOverride {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}
