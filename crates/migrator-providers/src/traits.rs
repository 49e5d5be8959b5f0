use std::collections::BTreeMap;

use anyhow::Result;
use migrator_types::{
    Attachment, HistoryEntry, OperationDefinition, OperationType, TestCase, TestCaseFilter,
};

fn filter_matches(filter: &TestCaseFilter, tc: &TestCase) -> bool {
    if !filter.ids.is_empty() && !filter.ids.iter().any(|id| id == &tc.id) {
        return false;
    }
    if !filter.statuses.is_empty() {
        let status = format!("{:?}", tc.status).to_lowercase();
        if !filter.statuses.iter().any(|s| s.to_lowercase() == status) {
            return false;
        }
    }
    if !filter.priorities.is_empty() {
        let priority = format!("{:?}", tc.priority).to_lowercase();
        if !filter.priorities.iter().any(|p| p.to_lowercase() == priority) {
            return false;
        }
    }
    true
}

/// Result of `testConnection`/`validateConnection`.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

/// A project as known to a provider.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub key: String,
    pub name: String,
}

/// Optional, provider-declared feature flags; the validator's capability
/// check feeds off this. A provider that doesn't override
/// `get_capabilities` is assumed to support nothing beyond the required
/// surface.
#[derive(Debug, Clone, Default)]
pub struct ProviderCapabilities {
    pub supports_attachments: bool,
    pub supports_history: bool,
    pub supports_filtered_fetch: bool,
    pub supports_transactions: bool,
    pub supports_create_with_id: bool,
    pub supports_update: bool,
    pub supports_delete: bool,
    /// Largest accepted attachment, when the provider enforces one.
    pub max_attachment_size_bytes: Option<u64>,
    /// Largest accepted write batch, when the provider enforces one.
    pub max_batch_size: Option<usize>,
    /// Declared request budget, when the provider rate-limits.
    pub max_requests_per_minute: Option<u32>,
    /// Accepted attachment MIME types; `None` means anything.
    pub supported_attachment_types: Option<Vec<String>>,
}

/// The data-type vocabulary the validator's compatibility matrix is
/// defined over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldDataType {
    String,
    Text,
    Number,
    Boolean,
    Date,
    Enum,
    Array,
    Object,
}

/// A provider-declared field, used by the Validator's pre-flight
/// compatibility check. `get_fields` is optional — a provider that
/// doesn't implement it is assumed to impose no extra constraints.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub data_type: FieldDataType,
    pub required: bool,
    pub max_length: Option<usize>,
    pub allowed_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub version: String,
}

/// The read side of a migration: everything the Pipeline (C6) needs to
/// pull from the system test cases currently live in.
///
/// Implementations are expected to be `Send + Sync` so the executor can
/// hold one behind an `Arc<dyn SourceProvider>` and share it across a
/// parallel wave of operations.
pub trait SourceProvider: Send + Sync {
    fn test_connection(&self) -> Result<ConnectionStatus>;

    fn get_api_contract(&self) -> Result<BTreeMap<OperationType, OperationDefinition>>;

    fn get_projects(&self) -> Result<Vec<Project>>;

    fn get_project(&self, key: &str) -> Result<Project>;

    fn get_test_cases(&self, project_key: &str) -> Result<Vec<TestCase>>;

    fn get_test_case(&self, project_key: &str, id: &str) -> Result<TestCase>;

    /// Provider-side filtering. Default falls back to fetching everything
    /// and filtering in-process, so callers never need to branch on
    /// whether a provider implements it.
    fn get_filtered_test_cases(
        &self,
        project_key: &str,
        filter: &TestCaseFilter,
    ) -> Result<Vec<TestCase>> {
        let all = self.get_test_cases(project_key)?;
        Ok(all.into_iter().filter(|tc| filter_matches(filter, tc)).collect())
    }

    fn get_test_case_attachments(&self, id: &str) -> Result<Vec<Attachment>>;

    fn get_attachment_content(&self, project_key: &str, attachment_id: &str) -> Result<Vec<u8>>;

    fn get_test_case_history(&self, id: &str) -> Result<Vec<HistoryEntry>>;

    fn get_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn get_fields(&self) -> Vec<FieldSchema> {
        Vec::new()
    }

    fn get_provider_info(&self) -> ProviderInfo {
        ProviderInfo::default()
    }
}

/// The write side of a migration: everything the Pipeline hands to the
/// destination system.
pub trait TargetProvider: Send + Sync {
    fn test_connection(&self) -> Result<ConnectionStatus>;

    fn get_api_contract(&self) -> Result<BTreeMap<OperationType, OperationDefinition>>;

    fn get_projects(&self) -> Result<Vec<Project>>;

    fn get_project(&self, key: &str) -> Result<Project>;

    fn create_test_case(&self, project_key: &str, case: &TestCase) -> Result<TestCase>;

    /// Creates preserving the source id. Default errors so
    /// `preserveIds` requests against a target without this capability
    /// fail loudly instead of silently minting a new id.
    fn create_test_case_with_id(
        &self,
        project_key: &str,
        id: &str,
        case: &TestCase,
    ) -> Result<TestCase> {
        let _ = (project_key, id, case);
        anyhow::bail!("target provider does not support createTestCaseWithId")
    }

    fn update_test_case(&self, project_key: &str, id: &str, case: &TestCase) -> Result<TestCase> {
        let _ = (project_key, id, case);
        anyhow::bail!("target provider does not support updateTestCase")
    }

    fn delete_test_case(&self, project_key: &str, id: &str) -> Result<()> {
        let _ = (project_key, id);
        anyhow::bail!("target provider does not support deleteTestCase")
    }

    fn add_test_case_attachment(&self, id: &str, attachment: &Attachment) -> Result<()>;

    fn upload_attachment(
        &self,
        project_key: &str,
        kind: &str,
        id: &str,
        content: &[u8],
    ) -> Result<String> {
        let _ = (project_key, kind, id, content);
        anyhow::bail!("target provider does not support uploadAttachment")
    }

    fn add_test_case_history(&self, id: &str, history: &[HistoryEntry]) -> Result<()>;

    fn begin_transaction(&self) -> Result<String> {
        anyhow::bail!("target provider does not support transactions")
    }

    fn commit_transaction(&self, txn_id: &str) -> Result<()> {
        let _ = txn_id;
        anyhow::bail!("target provider does not support transactions")
    }

    fn rollback_transaction(&self, txn_id: &str) -> Result<()> {
        let _ = txn_id;
        anyhow::bail!("target provider does not support transactions")
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn get_fields(&self) -> Vec<FieldSchema> {
        Vec::new()
    }

    fn get_provider_info(&self) -> ProviderInfo {
        ProviderInfo::default()
    }
}
