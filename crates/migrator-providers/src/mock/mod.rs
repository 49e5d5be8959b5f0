//! In-memory `SourceProvider`/`TargetProvider` pair used by integration
//! tests elsewhere in the workspace and by the reference CLI: a stand-in
//! real enough to exercise retry, fetch, and transaction semantics
//! without a network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use migrator_types::{Attachment, HistoryEntry, OperationDefinition, OperationType, TestCase};

use crate::traits::{
    ConnectionStatus, FieldSchema, Project, ProviderCapabilities, ProviderInfo, SourceProvider,
    TargetProvider,
};

/// A `SourceProvider` backed by an in-memory fixture. Never fails unless
/// explicitly configured to via [`MockSourceProvider::fail_connection`].
#[derive(Default)]
pub struct MockSourceProvider {
    project: Project,
    test_cases: BTreeMap<String, TestCase>,
    attachments: BTreeMap<String, Vec<Attachment>>,
    history: BTreeMap<String, Vec<HistoryEntry>>,
    contract: BTreeMap<OperationType, OperationDefinition>,
    fields: Vec<FieldSchema>,
    connection_fails: bool,
}

impl MockSourceProvider {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project: Project {
                key: project_key.into(),
                name: "Mock Source Project".into(),
            },
            ..Default::default()
        }
    }

    pub fn with_test_case(mut self, case: TestCase) -> Self {
        self.test_cases.insert(case.id.clone(), case);
        self
    }

    pub fn with_attachments(mut self, test_case_id: impl Into<String>, items: Vec<Attachment>) -> Self {
        self.attachments.insert(test_case_id.into(), items);
        self
    }

    pub fn with_history(mut self, test_case_id: impl Into<String>, items: Vec<HistoryEntry>) -> Self {
        self.history.insert(test_case_id.into(), items);
        self
    }

    /// Declares an extra operation in this provider's API contract, with
    /// whatever `dependsOn` edges the definition carries — including bad
    /// ones, so tests can exercise the resolver's rejection paths.
    pub fn with_contract_operation(mut self, def: OperationDefinition) -> Self {
        self.contract.insert(def.operation_type.clone(), def);
        self
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fail_connection(mut self) -> Self {
        self.connection_fails = true;
        self
    }
}

impl SourceProvider for MockSourceProvider {
    fn test_connection(&self) -> Result<ConnectionStatus> {
        Ok(ConnectionStatus {
            connected: !self.connection_fails,
            message: if self.connection_fails {
                "mock source connection refused".into()
            } else {
                "ok".into()
            },
        })
    }

    fn get_api_contract(&self) -> Result<BTreeMap<OperationType, OperationDefinition>> {
        Ok(self.contract.clone())
    }

    fn get_projects(&self) -> Result<Vec<Project>> {
        Ok(vec![self.project.clone()])
    }

    fn get_project(&self, key: &str) -> Result<Project> {
        if key == self.project.key {
            Ok(self.project.clone())
        } else {
            bail!("unknown project: {key}")
        }
    }

    fn get_test_cases(&self, project_key: &str) -> Result<Vec<TestCase>> {
        if project_key != self.project.key {
            bail!("unknown project: {project_key}");
        }
        Ok(self.test_cases.values().cloned().collect())
    }

    fn get_test_case(&self, project_key: &str, id: &str) -> Result<TestCase> {
        if project_key != self.project.key {
            bail!("unknown project: {project_key}");
        }
        self.test_cases
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown test case: {id}"))
    }

    fn get_test_case_attachments(&self, id: &str) -> Result<Vec<Attachment>> {
        Ok(self.attachments.get(id).cloned().unwrap_or_default())
    }

    fn get_attachment_content(&self, _project_key: &str, attachment_id: &str) -> Result<Vec<u8>> {
        for items in self.attachments.values() {
            if let Some(a) = items.iter().find(|a| a.id == attachment_id) {
                return Ok(a.content.clone());
            }
        }
        bail!("unknown attachment: {attachment_id}")
    }

    fn get_test_case_history(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self.history.get(id).cloned().unwrap_or_default())
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_attachments: true,
            supports_history: true,
            supports_filtered_fetch: true,
            ..Default::default()
        }
    }

    fn get_fields(&self) -> Vec<FieldSchema> {
        self.fields.clone()
    }

    fn get_provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "mock-source".into(),
            display_name: "Mock Source Provider".into(),
            version: "0.0.0".into(),
        }
    }
}

/// A `TargetProvider` backed by an in-memory fixture, with transaction
/// bookkeeping so tests can exercise `atomic` transaction mode.
pub struct MockTargetProvider {
    project: Project,
    created: Mutex<BTreeMap<String, TestCase>>,
    attachments: Mutex<BTreeMap<String, Vec<Attachment>>>,
    history: Mutex<BTreeMap<String, Vec<HistoryEntry>>>,
    next_id: AtomicU64,
    open_transactions: Mutex<Vec<String>>,
    rolled_back: Mutex<Vec<String>>,
    fail_create_for: Vec<String>,
    /// Remaining transient failures per source id; decremented per call.
    transient_failures: Mutex<BTreeMap<String, u32>>,
    fields: Vec<FieldSchema>,
    supports_transactions: bool,
}

impl Default for MockTargetProvider {
    fn default() -> Self {
        Self::new("TARGET")
    }
}

impl MockTargetProvider {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project: Project {
                key: project_key.into(),
                name: "Mock Target Project".into(),
            },
            created: Mutex::new(BTreeMap::new()),
            attachments: Mutex::new(BTreeMap::new()),
            history: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            open_transactions: Mutex::new(Vec::new()),
            rolled_back: Mutex::new(Vec::new()),
            fail_create_for: Vec::new(),
            transient_failures: Mutex::new(BTreeMap::new()),
            fields: Vec::new(),
            supports_transactions: true,
        }
    }

    pub fn without_transactions(mut self) -> Self {
        self.supports_transactions = false;
        self
    }

    pub fn fail_create_for(mut self, source_id: impl Into<String>) -> Self {
        self.fail_create_for.push(source_id.into());
        self
    }

    /// Makes `create_test_case` fail the first `times` calls for the given
    /// source id, then succeed — for exercising retry loops.
    pub fn fail_create_times(self, source_id: impl Into<String>, times: u32) -> Self {
        self.transient_failures.lock().unwrap().insert(source_id.into(), times);
        self
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn created_test_cases(&self) -> Vec<TestCase> {
        self.created.lock().unwrap().values().cloned().collect()
    }

    pub fn has_open_transaction(&self) -> bool {
        !self.open_transactions.lock().unwrap().is_empty()
    }

    /// Audit log of transactions that were rolled back, in order.
    pub fn rolled_back_transactions(&self) -> Vec<String> {
        self.rolled_back.lock().unwrap().clone()
    }
}

impl TargetProvider for MockTargetProvider {
    fn test_connection(&self) -> Result<ConnectionStatus> {
        Ok(ConnectionStatus {
            connected: true,
            message: "ok".into(),
        })
    }

    fn get_api_contract(&self) -> Result<BTreeMap<OperationType, OperationDefinition>> {
        Ok(BTreeMap::new())
    }

    fn get_projects(&self) -> Result<Vec<Project>> {
        Ok(vec![self.project.clone()])
    }

    fn get_project(&self, key: &str) -> Result<Project> {
        if key == self.project.key {
            Ok(self.project.clone())
        } else {
            bail!("unknown project: {key}")
        }
    }

    fn create_test_case(&self, project_key: &str, case: &TestCase) -> Result<TestCase> {
        if project_key != self.project.key {
            bail!("unknown project: {project_key}");
        }
        if self.fail_create_for.contains(&case.id) {
            bail!("mock target refused to create test case {}", case.id);
        }
        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if let Some(count) = remaining.get_mut(&case.id) {
                if *count > 0 {
                    *count -= 1;
                    bail!("transient failure creating test case {}", case.id);
                }
            }
        }
        let new_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut created = case.clone();
        created.id = format!("TGT-{new_id}");
        self.created.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    fn create_test_case_with_id(
        &self,
        project_key: &str,
        id: &str,
        case: &TestCase,
    ) -> Result<TestCase> {
        if project_key != self.project.key {
            bail!("unknown project: {project_key}");
        }
        let mut created = case.clone();
        created.id = id.to_string();
        self.created.lock().unwrap().insert(created.id.clone(), created.clone());
        Ok(created)
    }

    fn add_test_case_attachment(&self, id: &str, attachment: &Attachment) -> Result<()> {
        self.attachments
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(attachment.clone());
        Ok(())
    }

    fn add_test_case_history(&self, id: &str, history: &[HistoryEntry]) -> Result<()> {
        self.history
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .extend_from_slice(history);
        Ok(())
    }

    fn begin_transaction(&self) -> Result<String> {
        if !self.supports_transactions {
            bail!("target provider does not support transactions");
        }
        let txn_id = format!("txn-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.open_transactions.lock().unwrap().push(txn_id.clone());
        Ok(txn_id)
    }

    fn commit_transaction(&self, txn_id: &str) -> Result<()> {
        let mut open = self.open_transactions.lock().unwrap();
        if let Some(pos) = open.iter().position(|t| t == txn_id) {
            open.remove(pos);
            Ok(())
        } else {
            bail!("unknown transaction: {txn_id}")
        }
    }

    fn rollback_transaction(&self, txn_id: &str) -> Result<()> {
        let mut open = self.open_transactions.lock().unwrap();
        if let Some(pos) = open.iter().position(|t| t == txn_id) {
            open.remove(pos);
        }
        self.rolled_back.lock().unwrap().push(txn_id.to_string());
        self.created.lock().unwrap().clear();
        Ok(())
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_attachments: true,
            supports_history: true,
            supports_transactions: self.supports_transactions,
            supports_create_with_id: true,
            ..Default::default()
        }
    }

    fn get_fields(&self) -> Vec<FieldSchema> {
        self.fields.clone()
    }

    fn get_provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "mock-target".into(),
            display_name: "Mock Target Provider".into(),
            version: "0.0.0".into(),
        }
    }
}
