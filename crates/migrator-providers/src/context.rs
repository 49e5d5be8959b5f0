use std::any::Any;
use std::collections::BTreeMap;

use migrator_types::OperationType;

/// Write-once-per-key heterogeneous store: each operation publishes its
/// outcome under its own [`OperationType`], and downstream operations read
/// the outcomes they declared in `depends_on` back out by concrete type.
///
/// Enforcing one writer per key here, rather than downstream, is what
/// makes replaying a level deterministic: a retried operation always
/// overwrites its own prior (failed) attempt, never another operation's.
#[derive(Default)]
pub struct ResultsStore {
    values: BTreeMap<OperationType, Box<dyn Any + Send + Sync>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResultsStoreError {
    #[error("operation '{0}' already published a result")]
    AlreadyPublished(OperationType),
    #[error("no result recorded for operation '{0}'")]
    Missing(OperationType),
    #[error("result for operation '{0}' was not the expected type")]
    TypeMismatch(OperationType),
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` under `key`. Errors if `key` already has a value;
    /// callers that need to overwrite (e.g. a retry restarting an
    /// operation) must call [`Self::clear`] first.
    pub fn publish<T: Send + Sync + 'static>(
        &mut self,
        key: OperationType,
        value: T,
    ) -> Result<(), ResultsStoreError> {
        if self.values.contains_key(&key) {
            return Err(ResultsStoreError::AlreadyPublished(key));
        }
        self.values.insert(key, Box::new(value));
        Ok(())
    }

    /// Publishes an already-boxed value, for callers (the executor) that
    /// receive a `Box<dyn Any + Send + Sync>` directly from operation
    /// execution rather than constructing `T` themselves.
    pub fn publish_any(
        &mut self,
        key: OperationType,
        value: Box<dyn Any + Send + Sync>,
    ) -> Result<(), ResultsStoreError> {
        if self.values.contains_key(&key) {
            return Err(ResultsStoreError::AlreadyPublished(key));
        }
        self.values.insert(key, value);
        Ok(())
    }

    pub fn clear(&mut self, key: &OperationType) {
        self.values.remove(key);
    }

    pub fn contains(&self, key: &OperationType) -> bool {
        self.values.contains_key(key)
    }

    pub fn get<T: 'static>(&self, key: &OperationType) -> Result<&T, ResultsStoreError> {
        let boxed = self
            .values
            .get(key)
            .ok_or_else(|| ResultsStoreError::Missing(key.clone()))?;
        boxed
            .downcast_ref::<T>()
            .ok_or_else(|| ResultsStoreError::TypeMismatch(key.clone()))
    }
}

/// Shared state passed to every operation as it executes: which project is
/// being migrated, and the [`ResultsStore`] of everything already
/// completed at a lower topological level.
pub struct OperationContext {
    pub run_id: String,
    pub project_key: String,
    pub results: ResultsStore,
}

impl OperationContext {
    pub fn new(run_id: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            project_key: project_key.into(),
            results: ResultsStore::new(),
        }
    }
}
