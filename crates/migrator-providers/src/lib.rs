//! # migrator-providers
//!
//! The external interface boundary: `SourceProvider` and
//! `TargetProvider` capability-set traits, the typed [`OperationContext`]
//! and [`ResultsStore`] operations publish results into, and an in-memory
//! mock pair for tests.
//!
//! Nothing outside this crate is allowed to know what concrete provider
//! implementation is in use — the executor, pipeline, and validator all
//! hold `&dyn SourceProvider` / `&dyn TargetProvider`.

mod context;
pub mod mock;
mod traits;

pub use context::{OperationContext, ResultsStore, ResultsStoreError};
pub use traits::{
    ConnectionStatus, FieldDataType, FieldSchema, Project, ProviderCapabilities, ProviderInfo,
    SourceProvider, TargetProvider,
};
