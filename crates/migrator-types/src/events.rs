use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrationError;
use crate::result::{ItemStatus, MigrationStatus};

/// The lifecycle and progress events a run publishes. Each carries the
/// structured payload a monitor needs to render progress without
/// re-deriving it from the full `MigrationResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Started {
        total_count: u32,
    },
    StatusChanged {
        status: MigrationStatus,
    },
    ProgressUpdated {
        progress: u8,
    },
    TestCasesLoaded {
        count: u32,
    },
    BatchCompleted {
        batch_index: usize,
        batch_size: usize,
    },
    TestCaseProcessed {
        source_id: String,
        status: ItemStatus,
    },
    Paused {
        reason: Option<String>,
    },
    Resumed,
    Cancelled,
    Completed {
        status: MigrationStatus,
    },
    Failed {
        error: MigrationError,
    },
}

/// An event published on the event bus, timestamped and tagged with the
/// run it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationEvent {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl MigrationEvent {
    pub fn new(run_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}
