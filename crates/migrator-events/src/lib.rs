//! # migrator-events
//!
//! The event bus: an in-process `Subscriber` fan-out for live monitors
//! plus an append-only JSONL [`EventLog`] so a run can be replayed after
//! the fact. A subscriber that panics or errors is caught
//! and logged — it never aborts the run it's merely watching.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use migrator_types::MigrationEvent;

pub const EVENTS_FILE: &str = "events.jsonl";

/// Path to the event log file within a run's state directory.
pub fn events_path(state_dir: &Path) -> PathBuf {
    state_dir.join(EVENTS_FILE)
}

/// Receives every event a run publishes. Implementations must not assume
/// ordering guarantees stronger than "published in the order `publish`
/// was called on this bus" and must tolerate being called from whatever
/// thread the executor happens to run on.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &MigrationEvent);
}

/// Fans a published event out to every registered subscriber, catching
/// panics so one broken monitor never brings down the migration it's
/// observing.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn publish(&self, event: &MigrationEvent) {
        for subscriber in &self.subscribers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_event(event);
            }));
            if result.is_err() {
                tracing::warn!(run_id = %event.run_id, "event subscriber panicked, continuing run");
            }
        }
    }
}

/// Append-only JSONL log of every event a run published, for replay and
/// post-hoc auditing.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<MigrationEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: MigrationEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create events dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;
        let mut writer = std::io::BufWriter::new(file);

        for event in self.events.lock().unwrap().iter() {
            let line = serde_json::to_string(event).context("failed to serialize event to JSON")?;
            writeln!(writer, "{line}").context("failed to write event line")?;
        }
        writer.flush().context("failed to flush events file")?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let file = File::open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.with_context(|| {
                format!("failed to read line from events file {}", path.display())
            })?;
            let event: MigrationEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse event JSON from line: {line}"))?;
            events.push(event);
        }
        Ok(Self {
            events: Mutex::new(events),
        })
    }

    pub fn events_for_run(&self, run_id: &str) -> Vec<MigrationEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
