use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a test case, as recognized by the core regardless of
/// which provider's own status vocabulary it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseStatus {
    Draft,
    Active,
    Deprecated,
    Archived,
}

/// Priority of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCasePriority {
    Low,
    Medium,
    High,
    Critical,
}

/// One step of a test case: an action and its expected result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    pub action: String,
    pub expected_result: String,
}

/// A binary attachment belonging to exactly one test case within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// A single historical change to a test case field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub author: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_type: Option<String>,
}

/// A test case as produced by a `SourceProvider`, carried through the
/// pipeline, and finally handed to a `TargetProvider`. Treated as
/// immutable-by-convention: the pipeline builds new `TestCase` values at
/// each stage (map, transform) rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TestCaseStatus,
    pub priority: TestCasePriority,
    pub steps: Vec<TestStep>,
    /// Arbitrary custom fields, keyed by field name. Dotted paths
    /// (`customFields.priority`) used by the Transformation Engine address
    /// into nested objects within this map's `serde_json::Value`s.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

impl TestCase {
    /// Reads a dotted path into `custom_fields`, e.g. `"customFields.priority"`
    /// or `"priority"`. Returns `None` if any segment is missing — a missing
    /// path is "no value", not an error.
    pub fn get_field(&self, path: &str) -> Option<&serde_json::Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.custom_fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes a dotted path into `custom_fields`, creating intermediate
    /// objects as needed.
    pub fn set_field(&mut self, path: &str, value: serde_json::Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().expect("path has at least one segment");

        if segments.is_empty() {
            self.custom_fields.insert(last.to_string(), value);
            return;
        }

        let mut cursor = self
            .custom_fields
            .entry(segments[0].to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));

        for segment in &segments[1..] {
            if !cursor.is_object() {
                *cursor = serde_json::Value::Object(Default::default());
            }
            cursor = cursor
                .as_object_mut()
                .expect("just ensured object")
                .entry(segment.to_string())
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
        }

        if !cursor.is_object() {
            *cursor = serde_json::Value::Object(Default::default());
        }
        cursor
            .as_object_mut()
            .expect("just ensured object")
            .insert(last.to_string(), value);
    }
}
