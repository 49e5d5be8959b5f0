use serde::{Deserialize, Serialize};

/// One atomic transformation in a [`FieldTransformation`] chain.
/// Reading a missing source path yields "no value, skip this
/// transformation"; these never abort a run, only ever produce a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AtomicTransformation {
    Concatenate {
        value: String,
        #[serde(default)]
        prefix: bool,
        #[serde(default)]
        suffix: bool,
    },
    Replace {
        search: String,
        replace: String,
        #[serde(default)]
        replace_all: bool,
    },
    Slice {
        start: usize,
        #[serde(default)]
        end: Option<usize>,
    },
    Map {
        values: std::collections::BTreeMap<String, String>,
        #[serde(default)]
        default_value: Option<String>,
    },
    Truncate {
        max_length: usize,
        #[serde(default)]
        add_ellipsis: bool,
    },
    Uppercase,
    Lowercase,
    Capitalize,
}

/// An ordered chain of [`AtomicTransformation`]s mapping one field path to
/// another (they may be the same path, for an in-place transform).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTransformation {
    pub source_path: String,
    pub target_path: String,
    pub transformations: Vec<AtomicTransformation>,
}
