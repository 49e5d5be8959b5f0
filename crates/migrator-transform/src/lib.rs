//! # migrator-transform
//!
//! The transformation engine: field-mapping renames plus an ordered
//! chain of atomic string transformations applied to a single field
//! path. A missing source path is "no value, skip" — never an
//! error; a transformation that genuinely fails (wrong value shape, an
//! unmapped `map` lookup with no default) is recorded and the run
//! continues.

use std::collections::BTreeMap;

use migrator_types::{AtomicTransformation, FieldTransformation, TestCase};

/// Outcome of running every configured field mapping and transformation
/// against one test case. Carried into the per-item `TestCaseDetail`
/// (`transformations_applied`) and the run-level summary counters.
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedTransformation>,
    pub failed: Vec<FailedTransformation>,
}

#[derive(Debug, Clone)]
pub struct SkippedTransformation {
    pub source_path: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct FailedTransformation {
    pub source_path: String,
    pub target_path: String,
    pub reason: String,
}

/// Step 1 of the pipeline: renames custom-field keys, leaving values
/// untouched. Only top-level keys are renamed — nested paths are the
/// Transformation Engine's job, not the mapper's.
pub fn apply_field_mappings(case: &mut TestCase, mappings: &BTreeMap<String, String>) {
    if mappings.is_empty() {
        return;
    }
    let mut renamed = std::collections::BTreeMap::new();
    for (key, value) in case.custom_fields.iter() {
        let target_key = mappings.get(key).cloned().unwrap_or_else(|| key.clone());
        renamed.insert(target_key, value.clone());
    }
    case.custom_fields = renamed;
}

/// Step 2 of the pipeline: runs every [`FieldTransformation`] in order
/// against `case`, mutating it in place and returning a record of what
/// happened.
pub fn apply_transformations(
    case: &mut TestCase,
    transformations: &[FieldTransformation],
) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();

    for transformation in transformations {
        let Some(source_value) = case.get_field(&transformation.source_path) else {
            outcome.skipped.push(SkippedTransformation {
                source_path: transformation.source_path.clone(),
                reason: "source path has no value".to_string(),
            });
            continue;
        };

        let Some(starting) = source_value.as_str() else {
            outcome.failed.push(FailedTransformation {
                source_path: transformation.source_path.clone(),
                target_path: transformation.target_path.clone(),
                reason: "source value is not a string".to_string(),
            });
            continue;
        };

        match run_chain(starting, &transformation.transformations) {
            Ok(result) => {
                case.set_field(&transformation.target_path, serde_json::Value::String(result));
                outcome.applied.push(format!(
                    "{} -> {}",
                    transformation.source_path, transformation.target_path
                ));
            }
            Err(reason) => {
                outcome.failed.push(FailedTransformation {
                    source_path: transformation.source_path.clone(),
                    target_path: transformation.target_path.clone(),
                    reason,
                });
            }
        }
    }

    outcome
}

fn run_chain(start: &str, chain: &[AtomicTransformation]) -> Result<String, String> {
    let mut value = start.to_string();
    for step in chain {
        value = apply_atomic(&value, step)?;
    }
    Ok(value)
}

fn apply_atomic(value: &str, step: &AtomicTransformation) -> Result<String, String> {
    match step {
        AtomicTransformation::Concatenate { value: extra, prefix, suffix: _ } => {
            if *prefix {
                Ok(format!("{extra}{value}"))
            } else {
                Ok(format!("{value}{extra}"))
            }
        }
        AtomicTransformation::Replace { search, replace, replace_all } => {
            if search.is_empty() {
                return Ok(value.to_string());
            }
            if *replace_all {
                Ok(value.replace(search.as_str(), replace))
            } else {
                Ok(value.replacen(search.as_str(), replace, 1))
            }
        }
        AtomicTransformation::Slice { start, end } => {
            let chars: Vec<char> = value.chars().collect();
            let len = chars.len();
            if *start > len {
                return Err(format!("slice start {start} is past the end of a {len}-char value"));
            }
            let end = end.unwrap_or(len).min(len);
            if end < *start {
                return Err(format!("slice end {end} precedes start {start}"));
            }
            Ok(chars[*start..end].iter().collect())
        }
        AtomicTransformation::Map { values, default_value } => {
            if let Some(mapped) = values.get(value) {
                Ok(mapped.clone())
            } else if let Some(default) = default_value {
                Ok(default.clone())
            } else {
                Err(format!("no mapping for value '{value}' and no defaultValue"))
            }
        }
        AtomicTransformation::Truncate { max_length, add_ellipsis } => {
            let chars: Vec<char> = value.chars().collect();
            if chars.len() <= *max_length {
                return Ok(value.to_string());
            }
            let truncated: String = chars[..*max_length].iter().collect();
            if *add_ellipsis {
                Ok(format!("{truncated}…"))
            } else {
                Ok(truncated)
            }
        }
        AtomicTransformation::Uppercase => Ok(value.to_uppercase()),
        AtomicTransformation::Lowercase => Ok(value.to_lowercase()),
        AtomicTransformation::Capitalize => {
            let mut chars = value.chars();
            match chars.next() {
                Some(first) => Ok(first.to_uppercase().collect::<String>() + chars.as_str()),
                None => Ok(String::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator_types::{TestCasePriority, TestCaseStatus};

    fn sample() -> TestCase {
        TestCase {
            id: "TC-1".into(),
            name: "Login works".into(),
            description: String::new(),
            status: TestCaseStatus::Active,
            priority: TestCasePriority::Medium,
            steps: vec![],
            custom_fields: Default::default(),
            attachments: None,
            history: None,
        }
    }

    #[test]
    fn field_mapping_renames_top_level_keys() {
        let mut tc = sample();
        tc.set_field("severity", serde_json::json!("P1"));
        let mut mappings = BTreeMap::new();
        mappings.insert("severity".to_string(), "priorityLabel".to_string());
        apply_field_mappings(&mut tc, &mappings);
        assert!(tc.get_field("severity").is_none());
        assert_eq!(tc.get_field("priorityLabel"), Some(&serde_json::json!("P1")));
    }

    #[test]
    fn missing_source_path_is_skipped_not_failed() {
        let mut tc = sample();
        let transformation = FieldTransformation {
            source_path: "customFields.missing".into(),
            target_path: "customFields.out".into(),
            transformations: vec![AtomicTransformation::Uppercase],
        };
        let outcome = apply_transformations(&mut tc, &[transformation]);
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn uppercase_chain_applies_and_writes_target() {
        let mut tc = sample();
        tc.set_field("name", serde_json::json!("login works"));
        let transformation = FieldTransformation {
            source_path: "name".into(),
            target_path: "nameUpper".into(),
            transformations: vec![AtomicTransformation::Uppercase],
        };
        let outcome = apply_transformations(&mut tc, &[transformation]);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(
            tc.get_field("nameUpper"),
            Some(&serde_json::json!("LOGIN WORKS"))
        );
    }

    #[test]
    fn map_without_default_fails_on_unknown_value() {
        let mut tc = sample();
        tc.set_field("severity", serde_json::json!("unknown-severity"));
        let transformation = FieldTransformation {
            source_path: "severity".into(),
            target_path: "severity".into(),
            transformations: vec![AtomicTransformation::Map {
                values: BTreeMap::from([("P1".to_string(), "Critical".to_string())]),
                default_value: None,
            }],
        };
        let outcome = apply_transformations(&mut tc, &[transformation]);
        assert_eq!(outcome.failed.len(), 1);
    }

    #[test]
    fn map_with_default_falls_back() {
        let mut tc = sample();
        tc.set_field("severity", serde_json::json!("unknown-severity"));
        let transformation = FieldTransformation {
            source_path: "severity".into(),
            target_path: "severity".into(),
            transformations: vec![AtomicTransformation::Map {
                values: BTreeMap::from([("P1".to_string(), "Critical".to_string())]),
                default_value: Some("Medium".to_string()),
            }],
        };
        let outcome = apply_transformations(&mut tc, &[transformation]);
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(tc.get_field("severity"), Some(&serde_json::json!("Medium")));
    }

    #[test]
    fn truncate_adds_ellipsis_only_when_cut() {
        let mut tc = sample();
        tc.set_field("name", serde_json::json!("hello"));
        let transformation = FieldTransformation {
            source_path: "name".into(),
            target_path: "name".into(),
            transformations: vec![AtomicTransformation::Truncate {
                max_length: 3,
                add_ellipsis: true,
            }],
        };
        apply_transformations(&mut tc, &[transformation]);
        assert_eq!(tc.get_field("name"), Some(&serde_json::json!("hel…")));
    }

    #[test]
    fn non_string_source_value_fails() {
        let mut tc = sample();
        tc.set_field("count", serde_json::json!(5));
        let transformation = FieldTransformation {
            source_path: "count".into(),
            target_path: "countStr".into(),
            transformations: vec![AtomicTransformation::Uppercase],
        };
        let outcome = apply_transformations(&mut tc, &[transformation]);
        assert_eq!(outcome.failed.len(), 1);
    }
}
