//! Pre-flight validation, run before the first side-effecting
//! operation. `validate_migration_possibility` is the cheap, test-case-free
//! check; `validate_migration` is the full pre-flight once test cases are in
//! hand.

use migrator_providers::{FieldDataType, FieldSchema, ProviderCapabilities};
use migrator_types::{ErrorKind, MigrationError, MigrationOptions, TestCase, ValidationLevel};

/// `true` if a value of `source`'s type can be written into a field of
/// `target`'s type. Everything narrows into `string`/`text`; beyond that
/// only like-for-like holds, except `string` also widens into `date`,
/// `enum`, `array`, and `object`, and `boolean` into `number`.
fn types_compatible(source: FieldDataType, target: FieldDataType) -> bool {
    use FieldDataType::*;
    match source {
        String => matches!(target, String | Text | Date | Enum | Array | Object),
        Text => matches!(target, String | Text),
        Number => matches!(target, String | Text | Number),
        Boolean => matches!(target, String | Text | Number | Boolean),
        Date => matches!(target, String | Text | Date),
        Enum => matches!(target, String | Text | Enum),
        Array => matches!(target, String | Text | Array),
        Object => matches!(target, String | Text | Object),
    }
}

fn find_field<'a>(fields: &'a [FieldSchema], name: &str) -> Option<&'a FieldSchema> {
    fields.iter().find(|f| f.name == name)
}

/// Demotes an error to a warning according to `level`. `force_error`
/// carries the "missing-required-field is always an error" carve-out
/// for `lenient`.
fn leveled(mut error: MigrationError, level: ValidationLevel, force_error: bool) -> MigrationError {
    match level {
        ValidationLevel::Strict => error,
        ValidationLevel::Lenient => {
            if force_error {
                error
            } else {
                error.severity = migrator_types::Severity::Warning;
                error
            }
        }
        ValidationLevel::None => {
            error.severity = migrator_types::Severity::Warning;
            error
        }
    }
}

/// High-level, test-case-free check: can this migration be attempted at
/// all, given what the two providers declare they support.
pub fn validate_migration_possibility(
    source_caps: &ProviderCapabilities,
    target_caps: &ProviderCapabilities,
    target_fields: &[FieldSchema],
    options: &MigrationOptions,
) -> Vec<MigrationError> {
    let mut issues = Vec::new();

    if options.include_attachments && !(source_caps.supports_attachments && target_caps.supports_attachments) {
        issues.push(MigrationError::new(
            "ATTACHMENTS_UNSUPPORTED",
            ErrorKind::CapabilityMissing,
            "attachment migration requested but unsupported by source or target",
        ));
    }

    if options.include_history && !(source_caps.supports_history && target_caps.supports_history) {
        issues.push(MigrationError::new(
            "HISTORY_UNSUPPORTED",
            ErrorKind::CapabilityMissing,
            "history migration requested but unsupported by source or target",
        ));
    }

    if let (Some(source_limit), Some(target_limit)) = (
        source_caps.max_attachment_size_bytes,
        target_caps.max_attachment_size_bytes,
    ) && target_limit < source_limit
    {
        issues.push(MigrationError::warning(
            "SMALLER_ATTACHMENT_LIMIT",
            ErrorKind::CapabilityMissing,
            format!(
                "target caps attachments at {target_limit} bytes, below the source's {source_limit}"
            ),
        ));
    }

    if let (Some(source_batch), Some(target_batch)) =
        (source_caps.max_batch_size, target_caps.max_batch_size)
        && target_batch < source_batch
    {
        issues.push(MigrationError::warning(
            "SMALLER_BATCH_LIMIT",
            ErrorKind::CapabilityMissing,
            format!("target caps batches at {target_batch}, below the source's {source_batch}"),
        ));
    }

    if let (Some(source_rpm), Some(target_rpm)) = (
        source_caps.max_requests_per_minute,
        target_caps.max_requests_per_minute,
    ) && target_rpm < source_rpm
    {
        issues.push(MigrationError::warning(
            "MORE_RESTRICTIVE_RATE_LIMIT",
            ErrorKind::CapabilityMissing,
            format!(
                "target allows {target_rpm} requests/minute, below the source's {source_rpm}"
            ),
        ));
    }

    if let (Some(source_types), Some(target_types)) = (
        &source_caps.supported_attachment_types,
        &target_caps.supported_attachment_types,
    ) {
        let missing: Vec<&String> = source_types
            .iter()
            .filter(|t| !target_types.contains(t))
            .collect();
        if !missing.is_empty() {
            issues.push(MigrationError::warning(
                "UNSUPPORTED_ATTACHMENT_TYPES",
                ErrorKind::CapabilityMissing,
                format!(
                    "target does not accept {} attachment type(s) the source may produce",
                    missing.len()
                ),
            ));
        }
    }

    for field in target_fields {
        if field.required {
            let mapped = options.field_mappings.values().any(|v| v == &field.name)
                || options.field_mappings.contains_key(&field.name);
            if !mapped {
                issues.push(
                    MigrationError::new(
                        "REQUIRED_TARGET_FIELD_UNMAPPED",
                        ErrorKind::Validation,
                        format!("target field '{}' is required but has no source mapping", field.name),
                    )
                    .with_field(field.name.clone()),
                );
            }
        }
    }

    if options.validation_level == ValidationLevel::None {
        issues.push(MigrationError::warning(
            "VALIDATION_SKIPPED",
            ErrorKind::Validation,
            "validationLevel is 'none': compatibility checks were skipped",
        ));
    }

    issues
}

/// Full pre-flight once test cases are known: field compatibility between
/// declared schemas, then per-item required/length/enum/step/attachment
/// checks.
pub fn validate_migration(
    test_cases: &[TestCase],
    source_fields: &[FieldSchema],
    target_fields: &[FieldSchema],
    target_caps: &ProviderCapabilities,
    options: &MigrationOptions,
) -> Vec<MigrationError> {
    let level = options.validation_level;
    let mut issues = Vec::new();

    if level == ValidationLevel::None {
        issues.push(MigrationError::warning(
            "VALIDATION_SKIPPED",
            ErrorKind::Validation,
            "validationLevel is 'none': compatibility and per-item checks were skipped",
        ));
        return issues;
    }

    for target_field in target_fields {
        let source_name = options
            .field_mappings
            .iter()
            .find(|(_, target)| *target == &target_field.name)
            .map(|(source, _)| source.clone())
            .unwrap_or_else(|| target_field.name.clone());

        let Some(source_field) = find_field(source_fields, &source_name) else {
            if target_field.required {
                issues.push(leveled(
                    MigrationError::new(
                        "REQUIRED_TARGET_FIELD_UNMAPPED",
                        ErrorKind::Validation,
                        format!("target field '{}' is required but has no source field", target_field.name),
                    )
                    .with_field(target_field.name.clone()),
                    level,
                    true,
                ));
            }
            continue;
        };

        if !types_compatible(source_field.data_type, target_field.data_type) {
            issues.push(leveled(
                MigrationError::new(
                    "INCOMPATIBLE_FIELD_TYPE",
                    ErrorKind::Validation,
                    format!(
                        "field '{}' is {:?} on source but {:?} on target",
                        target_field.name, source_field.data_type, target_field.data_type
                    ),
                )
                .with_field(target_field.name.clone()),
                level,
                false,
            ));
        }

        if let (Some(source_values), Some(target_values)) =
            (&source_field.allowed_values, &target_field.allowed_values)
        {
            for value in source_values {
                if !target_values.contains(value) {
                    issues.push(leveled(
                        MigrationError::new(
                            "ENUM_VALUE_OUT_OF_RANGE",
                            ErrorKind::Validation,
                            format!(
                                "value '{value}' for field '{}' is not in target's allowed values",
                                target_field.name
                            ),
                        )
                        .with_field(target_field.name.clone()),
                        level,
                        false,
                    ));
                }
            }
        }
    }

    for test_case in test_cases {
        issues.extend(validate_test_case(test_case, target_fields, target_caps, options, level));
    }

    issues
}

fn validate_test_case(
    test_case: &TestCase,
    target_fields: &[FieldSchema],
    target_caps: &ProviderCapabilities,
    options: &MigrationOptions,
    level: ValidationLevel,
) -> Vec<MigrationError> {
    let mut issues = Vec::new();

    for field in target_fields {
        let value = test_case.get_field(&field.name);

        if field.required && value.is_none() {
            issues.push(leveled(
                MigrationError::new(
                    "REQUIRED_VALUE_MISSING",
                    ErrorKind::Validation,
                    format!("test case '{}' has no value for required field '{}'", test_case.id, field.name),
                )
                .with_field(field.name.clone())
                .with_test_case_id(test_case.id.clone()),
                level,
                true,
            ));
            continue;
        }

        let Some(value) = value else { continue };

        if let (Some(max_len), Some(text)) = (field.max_length, value.as_str()) {
            if text.chars().count() > max_len {
                issues.push(leveled(
                    MigrationError::new(
                        "VALUE_TOO_LONG",
                        ErrorKind::Validation,
                        format!(
                            "test case '{}' field '{}' exceeds target's max length of {max_len}",
                            test_case.id, field.name
                        ),
                    )
                    .with_field(field.name.clone())
                    .with_test_case_id(test_case.id.clone()),
                    level,
                    false,
                ));
            }
        }

        if let (Some(allowed), Some(text)) = (&field.allowed_values, value.as_str()) {
            if !allowed.iter().any(|v| v == text) {
                issues.push(leveled(
                    MigrationError::new(
                        "ENUM_VALUE_OUT_OF_RANGE",
                        ErrorKind::Validation,
                        format!(
                            "test case '{}' field '{}' value '{text}' is not in target's allowed values",
                            test_case.id, field.name
                        ),
                    )
                    .with_field(field.name.clone())
                    .with_test_case_id(test_case.id.clone()),
                    level,
                    false,
                ));
            }
        }
    }

    if test_case.steps.is_empty() {
        issues.push(leveled(
            MigrationError::warning(
                "NO_STEPS",
                ErrorKind::Validation,
                format!("test case '{}' has no steps", test_case.id),
            )
            .with_test_case_id(test_case.id.clone()),
            level,
            false,
        ));
    }

    if options.include_attachments
        && let Some(attachments) = &test_case.attachments
    {
        for attachment in attachments {
            if !target_caps.supports_attachments {
                issues.push(leveled(
                    MigrationError::new(
                        "ATTACHMENTS_UNSUPPORTED",
                        ErrorKind::CapabilityMissing,
                        format!(
                            "test case '{}' has attachment '{}' but target does not support attachments",
                            test_case.id, attachment.file_name
                        ),
                    )
                    .with_test_case_id(test_case.id.clone()),
                    level,
                    false,
                ));
                continue;
            }

            if let Some(limit) = target_caps.max_attachment_size_bytes
                && attachment.size_bytes > limit
            {
                issues.push(leveled(
                    MigrationError::new(
                        "ATTACHMENT_TOO_LARGE",
                        ErrorKind::Validation,
                        format!(
                            "attachment '{}' on test case '{}' is {} bytes, over the target's {limit}-byte limit",
                            attachment.file_name, test_case.id, attachment.size_bytes
                        ),
                    )
                    .with_test_case_id(test_case.id.clone()),
                    level,
                    false,
                ));
            }

            if let Some(types) = &target_caps.supported_attachment_types
                && !types.iter().any(|t| t == &attachment.content_type)
            {
                issues.push(leveled(
                    MigrationError::new(
                        "UNSUPPORTED_ATTACHMENT_TYPE",
                        ErrorKind::Validation,
                        format!(
                            "attachment '{}' on test case '{}' has type '{}' the target does not accept",
                            attachment.file_name, test_case.id, attachment.content_type
                        ),
                    )
                    .with_test_case_id(test_case.id.clone()),
                    level,
                    false,
                ));
            }
        }
    }

    issues
}
