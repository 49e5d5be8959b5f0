//! The plan builder: turns a [`MigrateTestCasesInput`] into the
//! operation set the rest of the core schedules and runs.
//! The policy is deterministic — the same input always produces the same
//! plan — so `migrator-graph` sees a stable DAG on every run.

use std::collections::BTreeMap;

use migrator_types::{MigrateTestCasesInput, OperationDefinition, OperationType};
use sha2::{Digest, Sha256};

pub const AUTHENTICATE_SOURCE: &str = "authenticate_source";
pub const AUTHENTICATE_TARGET: &str = "authenticate_target";
pub const GET_SOURCE_PROJECT: &str = "get_source_project";
pub const GET_TARGET_PROJECT: &str = "get_target_project";
pub const GET_TEST_CASES: &str = "get_test_cases";
pub const CREATE_TEST_CASE: &str = "create_test_case";

pub fn get_test_case_op(id: &str) -> OperationType {
    OperationType::from(format!("get_test_case_{id}").as_str())
}

pub fn get_attachments_op(id: &str) -> OperationType {
    OperationType::from(format!("get_attachments_{id}").as_str())
}

/// Builds the operation list for one migration run. Always returns the
/// same four connection/project operations plus either per-id fetches or
/// one bulk fetch, converging on a single terminal `create_test_case`.
pub fn build_plan(input: &MigrateTestCasesInput) -> Vec<OperationDefinition> {
    let mut ops = Vec::new();

    ops.push(
        OperationDefinition::new(AUTHENTICATE_SOURCE, "Authenticate with source provider")
            .requires_params(["sourceSystemId".to_string()]),
    );
    ops.push(
        OperationDefinition::new(AUTHENTICATE_TARGET, "Authenticate with target provider")
            .requires_params(["targetSystemId".to_string()]),
    );
    ops.push(
        OperationDefinition::new(GET_SOURCE_PROJECT, "Fetch source project")
            .depends_on([OperationType::from(AUTHENTICATE_SOURCE)])
            .requires_params(["projectKey".to_string()]),
    );
    ops.push(
        OperationDefinition::new(GET_TARGET_PROJECT, "Fetch target project")
            .depends_on([OperationType::from(AUTHENTICATE_TARGET)])
            .requires_params(["projectKey".to_string()]),
    );

    let mut fetch_dependencies: Vec<OperationType> = Vec::new();

    if input.test_case_ids.is_empty() {
        ops.push(
            OperationDefinition::new(GET_TEST_CASES, "Fetch all test cases in project")
                .depends_on([OperationType::from(GET_SOURCE_PROJECT)])
                .requires_params(["projectKey".to_string()]),
        );
        fetch_dependencies.push(OperationType::from(GET_TEST_CASES));
    } else {
        for id in &input.test_case_ids {
            let op_type = get_test_case_op(id);
            ops.push(
                OperationDefinition::new(op_type.clone(), format!("Fetch test case {id}"))
                    .depends_on([OperationType::from(GET_SOURCE_PROJECT)])
                    .requires_params(["projectKey".to_string(), "testCaseId".to_string()]),
            );
            fetch_dependencies.push(op_type.clone());

            if input.options.include_attachments {
                ops.push(
                    OperationDefinition::new(
                        get_attachments_op(id),
                        format!("Fetch attachments for {id}"),
                    )
                    .depends_on([op_type]),
                );
            }
        }
    }

    let mut create_deps = vec![
        OperationType::from(AUTHENTICATE_TARGET),
        OperationType::from(GET_TARGET_PROJECT),
    ];
    create_deps.extend(fetch_dependencies);

    ops.push(
        OperationDefinition::new(CREATE_TEST_CASE, "Create test cases in target")
            .depends_on(create_deps)
            .requires_params(["projectKey".to_string()]),
    );

    ops
}

/// Like [`build_plan`], but also folds in operations the two providers
/// publish through their API contracts. Provider-declared operations keep
/// whatever `dependsOn` edges they declare — bad provider metadata (a
/// cycle, a dangling reference) is caught downstream by the resolver, not
/// silently repaired here.
pub fn build_plan_with_contracts(
    input: &MigrateTestCasesInput,
    source_contract: &BTreeMap<OperationType, OperationDefinition>,
    target_contract: &BTreeMap<OperationType, OperationDefinition>,
) -> Vec<OperationDefinition> {
    let mut ops = build_plan(input);
    let known: std::collections::BTreeSet<OperationType> =
        ops.iter().map(|o| o.operation_type.clone()).collect();
    for def in source_contract.values().chain(target_contract.values()) {
        if !known.contains(&def.operation_type) {
            ops.push(def.clone());
        }
    }
    ops
}

/// Stable identity for a plan: same input, same operations, same id.
/// Lets a resumed run prove it is continuing the plan it started with.
pub fn compute_plan_id(ops: &[OperationDefinition]) -> String {
    let mut hasher = Sha256::new();
    for op in ops {
        hasher.update(op.operation_type.as_str().as_bytes());
        hasher.update(b"<-");
        for dep in &op.depends_on {
            hasher.update(dep.as_str().as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
