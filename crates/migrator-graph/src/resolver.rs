use std::collections::BTreeSet;

use migrator_types::{OperationDefinition, OperationType};
use thiserror::Error;

use crate::graph::{DependencyGraph, GraphError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MissingDependencyError {
    #[error("operation '{operation}' depends on unknown operation '{missing}'")]
    UnknownDependency {
        operation: OperationType,
        missing: OperationType,
    },
    #[error("duplicate operation type in plan: {0}")]
    DuplicateOperation(OperationType),
}

/// Builds a [`DependencyGraph`] from a flat operation list, rejecting
/// any `dependsOn` reference that doesn't resolve to another operation
/// in the same list before a single edge is added.
pub fn build_dependency_graph(
    definitions: &[OperationDefinition],
) -> Result<DependencyGraph, MissingDependencyError> {
    let known: BTreeSet<&OperationType> =
        definitions.iter().map(|d| &d.operation_type).collect();

    let mut graph = DependencyGraph::new();
    for def in definitions {
        for dep in &def.depends_on {
            if !known.contains(dep) {
                return Err(MissingDependencyError::UnknownDependency {
                    operation: def.operation_type.clone(),
                    missing: dep.clone(),
                });
            }
        }
        match graph.add_node(def.clone()) {
            Ok(()) => {}
            Err(GraphError::DuplicateNode(ty)) => {
                return Err(MissingDependencyError::DuplicateOperation(ty));
            }
            Err(GraphError::UnknownNode(ty)) => {
                // unreachable: add_node never references another node
                return Err(MissingDependencyError::UnknownDependency {
                    operation: def.operation_type.clone(),
                    missing: ty,
                });
            }
        }
    }
    for def in definitions {
        for dep in &def.depends_on {
            graph
                .add_dependency(dep, &def.operation_type)
                .expect("both endpoints were just inserted");
        }
    }
    Ok(graph)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub unreachable: Vec<OperationType>,
}

/// Checks a graph for cycles and for nodes unreachable from any root.
/// Cycle detection short-circuits: a cyclic graph reports no
/// reachability errors because reachability is undefined for it.
pub fn validate_dependencies(graph: &DependencyGraph) -> ValidationReport {
    let mut report = ValidationReport {
        valid: true,
        errors: Vec::new(),
        unreachable: Vec::new(),
    };

    if graph.has_cycle() {
        report.valid = false;
        report.errors.push("dependency graph contains a cycle".to_string());
        return report;
    }

    let roots = graph.roots();
    let mut visited: BTreeSet<OperationType> = BTreeSet::new();
    let mut stack: Vec<OperationType> = roots.clone();
    while let Some(node) = stack.pop() {
        if visited.insert(node.clone()) {
            stack.extend(graph.successors_of(&node).cloned());
        }
    }

    for def in graph.nodes() {
        if !visited.contains(&def.operation_type) {
            report.unreachable.push(def.operation_type.clone());
        }
    }
    if !report.unreachable.is_empty() {
        report.valid = false;
        report.errors.push(format!(
            "{} operation(s) unreachable from any root",
            report.unreachable.len()
        ));
    }
    report
}

/// Deterministic topological order: within a level, ties break
/// lexicographically by operation type so runs are reproducible. Returns
/// an empty vector if the graph has a cycle; callers must check
/// [`validate_dependencies`] first to distinguish "cyclic" from
/// "genuinely has zero operations".
pub fn resolve_execution_order(graph: &DependencyGraph) -> Vec<OperationType> {
    let Some(levels) = graph.topological_levels() else {
        return Vec::new();
    };
    levels.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(ty: &str, deps: &[&str]) -> OperationDefinition {
        OperationDefinition::new(ty, ty)
            .depends_on(deps.iter().map(|d| OperationType::from(*d)))
    }

    #[test]
    fn unknown_dependency_is_rejected_before_graph_construction() {
        let defs = vec![def("a", &["ghost"])];
        assert_eq!(
            build_dependency_graph(&defs),
            Err(MissingDependencyError::UnknownDependency {
                operation: OperationType::from("a"),
                missing: OperationType::from("ghost"),
            })
        );
    }

    #[test]
    fn duplicate_operation_type_is_rejected() {
        let defs = vec![def("a", &[]), def("a", &[])];
        assert_eq!(
            build_dependency_graph(&defs),
            Err(MissingDependencyError::DuplicateOperation(OperationType::from(
                "a"
            )))
        );
    }

    #[test]
    fn execution_order_breaks_ties_lexicographically_within_a_level() {
        let defs = vec![def("b", &[]), def("a", &[]), def("c", &[])];
        let graph = build_dependency_graph(&defs).unwrap();
        let order = resolve_execution_order(&graph);
        assert_eq!(
            order,
            vec![
                OperationType::from("a"),
                OperationType::from("b"),
                OperationType::from("c"),
            ]
        );
    }

    #[test]
    fn cyclic_graph_resolves_to_empty_order_and_invalid_report() {
        let defs = vec![def("a", &["b"]), def("b", &["a"])];
        let graph = build_dependency_graph(&defs).unwrap();
        assert!(resolve_execution_order(&graph).is_empty());
        let report = validate_dependencies(&graph);
        assert!(!report.valid);
    }

    #[test]
    fn valid_acyclic_graph_is_fully_reachable_from_roots() {
        let defs = vec![def("a", &[]), def("b", &["a"]), def("c", &["b"])];
        let graph = build_dependency_graph(&defs).unwrap();
        let report = validate_dependencies(&graph);
        assert!(report.valid);
        assert!(report.unreachable.is_empty());
    }

    #[test]
    fn execution_order_respects_dependencies() {
        let defs = vec![
            def("d", &["b", "c"]),
            def("b", &["a"]),
            def("c", &["a"]),
            def("a", &[]),
        ];
        let graph = build_dependency_graph(&defs).unwrap();
        let order = resolve_execution_order(&graph);
        let pos = |ty: &str| order.iter().position(|t| t.as_str() == ty).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }
}
