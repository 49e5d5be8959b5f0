//! # migrator-graph
//!
//! The dependency graph and operation resolver: turns a flat list of
//! [`OperationDefinition`](migrator_types::OperationDefinition)s into a
//! validated DAG and a deterministic execution order. This is the only
//! crate that knows how to schedule operations relative to each other; it
//! has no opinion on how an operation actually runs.

mod graph;
mod resolver;

pub use graph::{DependencyGraph, GraphError};
pub use resolver::{
    build_dependency_graph, resolve_execution_order, validate_dependencies,
    MissingDependencyError, ValidationReport,
};
