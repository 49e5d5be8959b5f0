use std::collections::{BTreeMap, BTreeSet};

use migrator_types::{OperationDefinition, OperationType};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("operation type already present in graph: {0}")]
    DuplicateNode(OperationType),
    #[error("unknown operation type referenced in edge: {0}")]
    UnknownNode(OperationType),
}

/// Nodes = operations, edges = "must run before". Adjacency is tracked
/// in both directions so callers can ask either "what must I wait on"
/// (`predecessors`) or "what waits on me" (`successors`) in O(1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<OperationType, OperationDefinition>,
    /// edge A -> B recorded as successors[A] ∋ B ("A must run before B")
    successors: BTreeMap<OperationType, BTreeSet<OperationType>>,
    /// and predecessors[B] ∋ A
    predecessors: BTreeMap<OperationType, BTreeSet<OperationType>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, op: OperationDefinition) -> Result<(), GraphError> {
        if self.nodes.contains_key(&op.operation_type) {
            return Err(GraphError::DuplicateNode(op.operation_type));
        }
        let ty = op.operation_type.clone();
        self.nodes.insert(ty.clone(), op);
        self.successors.entry(ty.clone()).or_default();
        self.predecessors.entry(ty).or_default();
        Ok(())
    }

    /// Records that `from` must run before `to`. Both nodes must already
    /// exist. Adding a duplicate edge is a no-op.
    pub fn add_dependency(
        &mut self,
        from: &OperationType,
        to: &OperationType,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::UnknownNode(from.clone()));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphError::UnknownNode(to.clone()));
        }
        self.successors.get_mut(from).unwrap().insert(to.clone());
        self.predecessors.get_mut(to).unwrap().insert(from.clone());
        Ok(())
    }

    pub fn contains(&self, ty: &OperationType) -> bool {
        self.nodes.contains_key(ty)
    }

    pub fn node(&self, ty: &OperationType) -> Option<&OperationDefinition> {
        self.nodes.get(ty)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn predecessors_of(&self, ty: &OperationType) -> impl Iterator<Item = &OperationType> {
        self.predecessors
            .get(ty)
            .into_iter()
            .flat_map(|set| set.iter())
    }

    pub fn successors_of(&self, ty: &OperationType) -> impl Iterator<Item = &OperationType> {
        self.successors.get(ty).into_iter().flat_map(|set| set.iter())
    }

    /// Nodes with no predecessors.
    pub fn roots(&self) -> Vec<OperationType> {
        self.nodes
            .keys()
            .filter(|ty| self.predecessors.get(*ty).is_none_or(|s| s.is_empty()))
            .cloned()
            .collect()
    }

    /// Nodes with no successors.
    pub fn leaves(&self) -> Vec<OperationType> {
        self.nodes
            .keys()
            .filter(|ty| self.successors.get(*ty).is_none_or(|s| s.is_empty()))
            .cloned()
            .collect()
    }

    /// White/gray/black DFS cycle detection. Must be consulted before any
    /// topological traversal is trusted.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: BTreeMap<&OperationType, Color> =
            self.nodes.keys().map(|k| (k, Color::White)).collect();

        fn visit<'a>(
            node: &'a OperationType,
            successors: &'a BTreeMap<OperationType, BTreeSet<OperationType>>,
            color: &mut BTreeMap<&'a OperationType, Color>,
        ) -> bool {
            color.insert(node, Color::Gray);
            if let Some(next) = successors.get(node) {
                for succ in next {
                    match color.get(succ) {
                        Some(Color::Gray) => return true,
                        Some(Color::White) | None => {
                            if visit(succ, successors, color) {
                                return true;
                            }
                        }
                        Some(Color::Black) => {}
                    }
                }
            }
            color.insert(node, Color::Black);
            false
        }

        for node in self.nodes.keys() {
            if color.get(node) == Some(&Color::White)
                && visit(node, &self.successors, &mut color)
            {
                return true;
            }
        }
        false
    }

    /// level = 1 + max level of predecessors; nodes with no predecessors
    /// are level 0. Returns `None` if the graph has a cycle (undefined
    /// levels).
    pub fn topological_levels(&self) -> Option<Vec<Vec<OperationType>>> {
        if self.has_cycle() {
            return None;
        }

        let mut level_of: BTreeMap<OperationType, usize> = BTreeMap::new();
        // Kahn's algorithm, tracking level as we peel off indegree-0 nodes.
        let mut indegree: BTreeMap<OperationType, usize> = self
            .nodes
            .keys()
            .map(|k| (k.clone(), self.predecessors.get(k).map_or(0, |s| s.len())))
            .collect();

        let mut ready: BTreeSet<OperationType> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(k, _)| k.clone())
            .collect();

        for node in &ready {
            level_of.insert(node.clone(), 0);
        }

        while !ready.is_empty() {
            let current = ready.iter().next().cloned().unwrap();
            ready.remove(&current);
            let current_level = level_of[&current];

            for succ in self.successors_of(&current).cloned().collect::<Vec<_>>() {
                let deg = indegree.get_mut(&succ).unwrap();
                *deg -= 1;
                let candidate_level = current_level + 1;
                let entry = level_of.entry(succ.clone()).or_insert(candidate_level);
                if candidate_level > *entry {
                    *entry = candidate_level;
                }
                if *deg == 0 {
                    ready.insert(succ);
                }
            }
        }

        let max_level = level_of.values().copied().max().unwrap_or(0);
        let mut levels: Vec<Vec<OperationType>> = vec![Vec::new(); max_level + 1];
        for (ty, level) in level_of {
            levels[level].push(ty);
        }
        for level in &mut levels {
            level.sort();
        }
        Some(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(ty: &str, deps: &[&str]) -> OperationDefinition {
        OperationDefinition::new(ty, ty)
            .depends_on(deps.iter().map(|d| OperationType::from(*d)))
    }

    fn build(defs: Vec<OperationDefinition>) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for d in &defs {
            graph.add_node(d.clone()).unwrap();
        }
        for d in &defs {
            for dep in &d.depends_on {
                graph.add_dependency(dep, &d.operation_type).unwrap();
            }
        }
        graph
    }

    #[test]
    fn duplicate_node_is_an_error() {
        let mut graph = DependencyGraph::new();
        graph.add_node(def("a", &[])).unwrap();
        assert_eq!(
            graph.add_node(def("a", &[])),
            Err(GraphError::DuplicateNode(OperationType::from("a")))
        );
    }

    #[test]
    fn duplicate_edge_is_a_no_op() {
        let mut graph = DependencyGraph::new();
        graph.add_node(def("a", &[])).unwrap();
        graph.add_node(def("b", &[])).unwrap();
        graph
            .add_dependency(&OperationType::from("a"), &OperationType::from("b"))
            .unwrap();
        graph
            .add_dependency(&OperationType::from("a"), &OperationType::from("b"))
            .unwrap();
        assert_eq!(graph.predecessors_of(&OperationType::from("b")).count(), 1);
    }

    #[test]
    fn edge_to_unknown_node_errors() {
        let mut graph = DependencyGraph::new();
        graph.add_node(def("a", &[])).unwrap();
        assert!(matches!(
            graph.add_dependency(&OperationType::from("a"), &OperationType::from("ghost")),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn linear_chain_has_no_cycle_and_levels_increase() {
        let graph = build(vec![def("a", &[]), def("b", &["a"]), def("c", &["b"])]);
        assert!(!graph.has_cycle());
        let levels = graph.topological_levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![OperationType::from("a")]);
        assert_eq!(levels[2], vec![OperationType::from("c")]);
    }

    #[test]
    fn self_and_mutual_cycles_are_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_node(def("a", &[])).unwrap();
        graph.add_node(def("b", &[])).unwrap();
        graph
            .add_dependency(&OperationType::from("a"), &OperationType::from("b"))
            .unwrap();
        graph
            .add_dependency(&OperationType::from("b"), &OperationType::from("a"))
            .unwrap();
        assert!(graph.has_cycle());
        assert!(graph.topological_levels().is_none());
    }

    #[test]
    fn roots_and_leaves() {
        let graph = build(vec![def("a", &[]), def("b", &["a"]), def("c", &["a"])]);
        assert_eq!(graph.roots(), vec![OperationType::from("a")]);
        let mut leaves = graph.leaves();
        leaves.sort();
        assert_eq!(
            leaves,
            vec![OperationType::from("b"), OperationType::from("c")]
        );
    }

    #[test]
    fn diamond_dependency_levels_take_the_longer_path() {
        // a -> b -> d, a -> c -> d: d must be after both b and c (level 2).
        let graph = build(vec![
            def("a", &[]),
            def("b", &["a"]),
            def("c", &["a"]),
            def("d", &["b", "c"]),
        ]);
        let levels = graph.topological_levels().unwrap();
        assert_eq!(levels[2], vec![OperationType::from("d")]);
    }
}
