//! The resolved dependency graph: nodes are installed packages, edges are
//! declared dependencies. Built on `petgraph::graph::DiGraph` the way the
//! teacher's `DependencyGraph` is, but keyed by canonical install path
//! (first-wins conflict resolution) rather than `(resource_type, name, source)`.

use crate::lockfile::LockedDependency;
use crate::reference::DependencyRef;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// A node that has been fetched and attached to the graph.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub canonical_key: String,
    pub dep_ref: DependencyRef,
    pub depth: u32,
    pub parent: Option<String>,
    pub resolved_commit: String,
}

/// A diagnostic recorded when a second edge targets an already-resolved
/// canonical key (first-wins; the edge is kept for diagnostics per §4.3).
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub canonical_key: String,
    pub rejected_parent: Option<String>,
}

/// Directed graph of resolved packages, indexed by canonical install path.
pub struct DependencyGraph {
    graph: DiGraph<ResolvedNode, ()>,
    node_map: HashMap<String, NodeIndex>,
    pub conflicts: Vec<ConflictRecord>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.node_map.contains_key(key)
    }

    /// Insert a freshly-resolved node, wiring an edge from its parent if any.
    pub fn insert(&mut self, node: ResolvedNode) {
        let key = node.canonical_key.clone();
        let parent = node.parent.clone();
        let idx = self.graph.add_node(node);
        self.node_map.insert(key, idx);

        if let Some(parent_key) = parent
            && let Some(&parent_idx) = self.node_map.get(&parent_key)
        {
            self.graph.add_edge(parent_idx, idx, ());
        }
    }

    /// Record a diagnostic edge for a dependency that resolved to an
    /// already-installed canonical key (cycle, or a second distinct ref
    /// colliding on the same key). The existing node always wins.
    pub fn record_conflict_edge(&mut self, key: &str, rejected_parent: Option<String>) {
        if let (Some(parent_key), Some(&idx)) =
            (rejected_parent.clone(), self.node_map.get(key))
            && let Some(&parent_idx) = self.node_map.get(&parent_key)
        {
            self.graph.add_edge(parent_idx, idx, ());
        }
        self.conflicts.push(ConflictRecord {
            canonical_key: key.to_string(),
            rejected_parent,
        });
    }

    pub fn node(&self, key: &str) -> Option<&ResolvedNode> {
        self.node_map.get(key).map(|&idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.graph.node_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Project the graph into the serialized lockfile form.
    pub fn to_locked_dependencies(&self) -> Vec<LockedDependency> {
        self.nodes()
            .map(|node| LockedDependency {
                repo_url: node.dep_ref.repo_path.join("/"),
                host: node.dep_ref.host.clone(),
                resolved_commit: node.resolved_commit.clone(),
                resolved_ref: node.dep_ref.reference.clone().unwrap_or_else(|| "main".to_string()),
                version: None,
                virtual_path: node.dep_ref.virtual_path.clone(),
                is_virtual: node.dep_ref.is_virtual(),
                depth: node.depth,
                resolved_by: node.parent.clone().unwrap_or_else(|| "root".to_string()),
            })
            .collect()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Environment;
    use std::collections::HashMap as StdHashMap;

    fn dep_ref(s: &str) -> DependencyRef {
        let env = Environment::new("/tmp", StdHashMap::new());
        DependencyRef::parse(s, &env).unwrap()
    }

    fn node(key: &str, depth: u32, parent: Option<&str>) -> ResolvedNode {
        ResolvedNode {
            canonical_key: key.to_string(),
            dep_ref: dep_ref("owner/repo"),
            depth,
            parent: parent.map(String::from),
            resolved_commit: "a".repeat(40),
        }
    }

    #[test]
    fn insert_then_contains_key() {
        let mut graph = DependencyGraph::new();
        graph.insert(node("owner/repo", 1, None));
        assert!(graph.contains_key("owner/repo"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn conflict_edge_is_recorded_without_creating_a_second_node() {
        let mut graph = DependencyGraph::new();
        graph.insert(node("owner/repo", 1, None));
        graph.record_conflict_edge("owner/repo", Some("some/parent".to_string()));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.conflicts.len(), 1);
    }

    #[test]
    fn to_locked_dependencies_preserves_depth_and_commit() {
        let mut graph = DependencyGraph::new();
        graph.insert(node("owner/repo", 2, Some("root".to_string())));
        let locked = graph.to_locked_dependencies();
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].depth, 2);
        assert_eq!(locked[0].resolved_by, "root");
    }
}
