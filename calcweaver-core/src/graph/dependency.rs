//! Dependency Graph
//!
//! One graph per declared type: a root node for the type plus one node per
//! cell. The root depends on every cell; cells depend on the siblings their
//! compute functions call.
//!
//! # Lifecycle
//!
//! 1. Nodes and edges are added while the type is being declared.
//! 2. [`DependencyGraph::detect_cycle`] runs a depth-first search from the root.
//! 3. [`DependencyGraph::freeze`] makes the edge sets immutable. Any later
//!    mutation returns [`Error::GraphFrozen`].
//!
//! Once frozen the graph is only traversed: eager pre-evaluation walks
//! depends-on edges and invalidation walks depended-by edges.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use super::node::{Node, NodeId, NodeKind};
use crate::error::{Error, Result};

/// Directed graph of cell dependencies for one type.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// The node wrapping the owning type.
    root: NodeId,

    /// All nodes in the graph, in insertion order.
    nodes: IndexMap<NodeId, Node>,

    /// Set once the cycle check passed.
    frozen: bool,
}

impl DependencyGraph {
    /// Create a graph holding only the root node for `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        let root = Node::root(type_name);
        let root_id = root.id();
        let mut nodes = IndexMap::new();
        nodes.insert(root_id, root);
        Self {
            root: root_id,
            nodes,
            frozen: false,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Name of the owning type.
    pub fn type_name(&self) -> &str {
        self.nodes
            .get(&self.root)
            .map(Node::label)
            .unwrap_or_default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        self.ensure_mutable()?;
        let id = node.id();
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Add an edge: `from` depends on `to`.
    ///
    /// Records the depends-on edge on `from` and the mirror depended-by edge
    /// on `to`. Both nodes must already be in the graph.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.ensure_mutable()?;
        if let Some(missing) = [from, to].into_iter().find(|id| !self.nodes.contains_key(id)) {
            return Err(Error::UnknownNode { node: missing.raw() });
        }
        if let Some(node) = self.nodes.get_mut(&from) {
            node.add_depends_on(to);
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.add_depended_by(from);
        }
        Ok(())
    }

    /// Search for a cycle reachable from the root.
    ///
    /// Returns the first node found while it was still on the recursion
    /// stack, or `None` if the graph is acyclic.
    pub fn detect_cycle(&self) -> Option<NodeId> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        self.visit(self.root, &mut visited, &mut on_stack)
    }

    fn visit(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        on_stack: &mut HashSet<NodeId>,
    ) -> Option<NodeId> {
        visited.insert(node_id);
        on_stack.insert(node_id);

        if let Some(node) = self.nodes.get(&node_id) {
            for &next in node.depends_on() {
                if on_stack.contains(&next) {
                    return Some(next);
                }
                if !visited.contains(&next) {
                    if let Some(found) = self.visit(next, visited, on_stack) {
                        return Some(found);
                    }
                }
            }
        }

        on_stack.remove(&node_id);
        None
    }

    /// Make the graph immutable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(Error::GraphFrozen);
        }
        Ok(())
    }

    /// Get a node by ID.
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Find a cell node by its name.
    pub fn cell_by_name(&self, name: &str) -> Option<&Node> {
        self.cells().find(|node| node.label() == name)
    }

    /// Cell nodes in declaration order.
    pub fn cells(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.is_cell())
    }

    /// Cells that `node_id` directly depends on.
    pub fn depends_on(&self, node_id: NodeId) -> impl Iterator<Item = &Node> {
        self.nodes
            .get(&node_id)
            .into_iter()
            .flat_map(|node| node.depends_on().iter())
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.is_cell())
    }

    /// `node_id` followed by every cell that depends on it, directly or
    /// transitively, in breadth-first order.
    pub fn downstream_closure(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut closure = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(node_id);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            if node.kind() == NodeKind::Root {
                continue;
            }
            closure.push(current);
            for &dependent in node.depended_by() {
                if !visited.contains(&dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        closure
    }

    /// Total number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
