//! Graph Nodes
//!
//! This module defines the node types that live in a type's dependency graph.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

/// Unique identifier for a node in a dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The owning type. Exactly one per graph; it depends on every cell.
    Root,

    /// A declared cell.
    Cell,
}

/// A node in the dependency graph.
///
/// Edges are kept in insertion order so traversal is stable.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Type name for the root, cell name otherwise.
    label: String,

    /// Nodes this node depends on (outgoing edges).
    depends_on: IndexSet<NodeId>,

    /// Nodes that depend on this node (incoming edges).
    depended_by: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind and label.
    pub fn new(kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            label: label.into(),
            depends_on: IndexSet::new(),
            depended_by: IndexSet::new(),
        }
    }

    /// Create the root node of a type.
    pub fn root(type_name: impl Into<String>) -> Self {
        Self::new(NodeKind::Root, type_name)
    }

    /// Create a node for a cell.
    pub fn cell(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Cell, name)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_cell(&self) -> bool {
        self.kind == NodeKind::Cell
    }

    /// Record that this node depends on `node_id`.
    pub(crate) fn add_depends_on(&mut self, node_id: NodeId) {
        self.depends_on.insert(node_id);
    }

    /// Record that `node_id` depends on this node.
    pub(crate) fn add_depended_by(&mut self, node_id: NodeId) {
        self.depended_by.insert(node_id);
    }

    /// Nodes this node depends on.
    pub fn depends_on(&self) -> &IndexSet<NodeId> {
        &self.depends_on
    }

    /// Nodes that depend on this node.
    pub fn depended_by(&self) -> &IndexSet<NodeId> {
        &self.depended_by
    }
}
