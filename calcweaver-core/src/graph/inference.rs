//! Dependency Inference
//!
//! Builds the dependency graph of a declared type. Every computed cell names
//! the siblings its compute function calls; each distinct name becomes one
//! depends-on edge, whatever arguments the call sites pass. The root node of
//! the type depends on every cell.
//!
//! Inference runs once per type, before any instance is evaluated. The graph
//! is checked for cycles and frozen before it is handed out, so a type whose
//! cells reference each other in a loop never gets a graph at all.

use indexmap::IndexMap;
use tracing::debug;

use super::dependency::DependencyGraph;
use super::node::{Node, NodeId};
use crate::cell::TypeDef;
use crate::error::{Error, Result};

/// A frozen graph plus the node assigned to each cell name.
#[derive(Debug)]
pub struct InferredGraph {
    pub graph: DependencyGraph,
    pub nodes: IndexMap<String, NodeId>,
}

/// Build, check and freeze the dependency graph of `def`.
pub fn infer_graph(def: &TypeDef) -> Result<InferredGraph> {
    debug!(type_name = def.name(), "building dependency graph");

    let mut graph = DependencyGraph::new(def.name());
    let root = graph.root();
    let mut nodes = IndexMap::new();

    for cell in def.cells() {
        let id = graph.add_node(Node::cell(cell.name()))?;
        graph.connect(root, id)?;
        nodes.insert(cell.name().to_string(), id);
    }

    for cell in def.cells() {
        let from = nodes[cell.name()];
        let mut has_dependency = false;
        for dependency in cell.dependencies() {
            let Some(&to) = nodes.get(dependency) else {
                return Err(Error::UnknownDependency {
                    cell: format!("{}.{}", def.name(), cell.name()),
                    dependency: dependency.to_string(),
                });
            };
            debug!("{}.{} depends on {}", def.name(), cell.name(), dependency);
            graph.connect(from, to)?;
            has_dependency = true;
        }
        if !has_dependency {
            debug!("{}.{} has no dependency", def.name(), cell.name());
        }
    }

    if let Some(node) = graph.detect_cycle() {
        let cell = graph
            .node(node)
            .map(|node| node.label().to_string())
            .unwrap_or_default();
        return Err(Error::CycleDetected {
            type_name: def.name().to_string(),
            cell,
        });
    }

    graph.freeze();
    Ok(InferredGraph { graph, nodes })
}
