//! Dependency Graph
//!
//! This module implements the per-type graph of cell dependencies.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph where:
//!
//! - One root node represents the owning type and depends on every cell
//! - Every other node represents a declared cell
//! - An edge from A to B means A's compute function calls B
//!
//! Edges are stored in both directions. Eager pre-evaluation follows
//! depends-on edges; invalidation follows depended-by edges to find every
//! cell downstream of a tweaked one.
//!
//! Graphs are built once per type by [`infer_graph`] and frozen before use.

mod dependency;
mod inference;
mod node;

pub use dependency::DependencyGraph;
pub use inference::{infer_graph, InferredGraph};
pub use node::{Node, NodeId, NodeKind};
