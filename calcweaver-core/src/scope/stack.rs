//! Override Stack
//!
//! Scopes nest, so overrides live on a stack of layers. Writes only ever go
//! to the topmost layer; older layers belong to enclosing scopes and are
//! left alone until those scopes exit. Reads come in two flavors:
//!
//! - layer-local: only the topmost layer is consulted
//! - layer-spanning: layers are searched newest to oldest
//!
//! Depths returned by the spanning lookups count from the bottom (0 is the
//! oldest layer), so a larger depth means a newer layer.

use super::layer::OverrideLayer;
use crate::cell::{ArgKey, ObjectId, Outcome};
use crate::graph::NodeId;

/// Stack of override layers, empty outside any scope.
#[derive(Debug, Default)]
pub struct OverrideStack {
    layers: Vec<OverrideLayer>,
}

impl OverrideStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new empty layer. Returns the new depth.
    pub fn push(&mut self, label: impl Into<String>) -> usize {
        self.layers.push(OverrideLayer::new(label));
        self.layers.len()
    }

    /// Remove and discard the topmost layer.
    pub fn pop(&mut self) -> Option<OverrideLayer> {
        self.layers.pop()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn top(&self) -> Option<&OverrideLayer> {
        self.layers.last()
    }

    /// Layers from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &OverrideLayer> {
        self.layers.iter().rev()
    }

    /// Override of `(cell, object, key)` in the topmost layer only.
    pub fn top_lookup(&self, cell: NodeId, object: ObjectId, key: &ArgKey) -> Option<Outcome> {
        self.top()?.get(cell, object, key).cloned()
    }

    /// Newest layer holding an override of `(cell, object, key)`.
    pub fn newest_match(
        &self,
        cell: NodeId,
        object: ObjectId,
        key: &ArgKey,
    ) -> Option<(usize, Outcome)> {
        self.layers
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, layer)| layer.get(cell, object, key).map(|o| (depth, o.clone())))
    }

    /// Depth of the newest layer holding any override of `cell` for `object`.
    pub fn newest_touching(&self, cell: NodeId, object: ObjectId) -> Option<usize> {
        self.layers
            .iter()
            .rposition(|layer| layer.touches(cell, object))
    }

    /// Record an override in the topmost layer. Returns `false` outside any scope.
    pub fn pin(&mut self, cell: NodeId, object: ObjectId, key: ArgKey, outcome: Outcome) -> bool {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.insert(cell, object, key, outcome);
                true
            }
            None => false,
        }
    }

    /// Drop overrides of `cell` for `object` from the topmost layer only.
    pub fn remove_in_top(&mut self, cell: NodeId, object: ObjectId) -> usize {
        self.layers
            .last_mut()
            .map_or(0, |layer| layer.remove(cell, object))
    }
}
