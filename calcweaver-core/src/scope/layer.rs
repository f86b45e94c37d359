//! Override Layers
//!
//! A layer holds the overrides recorded while one scope is active:
//! cell → object → argument tuple → pinned outcome. Layers are thrown away
//! whole when their scope exits.

use std::collections::HashMap;

use crate::cell::{ArgKey, ObjectId, Outcome};
use crate::graph::NodeId;

/// Overrides recorded in one scope.
#[derive(Debug, Default)]
pub struct OverrideLayer {
    label: String,
    entries: HashMap<NodeId, HashMap<ObjectId, HashMap<ArgKey, Outcome>>>,
}

impl OverrideLayer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: HashMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Override for exactly `(cell, object, key)`.
    pub fn get(&self, cell: NodeId, object: ObjectId, key: &ArgKey) -> Option<&Outcome> {
        self.entries.get(&cell)?.get(&object)?.get(key)
    }

    /// Whether the layer holds any override of `cell` for `object`.
    pub fn touches(&self, cell: NodeId, object: ObjectId) -> bool {
        self.entries
            .get(&cell)
            .and_then(|objects| objects.get(&object))
            .is_some_and(|keys| !keys.is_empty())
    }

    pub fn insert(&mut self, cell: NodeId, object: ObjectId, key: ArgKey, outcome: Outcome) {
        self.entries
            .entry(cell)
            .or_default()
            .entry(object)
            .or_default()
            .insert(key, outcome);
    }

    /// Drop every override of `cell` for `object`. Returns how many went.
    pub fn remove(&mut self, cell: NodeId, object: ObjectId) -> usize {
        let Some(objects) = self.entries.get_mut(&cell) else {
            return 0;
        };
        let removed = objects.remove(&object).map_or(0, |keys| keys.len());
        if objects.is_empty() {
            self.entries.remove(&cell);
        }
        removed
    }

    /// Total number of pinned outcomes.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(HashMap::values)
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
