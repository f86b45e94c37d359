//! Graph Export
//!
//! Read-only snapshot of a published type graph: the type name, its cells in
//! declaration order and, for each cell, the names it depends on. The
//! snapshot serializes with serde and renders as Graphviz DOT.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cell::{CellKind, CellType};
use crate::value::Value;

/// Exported view of one type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphExport {
    pub type_name: String,
    pub cells: Vec<CellExport>,
}

/// Exported view of one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellExport {
    pub name: String,
    pub computed: bool,
    /// Default of a constant cell. `None` for computed cells and for
    /// constants whose default is an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub depends_on: Vec<String>,
}

impl GraphExport {
    pub(crate) fn from_type(cell_type: &CellType) -> Self {
        let graph = cell_type.graph();
        let cells = cell_type
            .cells()
            .map(|cell| {
                let (computed, default) = match cell.kind() {
                    CellKind::Computed { .. } => (true, None),
                    CellKind::Constant(default) => (false, default.as_ref().ok().cloned()),
                };
                CellExport {
                    name: cell.name().to_string(),
                    computed,
                    default,
                    depends_on: graph
                        .depends_on(cell.node())
                        .map(|node| node.label().to_string())
                        .collect(),
                }
            })
            .collect();

        Self {
            type_name: cell_type.name().to_string(),
            cells,
        }
    }

    /// Names of all cells, in declaration order.
    pub fn cell_names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|cell| cell.name.as_str())
    }

    pub fn cell(&self, name: &str) -> Option<&CellExport> {
        self.cells.iter().find(|cell| cell.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render as a Graphviz digraph: the type points at every cell, each
    /// cell points at its dependencies.
    pub fn to_dot(&self) -> String {
        let type_name = escape(&self.type_name);
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{type_name}\" {{");
        let _ = writeln!(out, "    // {type_name} dependency graph");
        let _ = writeln!(out, "    \"{type_name}\" [shape=box];");

        for cell in &self.cells {
            let name = escape(&cell.name);
            let label = match &cell.default {
                Some(default) => escape(&format!("{} = {}", cell.name, default)),
                None => name.clone(),
            };
            let _ = writeln!(out, "    \"{type_name}.{name}\" [label=\"{label}\"];");
            let _ = writeln!(out, "    \"{type_name}\" -> \"{type_name}.{name}\";");
        }
        for cell in &self.cells {
            let name = escape(&cell.name);
            for dependency in &cell.depends_on {
                let dependency = escape(dependency);
                let _ = writeln!(
                    out,
                    "    \"{type_name}.{name}\" -> \"{type_name}.{dependency}\";"
                );
            }
        }

        out.push_str("}\n");
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
