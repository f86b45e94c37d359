//! Cell Declarations and Descriptors
//!
//! A type is declared once as a [`TypeDef`]: a name plus an ordered set of
//! [`CellDef`]s. When the type is first declared with a runtime, the
//! declaration is turned into a [`CellType`]: the frozen dependency graph and
//! one [`MemoCell`] per declared cell.
//!
//! # Memoization
//!
//! A `MemoCell` is shared by every instance of its type. Its base cache is
//! keyed first by object identity and then by the normalized argument tuple,
//! so two instances never see each other's values. Cached outcomes can be
//! errors: a compute function that failed is remembered as a poisoned
//! placeholder and re-raised until the entry is cleared.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::args::{ArgKey, Args};
use super::handle::{ComputeContext, ObjectId};
use crate::error::{BoxError, Error, Result};
use crate::graph::{infer_graph, DependencyGraph, NodeId};
use crate::value::Value;

/// The result a cell settles on: a value or a captured error.
pub type Outcome = Result<Value>;

/// Signature of a compute function.
pub type ComputeFn =
    Arc<dyn Fn(&ComputeContext<'_>, &Args) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// How a cell produces its value.
#[derive(Clone)]
pub enum CellKind {
    /// Backed by a compute function needing at least `arity` arguments.
    Computed { compute: ComputeFn, arity: usize },

    /// Always the declared default, unless overridden.
    Constant(Outcome),
}

impl fmt::Debug for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Computed { arity, .. } => f
                .debug_struct("Computed")
                .field("arity", arity)
                .finish_non_exhaustive(),
            CellKind::Constant(default) => f.debug_tuple("Constant").field(default).finish(),
        }
    }
}

/// Declaration of a single cell.
#[derive(Debug, Clone)]
pub struct CellDef {
    name: String,
    kind: CellKind,
    dependencies: IndexSet<String>,
}

impl CellDef {
    /// A cell backed by a compute function.
    pub fn computed<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&ComputeContext<'_>, &Args) -> std::result::Result<Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            kind: CellKind::Computed {
                compute: Arc::new(compute),
                arity: 0,
            },
            dependencies: IndexSet::new(),
        }
    }

    /// A cell holding a constant default.
    pub fn constant(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind: CellKind::Constant(Ok(value.into())),
            dependencies: IndexSet::new(),
        }
    }

    /// A cell whose default is a poisoned placeholder.
    pub fn constant_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let err = Error::Poisoned {
            cell: name.clone(),
            message: message.into(),
        };
        Self {
            name,
            kind: CellKind::Constant(Err(err)),
            dependencies: IndexSet::new(),
        }
    }

    /// Declare the sibling cells the compute function calls.
    ///
    /// Ignored for constant cells.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    /// Minimum number of arguments the compute function needs.
    pub fn arity(mut self, required: usize) -> Self {
        if let CellKind::Computed { arity, .. } = &mut self.kind {
            *arity = required;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.kind, CellKind::Computed { .. })
    }

    /// Declared sibling names. Empty for constant cells.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        let deps = if self.is_computed() {
            Some(self.dependencies.iter().map(String::as_str))
        } else {
            None
        };
        deps.into_iter().flatten()
    }
}

/// Identity of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey(u64);

impl TypeKey {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Declaration of a type and its cells.
///
/// Cloning keeps the identity: clones declare the same type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    key: TypeKey,
    name: String,
    cells: IndexMap<String, CellDef>,
}

impl TypeDef {
    /// Start declaring a type.
    pub fn builder(name: impl Into<String>) -> TypeBuilder {
        TypeBuilder {
            name: name.into(),
            cells: Vec::new(),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cells in declaration order.
    pub fn cells(&self) -> impl Iterator<Item = &CellDef> {
        self.cells.values()
    }

    pub fn cell(&self, name: &str) -> Option<&CellDef> {
        self.cells.get(name)
    }
}

/// Builder for [`TypeDef`].
pub struct TypeBuilder {
    name: String,
    cells: Vec<CellDef>,
}

impl TypeBuilder {
    /// Add a cell declaration.
    pub fn cell(mut self, cell: CellDef) -> Self {
        self.cells.push(cell);
        self
    }

    /// Shorthand for a constant cell.
    pub fn constant(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cell(CellDef::constant(name, value))
    }

    /// Shorthand for an argument-less computed cell.
    pub fn computed<I, S, F>(self, name: impl Into<String>, depends_on: I, compute: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&ComputeContext<'_>, &Args) -> std::result::Result<Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.cell(CellDef::computed(name, compute).depends_on(depends_on))
    }

    /// Finish the declaration. Fails if a cell name repeats.
    pub fn build(self) -> Result<TypeDef> {
        let mut cells = IndexMap::with_capacity(self.cells.len());
        for cell in self.cells {
            if cells.contains_key(cell.name()) {
                return Err(Error::DuplicateCell {
                    type_name: self.name,
                    cell: cell.name,
                });
            }
            cells.insert(cell.name.clone(), cell);
        }
        Ok(TypeDef {
            key: TypeKey::new(),
            name: self.name,
            cells,
        })
    }
}

/// Per-type descriptor of one cell, shared by all instances.
pub struct MemoCell {
    /// Node of this cell in its type's graph. Doubles as the cell identity.
    node: NodeId,
    name: String,
    /// `Type.cell`, used in errors and logs.
    qualified: String,
    kind: CellKind,
    dependencies: IndexSet<String>,
    base_cache: Mutex<HashMap<ObjectId, HashMap<ArgKey, Outcome>>>,
}

impl MemoCell {
    fn new(node: NodeId, type_name: &str, def: &CellDef) -> Self {
        Self {
            node,
            name: def.name.clone(),
            qualified: format!("{}.{}", type_name, def.name),
            kind: def.kind.clone(),
            dependencies: def.dependencies().map(str::to_string).collect(),
            base_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    /// Whether `name` is a declared dependency of this cell.
    pub fn declares(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }

    /// Cached outcome for `(object, key)`.
    pub fn cached(&self, object: ObjectId, key: &ArgKey) -> Option<Outcome> {
        self.base_cache
            .lock()
            .get(&object)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    pub(crate) fn store(&self, object: ObjectId, key: ArgKey, outcome: Outcome) {
        self.base_cache
            .lock()
            .entry(object)
            .or_default()
            .insert(key, outcome);
    }

    /// Drop every cached outcome of `object`. Returns whether any existed.
    pub(crate) fn forget(&self, object: ObjectId) -> bool {
        self.base_cache.lock().remove(&object).is_some()
    }

    /// Number of cached argument tuples for `object`.
    pub fn cached_len(&self, object: ObjectId) -> usize {
        self.base_cache
            .lock()
            .get(&object)
            .map_or(0, HashMap::len)
    }
}

impl fmt::Debug for MemoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCell")
            .field("name", &self.qualified)
            .field("kind", &self.kind)
            .field("cached_objects", &self.base_cache.lock().len())
            .finish()
    }
}

/// A published type: its frozen graph and its cell descriptors.
#[derive(Debug)]
pub struct CellType {
    key: TypeKey,
    graph: DependencyGraph,
    cells: IndexMap<NodeId, Arc<MemoCell>>,
    by_name: HashMap<String, NodeId>,
}

impl CellType {
    /// Infer the graph of `def` and build its descriptors.
    pub(crate) fn from_def(def: &TypeDef) -> Result<Self> {
        let inferred = infer_graph(def)?;
        let mut cells = IndexMap::with_capacity(inferred.nodes.len());
        let mut by_name = HashMap::with_capacity(inferred.nodes.len());

        for cell in def.cells() {
            if let Some(&node) = inferred.nodes.get(cell.name()) {
                cells.insert(node, Arc::new(MemoCell::new(node, def.name(), cell)));
                by_name.insert(cell.name().to_string(), node);
            }
        }

        Ok(Self {
            key: def.key(),
            graph: inferred.graph,
            cells,
            by_name,
        })
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        self.graph.type_name()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Descriptors in declaration order.
    pub fn cells(&self) -> impl Iterator<Item = &Arc<MemoCell>> {
        self.cells.values()
    }

    pub fn cell(&self, name: &str) -> Option<&Arc<MemoCell>> {
        self.by_name.get(name).and_then(|node| self.cells.get(node))
    }

    pub fn cell_by_node(&self, node: NodeId) -> Option<&Arc<MemoCell>> {
        self.cells.get(&node)
    }

    /// Cells that `cell` directly depends on.
    pub fn upstream<'a>(&'a self, cell: &MemoCell) -> impl Iterator<Item = &'a Arc<MemoCell>> + 'a {
        self.graph
            .depends_on(cell.node())
            .filter_map(move |node| self.cells.get(&node.id()))
    }

    /// Descriptors for `cell` and everything downstream of it.
    pub fn downstream(&self, cell: &MemoCell) -> Vec<&Arc<MemoCell>> {
        self.graph
            .downstream_closure(cell.node())
            .into_iter()
            .filter_map(|node| self.cells.get(&node))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> TypeDef {
        TypeDef::builder("Dummy")
            .constant("D", 20)
            .computed("A", [] as [&str; 0], |_, _| Ok(Value::from(10)))
            .computed("B", ["A"], |ctx, _| {
                let a = ctx.get("A")?.as_int()?;
                Ok(Value::from(a * a))
            })
            .computed("C", ["A", "B", "D", "A"], |ctx, _| {
                Ok(Value::from(
                    ctx.get("A")?.as_int()? + ctx.get("B")?.as_int()? + ctx.get("D")?.as_int()?,
                ))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_cells_are_rejected() {
        let err = TypeDef::builder("Dup")
            .constant("x", 1)
            .constant("x", 2)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCell { .. }));
    }

    #[test]
    fn dependencies_dedupe_and_keep_order() {
        let def = dummy();
        let deps: Vec<_> = def.cell("C").unwrap().dependencies().collect();
        assert_eq!(deps, vec!["A", "B", "D"]);
    }

    #[test]
    fn constants_report_no_dependencies() {
        let cell = CellDef::constant("k", 1).depends_on(["other"]);
        assert_eq!(cell.dependencies().count(), 0);
        assert!(!cell.is_computed());
    }

    #[test]
    fn arity_only_applies_to_computed_cells() {
        let cell = CellDef::computed("f", |_, _| Ok(Value::Null)).arity(2);
        assert!(matches!(cell.kind(), CellKind::Computed { arity: 2, .. }));

        let cell = CellDef::constant("k", 1).arity(2);
        assert!(matches!(cell.kind(), CellKind::Constant(Ok(Value::Int(1)))));
    }

    #[test]
    fn clones_share_the_type_key() {
        let def = dummy();
        assert_eq!(def.key(), def.clone().key());
        assert_ne!(def.key(), dummy().key());
    }

    #[test]
    fn cell_type_wires_upstream_and_downstream() {
        let ty = CellType::from_def(&dummy()).unwrap();
        let a = ty.cell("A").unwrap();
        let c = ty.cell("C").unwrap();

        let upstream: Vec<_> = ty.upstream(c).map(|cell| cell.name()).collect();
        assert_eq!(upstream, vec!["A", "B", "D"]);

        let downstream: Vec<_> = ty.downstream(a).into_iter().map(|cell| cell.name()).collect();
        assert_eq!(downstream, vec!["A", "B", "C"]);
        assert_eq!(c.qualified_name(), "Dummy.C");
    }

    #[test]
    fn base_cache_is_keyed_by_object() {
        let ty = CellType::from_def(&dummy()).unwrap();
        let a = ty.cell("A").unwrap();
        let first = ObjectId::new();
        let second = ObjectId::new();

        a.store(first, ArgKey::empty(), Ok(Value::from(1)));
        assert_eq!(a.cached(first, &ArgKey::empty()).unwrap().unwrap(), Value::Int(1));
        assert!(a.cached(second, &ArgKey::empty()).is_none());

        assert!(a.forget(first));
        assert!(!a.forget(first));
        assert_eq!(a.cached_len(first), 0);
    }
}
