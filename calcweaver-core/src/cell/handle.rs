//! Instances and Cell Handles
//!
//! An [`Instance`] is one object of a declared type. It carries a
//! process-unique [`ObjectId`], which is what caches and overrides are keyed
//! by: two instances with identical cells never share a cache entry.
//!
//! Every operation a caller performs on a cell goes through a
//! [`CellHandle`], scoped to one (cell, object) pair:
//!
//! ```rust,ignore
//! let dummy = runtime.instantiate(&dummy_type)?;
//! let c = dummy.cell("C")?;
//!
//! assert_eq!(c.get()?, Value::Int(130));
//!
//! let _scope = runtime.enter_scope("lower D");
//! dummy.cell("D")?.tweak(10, &Args::none())?;
//! assert_eq!(c.get()?, Value::Int(120));
//! ```
//!
//! Compute functions reach sibling cells through a [`ComputeContext`], which
//! only lets them call the siblings they declared.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use super::args::Args;
use super::descriptor::{CellType, MemoCell, Outcome};
use crate::error::{Error, Result};
use crate::runtime::{Evaluation, Runtime};
use crate::value::Value;

/// Identity of an instance. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One object of a declared type.
///
/// Dropping an instance purges its entries from every base cache of its type.
pub struct Instance {
    id: ObjectId,
    cell_type: Arc<CellType>,
    runtime: Arc<Runtime>,
    /// One binding per declared cell, created at construction.
    bindings: IndexMap<String, Arc<MemoCell>>,
}

impl Instance {
    /// Bind a fresh object to `cell_type`.
    pub(crate) fn bind(runtime: Arc<Runtime>, cell_type: Arc<CellType>) -> Self {
        let bindings = cell_type
            .cells()
            .map(|cell| (cell.name().to_string(), Arc::clone(cell)))
            .collect();
        Self {
            id: ObjectId::new(),
            cell_type,
            runtime,
            bindings,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        self.cell_type.name()
    }

    pub fn cell_type(&self) -> &Arc<CellType> {
        &self.cell_type
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Handle for the cell `name`.
    pub fn cell(&self, name: &str) -> Result<CellHandle<'_>> {
        self.bindings
            .get(name)
            .map(|cell| CellHandle {
                instance: self,
                cell,
            })
            .ok_or_else(|| Error::UnknownCell {
                type_name: self.type_name().to_string(),
                cell: name.to_string(),
            })
    }

    /// Handles for every cell, in declaration order.
    pub fn cells(&self) -> impl Iterator<Item = CellHandle<'_>> {
        self.bindings.values().map(move |cell| CellHandle {
            instance: self,
            cell,
        })
    }

    /// Evaluate the argument-less cell `name`.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.cell(name)?.get()
    }

    /// Evaluate the cell `name` with `args`.
    pub fn call(&self, name: &str, args: &Args) -> Result<Value> {
        self.cell(name)?.call(args)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        for cell in self.bindings.values() {
            cell.forget(self.id);
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("type_name", &self.type_name())
            .field("cells", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A cell bound to one instance.
#[derive(Clone, Copy)]
pub struct CellHandle<'a> {
    instance: &'a Instance,
    cell: &'a Arc<MemoCell>,
}

impl<'a> CellHandle<'a> {
    pub fn name(&self) -> &'a str {
        self.cell.name()
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    pub fn descriptor(&self) -> &'a Arc<MemoCell> {
        self.cell
    }

    /// Evaluate with no arguments.
    pub fn get(&self) -> Result<Value> {
        self.call(&Args::none())
    }

    /// Evaluate with `args`.
    ///
    /// A result derived under an upstream override of the current scope is
    /// pinned into that scope before it is returned.
    pub fn call(&self, args: &Args) -> Result<Value> {
        let evaluation = self.evaluate(args)?;
        if evaluation.must_pin() {
            self.instance
                .runtime
                .pin(self.cell, self.instance.id, args, evaluation.outcome().clone())?;
        }
        evaluation.into_outcome()
    }

    /// Run the evaluation algorithm without pinning the result.
    pub fn evaluate(&self, args: &Args) -> Result<Evaluation> {
        self.instance.runtime.evaluate(self.instance, self.cell, args)
    }

    /// Pin this cell to `value` for `args` in the current scope.
    pub fn tweak(&self, value: impl Into<Value>, args: &Args) -> Result<()> {
        self.tweak_outcome(Ok(value.into()), args)
    }

    /// Pin this cell to a captured error for `args` in the current scope.
    pub fn tweak_error(&self, message: impl Into<String>, args: &Args) -> Result<()> {
        let err = Error::Poisoned {
            cell: self.cell.qualified_name().to_string(),
            message: message.into(),
        };
        self.tweak_outcome(Err(err), args)
    }

    /// Pin this cell to `outcome` for `args` in the current scope.
    pub fn tweak_outcome(&self, outcome: Outcome, args: &Args) -> Result<()> {
        self.instance
            .runtime
            .tweak(self.instance, self.cell, args, outcome)
    }

    /// Invalidate this cell and everything downstream of it.
    pub fn clear(&self) {
        self.instance.runtime.clear(self.instance, self.cell);
    }
}

impl fmt::Debug for CellHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellHandle")
            .field("cell", &self.cell.qualified_name())
            .field("object", &self.instance.id)
            .finish()
    }
}

/// What a compute function sees of its owning object.
pub struct ComputeContext<'a> {
    instance: &'a Instance,
    cell: &'a MemoCell,
}

impl<'a> ComputeContext<'a> {
    pub(crate) fn new(instance: &'a Instance, cell: &'a MemoCell) -> Self {
        Self { instance, cell }
    }

    /// Identity of the owning object.
    pub fn object_id(&self) -> ObjectId {
        self.instance.id
    }

    /// Name of the cell being computed.
    pub fn cell_name(&self) -> &str {
        self.cell.name()
    }

    /// Evaluate the argument-less sibling `name`.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.call(name, &Args::none())
    }

    /// Evaluate the sibling `name` with `args`.
    ///
    /// Fails with [`Error::UndeclaredDependency`] unless `name` is one of the
    /// dependencies this cell declared.
    pub fn call(&self, name: &str, args: &Args) -> Result<Value> {
        if !self.cell.declares(name) {
            return Err(Error::UndeclaredDependency {
                cell: self.cell.qualified_name().to_string(),
                dependency: name.to_string(),
            });
        }
        self.instance.cell(name)?.call(args)
    }
}

impl fmt::Debug for ComputeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeContext")
            .field("cell", &self.cell.qualified_name())
            .field("object", &self.instance.id)
            .finish()
    }
}
