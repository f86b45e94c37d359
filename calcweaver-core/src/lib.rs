//! Calcweaver Core
//!
//! This crate provides an in-process incremental computation engine built
//! from memoized cells. It implements:
//!
//! - Declaration of types made of named cells (computed or constant)
//! - A per-type dependency graph, checked for cycles and frozen
//! - Per-object, per-argument memoization with sticky error caching
//! - Nested what-if scopes in which cells can be pinned to explicit values
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: dependency graph, cycle detection and inference
//! - `cell`: declarations, memoized descriptors, instances and handles
//! - `scope`: override layers, the override stack and scope guards
//! - `runtime`: the owned context tying registry, scopes and evaluation together
//! - `export`: read-only graph export (JSON, Graphviz DOT)
//!
//! # Example
//!
//! ```rust,ignore
//! use calcweaver_core::{Args, Runtime, TypeDef, Value};
//!
//! let dummy = TypeDef::builder("Dummy")
//!     .constant("D", 20)
//!     .computed("A", [] as [&str; 0], |_, _| Ok(Value::from(10)))
//!     .computed("B", ["A"], |ctx, _| {
//!         let a = ctx.get("A")?.as_int()?;
//!         Ok(Value::from(a * a))
//!     })
//!     .computed("C", ["A", "B", "D"], |ctx, _| {
//!         let sum = ctx.get("A")?.as_int()? + ctx.get("B")?.as_int()? + ctx.get("D")?.as_int()?;
//!         Ok(Value::from(sum))
//!     })
//!     .build()?;
//!
//! let runtime = Runtime::new();
//! let object = runtime.instantiate(&dummy)?;
//! assert_eq!(object.get("C")?, Value::Int(130));
//!
//! runtime.scope("what if D were 10", || {
//!     object.cell("D")?.tweak(10, &Args::none())?;
//!     assert_eq!(object.get("C")?, Value::Int(120));
//!     Ok::<_, calcweaver_core::Error>(())
//! })?;
//!
//! // The override is gone once the scope exits.
//! assert_eq!(object.get("C")?, Value::Int(130));
//! ```

pub mod cell;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod runtime;
pub mod scope;
pub mod value;

pub use cell::{
    ArgKey, Args, CellDef, CellHandle, CellKind, CellType, ComputeContext, Instance, MemoCell,
    ObjectId, Outcome, TypeBuilder, TypeDef,
};
pub use config::{init_tracing, LogLevel, RuntimeConfig};
pub use error::{BoxError, Error, Result};
pub use export::{CellExport, GraphExport};
pub use runtime::{Evaluation, Runtime};
pub use scope::ScopeGuard;
pub use value::Value;
