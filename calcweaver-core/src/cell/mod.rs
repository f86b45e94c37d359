//! Cells
//!
//! This module implements declaration, memoization and instance binding of
//! cells.
//!
//! # Concepts
//!
//! ## Declarations
//!
//! A [`TypeDef`] lists the cells of a type. Each [`CellDef`] is either
//! computed (backed by a function of the owning object and call arguments)
//! or constant (a default value). Computed cells declare which siblings they
//! call; those names become the edges of the type's dependency graph.
//!
//! ## Descriptors
//!
//! When a type is declared with a runtime, every cell gets one [`MemoCell`]
//! shared by all instances. It owns the base cache, keyed by object identity
//! and normalized arguments ([`ArgKey`]).
//!
//! ## Handles
//!
//! Each [`Instance`] binds one [`CellHandle`] per cell. Evaluating, tweaking
//! and clearing all go through handles.

mod args;
mod descriptor;
mod handle;

pub use args::{ArgKey, Args};
pub use descriptor::{
    CellDef, CellKind, CellType, ComputeFn, MemoCell, Outcome, TypeBuilder, TypeDef, TypeKey,
};
pub use handle::{CellHandle, ComputeContext, Instance, ObjectId};
