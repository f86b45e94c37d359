//! Error Types
//!
//! Every fallible operation in the crate returns [`Error`]. The enum is
//! `Clone` because failed computations are cached: a poisoned placeholder in
//! a cell's cache (or in an override layer) hands out the very same error on
//! every later lookup until it is cleared.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by user compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while declaring types or evaluating cells.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The cell references of a type form a cycle. Fatal for that type.
    #[error("cycle detected in `{type_name}` through cell `{cell}`")]
    CycleDetected { type_name: String, cell: String },

    /// A cell declares a dependency on a name that is not a cell of its type.
    #[error("cell `{cell}` depends on `{dependency}`, which is not declared")]
    UnknownDependency { cell: String, dependency: String },

    /// Two cells of one type share a name.
    #[error("cell `{cell}` is declared twice in `{type_name}`")]
    DuplicateCell { type_name: String, cell: String },

    /// Attempt to mutate a dependency graph after it was frozen.
    #[error("dependency graph is frozen")]
    GraphFrozen,

    /// An edge names a node that was never added to the graph.
    #[error("node {node} is not part of the graph")]
    UnknownNode { node: u64 },

    /// Lookup of a cell name the type does not declare.
    #[error("`{type_name}` has no cell named `{cell}`")]
    UnknownCell { type_name: String, cell: String },

    /// The type was never declared with this runtime.
    #[error("type `{type_name}` has not been declared")]
    TypeNotDeclared { type_name: String },

    /// Call arguments cannot be used as a cache key.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// `tweak` was called outside any scope.
    #[error("cannot tweak `{cell}` outside a scope")]
    NoActiveScope { cell: String },

    /// A compute function was invoked with fewer arguments than it requires.
    #[error("`{cell}` requires {expected} argument(s), got {found}")]
    ArityMismatch {
        cell: String,
        expected: usize,
        found: usize,
    },

    /// A compute function reached a sibling it did not declare.
    #[error("`{cell}` called `{dependency}` without declaring it as a dependency")]
    UndeclaredDependency { cell: String, dependency: String },

    /// A value was read as the wrong kind.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A compute function failed. Cached as a poisoned placeholder.
    #[error("unable to compute `{cell}`")]
    Compute {
        cell: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A constant cell whose default is an error.
    #[error("`{cell}` holds an error: {message}")]
    Poisoned { cell: String, message: String },
}

impl Error {
    /// Wrap a failure raised by the compute function of `cell`.
    pub(crate) fn compute(cell: &str, source: BoxError) -> Self {
        Self::Compute {
            cell: cell.to_string(),
            source: Arc::from(source),
        }
    }

    /// Whether this is the recoverable arity error of eager pre-evaluation.
    pub fn is_arity_mismatch(&self) -> bool {
        matches!(self, Self::ArityMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn compute_error_keeps_source() {
        let err = Error::compute("T.A", "boom".into());
        assert_eq!(err.to_string(), "unable to compute `T.A`");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn clones_share_the_source() {
        let err = Error::compute("T.A", "boom".into());
        let copy = err.clone();
        match (&err, &copy) {
            (Error::Compute { source: a, .. }, Error::Compute { source: b, .. }) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => unreachable!(),
        }
    }
}
