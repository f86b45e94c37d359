//! Scenario Scopes
//!
//! A scope is a what-if context: inside it, cells can be pinned to explicit
//! values (tweaked) and everything downstream recomputes against the pinned
//! values. Leaving the scope discards every override made in it.
//!
//! # Concepts
//!
//! ## Layers
//!
//! Each scope owns one [`OverrideLayer`]. Tweaks and pinned results always go
//! to the topmost layer.
//!
//! ## Stack
//!
//! Nested scopes form an [`OverrideStack`]. Inner scopes see overrides made
//! by enclosing scopes, but can never modify them: clearing a cell inside a
//! scope only touches the topmost layer.
//!
//! ## Guards
//!
//! [`ScopeGuard`] pops its layer on drop, so scopes always exit in LIFO order.

mod guard;
mod layer;
mod stack;

pub use guard::ScopeGuard;
pub use layer::OverrideLayer;
pub use stack::OverrideStack;
