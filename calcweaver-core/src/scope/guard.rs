//! Scope Guard
//!
//! Entering a scope pushes an override layer; dropping the returned guard
//! pops it. Because the pop lives in `Drop`, the layer is discarded even if
//! the scope body returns early or panics.
//!
//! Scopes must be exited in LIFO order. Guards remember the depth they
//! created and check it on the way out.

use crate::runtime::Runtime;

/// Guard that pops its override layer when dropped.
#[must_use = "the scope exits as soon as the guard is dropped"]
pub struct ScopeGuard<'rt> {
    runtime: &'rt Runtime,
    label: String,
    depth: usize,
}

impl<'rt> ScopeGuard<'rt> {
    /// Push a layer on `runtime` and guard it.
    pub(crate) fn enter(runtime: &'rt Runtime, label: String) -> Self {
        let depth = runtime.push_layer(&label);
        Self {
            runtime,
            label,
            depth,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stack depth while this scope is the innermost one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Exit the scope now.
    pub fn exit(self) {}
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.pop_layer(&self.label);

        // Catches guards dropped out of order.
        debug_assert_eq!(
            popped, self.depth,
            "scope `{}` exited at depth {} but was entered at depth {}",
            self.label, popped, self.depth
        );
    }
}
