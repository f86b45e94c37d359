//! Runtime
//!
//! The runtime is the owned context every instance evaluates against. It
//! holds the two pieces of shared state of the engine:
//!
//! - the registry mapping each declared type to its frozen graph and cell
//!   descriptors (or to the error that rejected it)
//! - the override stack of the active scopes
//!
//! Runtimes are independent of each other, so tests can run side by side
//! without sharing caches or scopes.
//!
//! # Evaluation
//!
//! Calling a cell runs [`Runtime::evaluate`]:
//!
//! 1. Normalize the arguments into a key.
//! 2. Inside a scope, an override of (cell, object, key) in the topmost
//!    layer is returned as is.
//! 3. Every argument-less upstream cell is evaluated first. Upstream cells
//!    that need arguments are skipped with a warning.
//! 4. If an upstream cell is overridden in a layer newer than any override
//!    of this cell, the compute function runs against the overrides and the
//!    result must be pinned into the topmost layer.
//! 5. Otherwise the newest override of this cell wins.
//! 6. Otherwise the base cache is consulted.
//! 7. Otherwise the compute function runs and its outcome, value or error,
//!    is cached. If the compute reached an overridden upstream cell through
//!    arguments, the outcome is pinned like in step 4 instead.
//! 8. Constant cells return their default.
//!
//! # Thread Safety
//!
//! The override stack sits behind one mutex and every cell guards its own
//! base cache. No lock is held while a compute function runs, so compute
//! functions can freely call other cells.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::cell::{
    ArgKey, Args, CellKind, CellType, ComputeContext, ComputeFn, Instance, MemoCell, ObjectId,
    Outcome, TypeDef, TypeKey,
};
use crate::error::{Error, Result};
use crate::export::GraphExport;
use crate::scope::{OverrideStack, ScopeGuard};

/// Registry entry of a declared type.
#[derive(Debug, Clone)]
enum Registration {
    Published(Arc<CellType>),
    Rejected(Error),
}

impl Registration {
    fn into_result(self) -> Result<Arc<CellType>> {
        match self {
            Registration::Published(cell_type) => Ok(cell_type),
            Registration::Rejected(err) => Err(err),
        }
    }
}

/// Result of the evaluation algorithm for one call.
#[derive(Debug, Clone)]
pub struct Evaluation {
    outcome: Outcome,
    must_pin: bool,
}

impl Evaluation {
    fn settled(outcome: Outcome) -> Self {
        Self {
            outcome,
            must_pin: false,
        }
    }

    fn derived(outcome: Outcome) -> Self {
        Self {
            outcome,
            must_pin: true,
        }
    }

    /// The value or captured error the cell settled on.
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Whether the outcome was derived from a scope override and has to be
    /// pinned into the current scope by the caller.
    pub fn must_pin(&self) -> bool {
        self.must_pin
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

/// Owned engine context: type registry plus override stack.
pub struct Runtime {
    registry: DashMap<TypeKey, Registration>,
    overrides: Mutex<OverrideStack>,
}

impl Runtime {
    /// Create an empty runtime: no declared types, no active scope.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: DashMap::new(),
            overrides: Mutex::new(OverrideStack::new()),
        })
    }

    // ------------------------------------------------------------------------
    // Declaration
    // ------------------------------------------------------------------------

    /// Infer, check and publish the graph of `def`.
    ///
    /// Runs once per type. Later calls return the published type, or the
    /// error that rejected it the first time.
    pub fn declare(&self, def: &TypeDef) -> Result<Arc<CellType>> {
        if let Some(registration) = self.registry.get(&def.key()) {
            return registration.value().clone().into_result();
        }

        let registration = match CellType::from_def(def) {
            Ok(cell_type) => {
                debug!(type_name = def.name(), cells = cell_type.cells().count(), "type published");
                Registration::Published(Arc::new(cell_type))
            }
            Err(err) => {
                warn!(type_name = def.name(), error = %err, "type declaration rejected");
                Registration::Rejected(err)
            }
        };

        let registration = self
            .registry
            .entry(def.key())
            .or_insert(registration)
            .value()
            .clone();
        registration.into_result()
    }

    /// Whether `def` was declared successfully.
    pub fn is_declared(&self, def: &TypeDef) -> bool {
        self.registry
            .get(&def.key())
            .is_some_and(|registration| matches!(registration.value(), Registration::Published(_)))
    }

    /// Create an object of `def`, declaring the type on first use.
    pub fn instantiate(self: &Arc<Self>, def: &TypeDef) -> Result<Instance> {
        let cell_type = self.declare(def)?;
        let instance = Instance::bind(Arc::clone(self), cell_type);
        trace!(type_name = def.name(), object = %instance.id(), "instance bound");
        Ok(instance)
    }

    /// Read-only view of the published graph of `def`.
    pub fn export(&self, def: &TypeDef) -> Result<GraphExport> {
        let registration = self
            .registry
            .get(&def.key())
            .map(|registration| registration.value().clone())
            .ok_or_else(|| Error::TypeNotDeclared {
                type_name: def.name().to_string(),
            })?;
        let cell_type = registration.into_result()?;
        Ok(GraphExport::from_type(&cell_type))
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Enter a scenario scope. The scope exits when the guard is dropped.
    pub fn enter_scope(&self, label: impl Into<String>) -> ScopeGuard<'_> {
        ScopeGuard::enter(self, label.into())
    }

    /// Run `body` inside a scope.
    pub fn scope<R>(&self, label: impl Into<String>, body: impl FnOnce() -> R) -> R {
        let _guard = self.enter_scope(label);
        body()
    }

    /// Number of active scopes.
    pub fn depth(&self) -> usize {
        self.overrides.lock().depth()
    }

    pub fn in_scope(&self) -> bool {
        !self.overrides.lock().is_empty()
    }

    pub(crate) fn push_layer(&self, label: &str) -> usize {
        let depth = self.overrides.lock().push(label);
        info!(label, depth, "entering scope");
        depth
    }

    /// Pop the topmost layer. Returns the depth before popping.
    pub(crate) fn pop_layer(&self, label: &str) -> usize {
        let mut stack = self.overrides.lock();
        let depth = stack.depth();
        if let Some(layer) = stack.pop() {
            info!(label, depth, discarded = layer.len(), "exiting scope");
        }
        depth
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Evaluate `cell` of `instance` for `args`.
    ///
    /// Does not pin; see [`Evaluation::must_pin`].
    pub fn evaluate(&self, instance: &Instance, cell: &MemoCell, args: &Args) -> Result<Evaluation> {
        let key = args.key()?;
        let object = instance.id();

        let pinned = self.overrides.lock().top_lookup(cell.node(), object, &key);
        if let Some(outcome) = pinned {
            trace!(cell = cell.qualified_name(), %object, %key, "override hit");
            return Ok(Evaluation::settled(outcome));
        }

        self.prefetch(instance, cell)?;

        let cell_type = instance.cell_type();
        let (own, upstream_depth) = {
            let stack = self.overrides.lock();
            if stack.is_empty() {
                (None, None)
            } else {
                let own = stack.newest_match(cell.node(), object, &key);
                let upstream_depth = cell_type
                    .upstream(cell)
                    .filter_map(|upstream| stack.newest_touching(upstream.node(), object))
                    .max();
                (own, upstream_depth)
            }
        };

        if let CellKind::Computed { compute, arity } = cell.kind() {
            if let Some(depth) = upstream_depth {
                let stale = own.as_ref().map_or(true, |(own_depth, _)| depth > *own_depth);
                if stale {
                    trace!(cell = cell.qualified_name(), %object, depth, "upstream overridden");
                    let outcome = self.invoke(instance, cell, compute, *arity, args)?;
                    return Ok(Evaluation::derived(outcome));
                }
            }
        }

        if let Some((depth, outcome)) = own {
            trace!(cell = cell.qualified_name(), %object, depth, "scope override hit");
            return Ok(Evaluation::settled(outcome));
        }

        if let Some(outcome) = cell.cached(object, &key) {
            trace!(cell = cell.qualified_name(), %object, %key, "cache hit");
            return Ok(Evaluation::settled(outcome));
        }

        match cell.kind() {
            CellKind::Computed { compute, arity } => {
                let outcome = self.invoke(instance, cell, compute, *arity, args)?;

                // Dependencies that take arguments are only reached during the
                // compute itself; if one of them pinned an override meanwhile,
                // the outcome is scoped and must stay out of the base cache.
                let perturbed = {
                    let stack = self.overrides.lock();
                    !stack.is_empty()
                        && cell_type
                            .upstream(cell)
                            .any(|upstream| stack.newest_touching(upstream.node(), object).is_some())
                };
                if perturbed {
                    trace!(cell = cell.qualified_name(), %object, "upstream overridden during compute");
                    return Ok(Evaluation::derived(outcome));
                }

                cell.store(object, key, outcome.clone());
                Ok(Evaluation::settled(outcome))
            }
            CellKind::Constant(default) => Ok(Evaluation::settled(default.clone())),
        }
    }

    /// Evaluate every upstream cell of `cell` without arguments.
    ///
    /// Results that must be pinned are pinned here, so the perturbation is
    /// visible to `cell` one step later. Upstream cells that need arguments
    /// are skipped; any other failure propagates.
    fn prefetch(&self, instance: &Instance, cell: &MemoCell) -> Result<()> {
        let object = instance.id();
        for upstream in instance.cell_type().upstream(cell) {
            match self.evaluate(instance, upstream, &Args::none()) {
                Ok(evaluation) => {
                    if evaluation.must_pin() {
                        self.overrides.lock().pin(
                            upstream.node(),
                            object,
                            ArgKey::empty(),
                            evaluation.outcome().clone(),
                        );
                    }
                    evaluation.into_outcome()?;
                }
                Err(err) if err.is_arity_mismatch() => {
                    warn!(
                        cell = cell.qualified_name(),
                        dependency = upstream.qualified_name(),
                        "can't pre-evaluate dependency; only argument-less dependencies are pre-evaluated"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Run the compute function of `cell`, capturing its failure.
    fn invoke(
        &self,
        instance: &Instance,
        cell: &MemoCell,
        compute: &ComputeFn,
        arity: usize,
        args: &Args,
    ) -> Result<Outcome> {
        if args.len() < arity {
            return Err(Error::ArityMismatch {
                cell: cell.qualified_name().to_string(),
                expected: arity,
                found: args.len(),
            });
        }

        trace!(cell = cell.qualified_name(), object = %instance.id(), "computing");
        let context = ComputeContext::new(instance, cell);
        Ok(compute(&context, args).map_err(|source| {
            let err = Error::compute(cell.qualified_name(), source);
            debug!(cell = cell.qualified_name(), error = %err, "compute failed");
            err
        }))
    }

    /// Record `outcome` as an override in the topmost layer.
    pub(crate) fn pin(
        &self,
        cell: &MemoCell,
        object: ObjectId,
        args: &Args,
        outcome: Outcome,
    ) -> Result<()> {
        let key = args.key()?;
        trace!(cell = cell.qualified_name(), %object, %key, "pinning derived outcome");
        self.overrides.lock().pin(cell.node(), object, key, outcome);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Tweak and clear
    // ------------------------------------------------------------------------

    /// Pin `cell` of `instance` to `outcome` for `args` in the topmost layer.
    ///
    /// Everything downstream is invalidated first.
    pub(crate) fn tweak(
        &self,
        instance: &Instance,
        cell: &MemoCell,
        args: &Args,
        outcome: Outcome,
    ) -> Result<()> {
        let object = instance.id();
        let mut stack = self.overrides.lock();
        if stack.is_empty() {
            return Err(Error::NoActiveScope {
                cell: cell.qualified_name().to_string(),
            });
        }

        let key = args.key()?;
        let closure = instance.cell_type().downstream(cell);
        Self::invalidate(&mut stack, &closure, object);
        debug!(cell = cell.qualified_name(), %object, %key, invalidated = closure.len(), "tweak");
        stack.pin(cell.node(), object, key, outcome);
        Ok(())
    }

    /// Invalidate `cell` of `instance` and every cell downstream of it.
    ///
    /// Inside a scope only the topmost layer loses overrides; outside any
    /// scope the base caches are emptied for this object.
    pub(crate) fn clear(&self, instance: &Instance, cell: &MemoCell) {
        let object = instance.id();
        let closure = instance.cell_type().downstream(cell);
        let mut stack = self.overrides.lock();
        Self::invalidate(&mut stack, &closure, object);
        debug!(
            cell = cell.qualified_name(),
            %object,
            invalidated = closure.len(),
            scoped = !stack.is_empty(),
            "clear"
        );
    }

    fn invalidate(stack: &mut OverrideStack, closure: &[&Arc<MemoCell>], object: ObjectId) {
        if stack.is_empty() {
            for cell in closure {
                cell.forget(object);
            }
        } else {
            for cell in closure {
                stack.remove_in_top(cell.node(), object);
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("types", &self.registry.len())
            .field("depth", &self.depth())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellDef;
    use crate::value::Value;
    use std::sync::atomic::{AtomicI32, Ordering};
    use tracing::field::{Field, Visit};
    use tracing::Level;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Records the level and message of every event.
    #[derive(Clone, Default)]
    struct Captured {
        events: Arc<Mutex<Vec<(Level, String)>>>,
    }

    impl Captured {
        fn messages(&self, level: Level) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter(|(event_level, _)| *event_level == level)
                .map(|(_, message)| message.clone())
                .collect()
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            struct Message(String);
            impl Visit for Message {
                fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                    if field.name() == "message" {
                        self.0 = format!("{value:?}");
                    }
                }
            }

            let mut message = Message(String::new());
            event.record(&mut message);
            self.events.lock().push((*event.metadata().level(), message.0));
        }
    }

    fn pricer() -> TypeDef {
        TypeDef::builder("Pricer")
            .constant("rate", 0.5)
            .cell(
                CellDef::computed("scaled", |ctx, args| {
                    let x = args.get(0).ok_or("missing x")?.as_float()?;
                    Ok(Value::from(x * ctx.get("rate")?.as_float()?))
                })
                .depends_on(["rate"])
                .arity(1),
            )
            .computed("total", ["scaled"], |ctx, _| {
                ctx.call("scaled", &Args::positional([4.0])).map_err(Into::into)
            })
            .build()
            .unwrap()
    }

    fn counted(counter: &Arc<AtomicI32>, value: i64) -> CellDef {
        let counter = Arc::clone(counter);
        CellDef::computed("x", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(value))
        })
    }

    #[test]
    fn declaration_is_idempotent() {
        let runtime = Runtime::new();
        let def = TypeDef::builder("T").constant("a", 1).build().unwrap();

        let first = runtime.declare(&def).unwrap();
        let second = runtime.declare(&def.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(runtime.is_declared(&def));
    }

    #[test]
    fn runtimes_are_isolated() {
        let calls = Arc::new(AtomicI32::new(0));
        let def = TypeDef::builder("T").cell(counted(&calls, 1)).build().unwrap();

        let left = Runtime::new();
        let right = Runtime::new();
        let a = left.instantiate(&def).unwrap();
        let b = right.instantiate(&def).unwrap();

        let _scope = left.enter_scope("left only");
        assert!(left.in_scope());
        assert!(!right.in_scope());

        assert_eq!(a.get("x").unwrap(), Value::Int(1));
        assert_eq!(b.get("x").unwrap(), Value::Int(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejected_type_stays_rejected() {
        let runtime = Runtime::new();
        let def = TypeDef::builder("Loop")
            .computed("a", ["a"], |_, _| Ok(Value::Null))
            .build()
            .unwrap();

        assert!(matches!(runtime.declare(&def), Err(Error::CycleDetected { .. })));
        assert!(matches!(runtime.instantiate(&def), Err(Error::CycleDetected { .. })));
        assert!(matches!(runtime.export(&def), Err(Error::CycleDetected { .. })));
        assert!(!runtime.is_declared(&def));
    }

    #[test]
    fn evaluate_reports_must_pin_without_pinning() {
        let runtime = Runtime::new();
        let def = TypeDef::builder("T")
            .constant("base", 2)
            .computed("double", ["base"], |ctx, _| {
                Ok(Value::from(ctx.get("base")?.as_int()? * 2))
            })
            .build()
            .unwrap();
        let object = runtime.instantiate(&def).unwrap();
        let double = object.cell("double").unwrap();

        let _scope = runtime.enter_scope("s");
        object.cell("base").unwrap().tweak(5, &Args::none()).unwrap();

        let evaluation = double.evaluate(&Args::none()).unwrap();
        assert!(evaluation.must_pin());
        assert_eq!(evaluation.outcome().clone().unwrap(), Value::Int(10));

        // Nothing was pinned, so evaluating again still derives.
        assert!(double.evaluate(&Args::none()).unwrap().must_pin());

        // Calling through the handle pins.
        assert_eq!(double.get().unwrap(), Value::Int(10));
        assert!(!double.evaluate(&Args::none()).unwrap().must_pin());
    }

    #[test]
    fn clear_outside_scope_empties_base_cache() {
        let calls = Arc::new(AtomicI32::new(0));
        let runtime = Runtime::new();
        let def = TypeDef::builder("T").cell(counted(&calls, 3)).build().unwrap();
        let object = runtime.instantiate(&def).unwrap();
        let x = object.cell("x").unwrap();

        x.get().unwrap();
        assert_eq!(x.descriptor().cached_len(object.id()), 1);

        x.clear();
        assert_eq!(x.descriptor().cached_len(object.id()), 0);
        x.get().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_an_instance_purges_its_cache() {
        let calls = Arc::new(AtomicI32::new(0));
        let runtime = Runtime::new();
        let def = TypeDef::builder("T").cell(counted(&calls, 3)).build().unwrap();
        let cell_type = runtime.declare(&def).unwrap();
        let descriptor = Arc::clone(cell_type.cell("x").unwrap());

        let object = runtime.instantiate(&def).unwrap();
        let id = object.id();
        object.get("x").unwrap();
        assert_eq!(descriptor.cached_len(id), 1);

        drop(object);
        assert_eq!(descriptor.cached_len(id), 0);
    }

    #[test]
    fn declaration_logs_publication_once() {
        let captured = Captured::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

        let runtime = Runtime::new();
        let def = TypeDef::builder("T").constant("a", 1).build().unwrap();
        runtime.declare(&def).unwrap();
        runtime.declare(&def).unwrap();

        let published = captured
            .messages(Level::DEBUG)
            .into_iter()
            .filter(|message| message == "type published")
            .count();
        assert_eq!(published, 1);
    }

    #[test]
    fn skipped_prefetch_logs_a_warning() {
        let captured = Captured::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

        let runtime = Runtime::new();
        let object = runtime.instantiate(&pricer()).unwrap();
        assert_eq!(object.get("total").unwrap(), Value::Float(2.0));

        let warnings = captured.messages(Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("can't pre-evaluate dependency"));
    }

    #[test]
    fn compute_reaching_an_override_through_arguments_is_not_cached() {
        let runtime = Runtime::new();
        let object = runtime.instantiate(&pricer()).unwrap();
        let total = object.cell("total").unwrap();

        let _scope = runtime.enter_scope("s");
        object.cell("rate").unwrap().tweak(1.0, &Args::none()).unwrap();

        let evaluation = total.evaluate(&Args::none()).unwrap();
        assert!(evaluation.must_pin());
        assert_eq!(evaluation.outcome().clone().unwrap(), Value::Float(4.0));
        assert_eq!(total.descriptor().cached_len(object.id()), 0);
    }
}
