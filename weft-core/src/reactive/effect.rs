//! Effect Implementation
//!
//! An Effect is a computation whose reads are tracked and which re-runs
//! when any of them changes.
//!
//! # How Effects Work
//!
//! 1. Running an effect pushes it onto the reader stack, so every tracked
//!    read subscribes it to the corresponding Dependency Set.
//!
//! 2. Each Dep the effect belongs to is marked "was tracked" before the
//!    run. Reads during the run mark Deps "newly tracked". When the run ends,
//!    Deps that were tracked before but not this time are dropped.
//!
//! 3. When any dependency changes, the effect is handed to its scheduler if
//!    it has one, and re-run directly otherwise.
//!
//! 4. Stopping an effect removes it from every Dep and leaves it inactive.
//!    An inactive effect can still be run by hand, untracked.
//!
//! # Ownership
//!
//! Deps and effects refer to each other weakly. An effect lives as long as
//! a [`ReactiveEffect`] or [`EffectRunner`] handle, its scope, or the
//! computed value built on it. Dropping the last of those unsubscribes it,
//! and releases whatever its closure captured.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::context::ReactiveContext;
use super::dep::{Dep, WeakDep};
use super::operations::DebuggerEvent;
use super::scope::{record_effect_scope, EffectScope};
use super::subscriber::SubscriberId;
use crate::value::Value;

/// The body of an effect.
pub type EffectFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Receives a notified effect instead of it re-running immediately.
pub type Scheduler = Arc<dyn Fn(&ReactiveEffect) + Send + Sync>;

/// Debug-build hook for track and trigger events.
pub type DebugHook = Arc<dyn Fn(&DebuggerEvent) + Send + Sync>;

/// Called once when an effect is stopped.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct EffectHooks {
    on_stop: Option<StopHook>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
}

struct EffectInner {
    id: SubscriberId,
    func: EffectFn,
    scheduler: Option<Scheduler>,
    active: AtomicBool,
    allow_recurse: AtomicBool,
    deps: Mutex<Vec<WeakDep>>,
    hooks: Mutex<EffectHooks>,
    run_count: AtomicUsize,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().drain(..).filter_map(|weak| weak.upgrade()) {
            dep.remove_id(self.id);
        }
    }
}

/// A tracked computation.
///
/// Clones share state; equality is identity.
#[derive(Clone)]
pub struct ReactiveEffect(Arc<EffectInner>);

/// An effect as referenced from the Deps it subscribes to.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<ReactiveEffect> {
        self.0.upgrade().map(ReactiveEffect)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl ReactiveEffect {
    /// Create an effect without running it.
    ///
    /// The effect joins `scope`, or the active scope if `scope` is `None`.
    pub fn new<F, R>(func: F, scheduler: Option<Scheduler>, scope: Option<&EffectScope>) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        let effect = Self(Arc::new(EffectInner {
            id: SubscriberId::new(),
            func: Arc::new(move || func().into()),
            scheduler,
            active: AtomicBool::new(true),
            allow_recurse: AtomicBool::new(false),
            deps: Mutex::new(Vec::new()),
            hooks: Mutex::new(EffectHooks::default()),
            run_count: AtomicUsize::new(0),
        }));
        record_effect_scope(&effect, scope);
        effect
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Arc::downgrade(&self.0))
    }

    /// Run the effect, tracking its reads.
    ///
    /// A stopped effect just calls its function. A run requested while the
    /// same effect is already on the reader stack is skipped and returns
    /// `Undefined`.
    pub fn run(&self) -> Value {
        if !self.is_active() {
            return (self.0.func)();
        }
        let Some(_ctx) = ReactiveContext::enter(self) else {
            trace!(effect = %self.id(), "skipping re-entrant run");
            return Value::Undefined;
        };
        self.0.run_count.fetch_add(1, Ordering::Relaxed);
        (self.0.func)()
    }

    /// Unsubscribe from everything and deactivate. Idempotent.
    pub fn stop(&self) {
        if !self.0.active.swap(false, Ordering::AcqRel) {
            return;
        }
        trace!(effect = %self.id(), "stopping effect");
        self.cleanup();
        let on_stop = self.0.hooks.lock().on_stop.clone();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::Acquire)
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.0.run_count.load(Ordering::Relaxed)
    }

    /// The Deps this effect currently belongs to, in subscription order.
    pub fn deps(&self) -> Vec<Dep> {
        self.0.deps.lock().iter().filter_map(WeakDep::upgrade).collect()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.deps().len()
    }

    pub fn allow_recurse(&self) -> bool {
        self.0.allow_recurse.load(Ordering::Relaxed)
    }

    /// Let a write made by this effect's own run re-trigger it.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.0.allow_recurse.store(allow, Ordering::Relaxed);
    }

    pub fn scheduler(&self) -> Option<Scheduler> {
        self.0.scheduler.clone()
    }

    pub fn set_on_stop(&self, hook: Option<StopHook>) {
        self.0.hooks.lock().on_stop = hook;
    }

    /// Install debug hooks. They only fire in debug builds.
    pub fn set_debug_hooks(&self, on_track: Option<DebugHook>, on_trigger: Option<DebugHook>) {
        let mut hooks = self.0.hooks.lock();
        hooks.on_track = on_track;
        hooks.on_trigger = on_trigger;
    }

    pub(crate) fn on_track_hook(&self) -> Option<DebugHook> {
        self.0.hooks.lock().on_track.clone()
    }

    pub(crate) fn on_trigger_hook(&self) -> Option<DebugHook> {
        self.0.hooks.lock().on_trigger.clone()
    }

    pub(crate) fn push_dep(&self, dep: &Dep) {
        self.0.deps.lock().push(dep.downgrade());
    }

    pub(crate) fn init_dep_markers(&self, bit: u32) {
        for dep in self.deps() {
            dep.mark_was_tracked(bit);
        }
    }

    /// Drop Deps that were tracked before this run but not during it.
    pub(crate) fn finalize_dep_markers(&self, bit: u32) {
        let current = std::mem::take(&mut *self.0.deps.lock());
        let mut kept = Vec::with_capacity(current.len());
        for weak in current {
            let Some(dep) = weak.upgrade() else {
                continue;
            };
            if dep.was_tracked(bit) && !dep.new_tracked(bit) {
                dep.remove(self);
            } else {
                kept.push(weak);
            }
            dep.clear_bits(bit);
        }
        // Subscriptions made while the list was taken are appended after.
        let mut deps = self.0.deps.lock();
        let added = std::mem::replace(&mut *deps, kept);
        deps.extend(added);
    }

    /// Remove this effect from every Dep and clear its list.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.0.deps.lock());
        for weak in deps {
            if let Some(dep) = weak.upgrade() {
                dep.remove(self);
            }
        }
    }
}

impl PartialEq for ReactiveEffect {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ReactiveEffect {}

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Options for [`effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<Scheduler>,
    scope: Option<EffectScope>,
    allow_recurse: bool,
    on_stop: Option<StopHook>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run the effect on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn scheduler(mut self, scheduler: impl Fn(&ReactiveEffect) + Send + Sync + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Register the effect in `scope` instead of the active scope.
    pub fn scope(mut self, scope: &EffectScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    pub fn on_stop(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(hook));
        self
    }

    pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + Send + Sync + 'static) -> Self {
        self.on_track = Some(Arc::new(hook));
        self
    }

    pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + Send + Sync + 'static) -> Self {
        self.on_trigger = Some(Arc::new(hook));
        self
    }
}

/// A handle bound to a registered effect; calling [`run`](Self::run) runs it.
///
/// Outside a scope the runner owns its effect: once every runner clone is
/// dropped, the effect stops reacting.
#[derive(Clone, Debug)]
pub struct EffectRunner {
    effect: ReactiveEffect,
}

impl EffectRunner {
    pub fn run(&self) -> Value {
        self.effect.run()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }
}

/// Register `func` as an effect and run it once.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(Object::record_from([("count", 0)]));
/// let state = state.into_reactive().unwrap();
///
/// let s = state.clone();
/// let runner = effect(move || println!("count is {}", s.get("count")));
///
/// state.set("count", 5); // prints "count is 5"
/// stop(&runner);
/// ```
pub fn effect<F, R>(func: F) -> EffectRunner
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    effect_with(func, EffectOptions::default())
}

/// Register `func` as an effect with the given options.
pub fn effect_with<F, R>(func: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    let effect = ReactiveEffect::new(func, options.scheduler, options.scope.as_ref());
    effect.set_allow_recurse(options.allow_recurse);
    effect.set_on_stop(options.on_stop);
    effect.set_debug_hooks(options.on_track, options.on_trigger);
    if !options.lazy {
        effect.run();
    }
    EffectRunner { effect }
}

/// Stop the effect behind `runner`.
pub fn stop(runner: &EffectRunner) {
    runner.effect.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
