//! Effect Scopes
//!
//! A scope collects the effects (and child scopes) created while it is
//! running, so they can all be torn down with one [`EffectScope::stop`].
//!
//! # How Scopes Work
//!
//! 1. [`EffectScope::run`] makes the scope current for the duration of a
//!    closure. Effects created inside it register with the scope; scopes
//!    created inside it (unless detached) become its children.
//!
//! 2. Stopping a scope stops its effects, runs its dispose callbacks, then
//!    stops its children. A child stopped on its own is removed from its
//!    parent's list.
//!
//! 3. A stopped scope stays stopped. Running it again only warns.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::context::{current_scope, pop_scope, push_scope};
use super::effect::ReactiveEffect;
use crate::diagnostics::dev_warn;

type Cleanup = Box<dyn FnOnce() + Send>;

struct ScopeInner {
    active: AtomicBool,
    effects: Mutex<Vec<ReactiveEffect>>,
    cleanups: Mutex<Vec<Cleanup>>,
    scopes: Mutex<Vec<EffectScope>>,
    parent: Option<Weak<ScopeInner>>,
}

/// A lifetime grouping for effects.
#[derive(Clone)]
pub struct EffectScope(Arc<ScopeInner>);

/// Pops the current scope when dropped.
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        pop_scope();
    }
}

impl EffectScope {
    /// Create a scope. Unless `detached`, it becomes a child of the current
    /// scope and is stopped along with it.
    pub fn new(detached: bool) -> Self {
        let parent = if detached { None } else { current_scope() };
        let scope = Self(Arc::new(ScopeInner {
            active: AtomicBool::new(true),
            effects: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            scopes: Mutex::new(Vec::new()),
            parent: parent.as_ref().map(|p| Arc::downgrade(&p.0)),
        }));
        if let Some(parent) = parent {
            parent.0.scopes.lock().push(scope.clone());
        }
        scope
    }

    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Run `f` with this scope as the current scope.
    ///
    /// Returns `None` without calling `f` if the scope has been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            dev_warn!("cannot run an inactive effect scope.");
            return None;
        }
        push_scope(self.clone());
        let _guard = ScopeGuard;
        Some(f())
    }

    /// Register a callback to run when the scope is stopped.
    pub fn on_dispose(&self, f: impl FnOnce() + Send + 'static) {
        self.0.cleanups.lock().push(Box::new(f));
    }

    /// Number of effects currently registered with this scope.
    pub fn effect_count(&self) -> usize {
        self.0.effects.lock().len()
    }

    /// Number of child scopes.
    pub fn scope_count(&self) -> usize {
        self.0.scopes.lock().len()
    }

    /// Stop every effect and child scope, and run dispose callbacks.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        if !self.0.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let effects = std::mem::take(&mut *self.0.effects.lock());
        let cleanups = std::mem::take(&mut *self.0.cleanups.lock());
        let scopes = std::mem::take(&mut *self.0.scopes.lock());
        debug!(
            effects = effects.len(),
            cleanups = cleanups.len(),
            scopes = scopes.len(),
            "stopping effect scope"
        );

        for effect in &effects {
            effect.stop();
        }
        for cleanup in cleanups {
            cleanup();
        }
        for scope in &scopes {
            scope.stop_inner(true);
        }

        if !from_parent {
            if let Some(parent) = self.0.parent.as_ref().and_then(Weak::upgrade) {
                let removed = {
                    let mut siblings = parent.scopes.lock();
                    siblings
                        .iter()
                        .position(|s| s.ptr_eq(self))
                        .map(|index| siblings.swap_remove(index))
                };
                drop(removed);
            }
        }
    }

    fn record(&self, effect: &ReactiveEffect) {
        if self.is_active() {
            self.0.effects.lock().push(effect.clone());
        }
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("effects", &self.effect_count())
            .field("scopes", &self.scope_count())
            .finish()
    }
}

/// Create a scope; see [`EffectScope::new`].
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

/// The scope currently running, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    current_scope()
}

/// Register a dispose callback on the current scope.
pub fn on_scope_dispose(f: impl FnOnce() + Send + 'static) {
    match current_scope() {
        Some(scope) => scope.on_dispose(f),
        None => dev_warn!(
            "on_scope_dispose() is called when there is no active effect scope to be associated with."
        ),
    }
}

/// Register `effect` with `scope`, or with the current scope.
pub(crate) fn record_effect_scope(effect: &ReactiveEffect, scope: Option<&EffectScope>) {
    match scope {
        Some(scope) => scope.record(effect),
        None => {
            if let Some(scope) = current_scope() {
                scope.record(effect);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, effect_with, EffectOptions};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn scope_collects_effects() {
        let scope = EffectScope::new(false);
        let runner = scope.run(|| effect(|| {})).unwrap();
        assert_eq!(scope.effect_count(), 1);

        scope.stop();
        assert!(!scope.is_active());
        assert!(!runner.effect().is_active());
    }

    #[test]
    fn effects_outside_a_scope_are_not_collected() {
        let scope = EffectScope::new(false);
        let _runner = effect(|| {});
        assert_eq!(scope.effect_count(), 0);
    }

    #[test]
    fn explicit_scope_option_wins() {
        let outer = EffectScope::new(false);
        let target = EffectScope::new(true);
        outer.run(|| effect_with(|| {}, EffectOptions::new().scope(&target)));
        assert_eq!(outer.effect_count(), 0);
        assert_eq!(target.effect_count(), 1);
    }

    #[test]
    fn nested_scopes_stop_with_parent() {
        let parent = EffectScope::new(false);
        let (child, detached, runner) = parent
            .run(|| {
                let child = EffectScope::new(false);
                let detached = EffectScope::new(true);
                let runner = child.run(|| effect(|| {})).unwrap();
                (child, detached, runner)
            })
            .unwrap();
        assert_eq!(parent.scope_count(), 1);

        parent.stop();
        assert!(!child.is_active());
        assert!(detached.is_active());
        assert!(!runner.effect().is_active());
    }

    #[test]
    fn stopping_a_child_detaches_it_from_the_parent() {
        let parent = EffectScope::new(false);
        let (first, second) = parent
            .run(|| (EffectScope::new(false), EffectScope::new(false)))
            .unwrap();
        assert_eq!(parent.scope_count(), 2);

        first.stop();
        assert_eq!(parent.scope_count(), 1);
        assert!(second.is_active());
    }

    #[test]
    fn dispose_callbacks_run_once() {
        let disposed = Arc::new(AtomicI32::new(0));
        let scope = EffectScope::new(false);
        let disposed_clone = disposed.clone();
        scope.run(|| {
            assert!(get_current_scope().unwrap().ptr_eq(&scope));
            on_scope_dispose(move || {
                disposed_clone.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert!(get_current_scope().is_none());

        scope.stop();
        scope.stop();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn inactive_scope_does_not_run() {
        let scope = EffectScope::new(false);
        scope.stop();
        assert!(scope.run(|| 1).is_none());
    }
}
