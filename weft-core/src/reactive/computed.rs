//! Computed Values
//!
//! A computed value is a cached derived value that re-evaluates only when
//! read after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside a lazy effect whose scheduler never re-runs
//!    it. Instead, a dependency change marks the cache dirty and notifies
//!    whoever read the computed value.
//!
//! 2. Reading a dirty computed value runs the getter once and caches the
//!    result. Reading a clean one returns the cache.
//!
//! 3. Values nobody reads stay dirty, so no work is spent on them.
//!
//! Notification is eager (dirtiness propagates through chains of computed
//! values right away) while evaluation is lazy.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use super::dep::Dep;
use super::effect::{DebugHook, ReactiveEffect, Scheduler};
use super::refs::{track_ref_value, trigger_ref_value, Ref, RefSource};
use crate::diagnostics::dev_warn;
use crate::value::{ObjectId, Value};

type Setter = Box<dyn Fn(Value) + Send + Sync>;

struct ComputedInner {
    id: ObjectId,
    effect: ReactiveEffect,
    value: RwLock<Value>,
    dirty: AtomicBool,
    dep: OnceLock<Dep>,
    setter: Option<Setter>,
}

impl RefSource for ComputedInner {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn get(&self) -> Value {
        track_ref_value(self.id, &self.dep);
        if self.dirty.swap(false, Ordering::AcqRel) {
            let fresh = self.effect.run();
            let stale = std::mem::replace(&mut *self.value.write(), fresh);
            drop(stale);
        }
        self.value.read().clone()
    }

    fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => dev_warn!("Write operation failed: computed value is readonly"),
        }
    }

    fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }

    fn trigger(&self) {
        trigger_ref_value(self.id, &self.dep, None);
    }
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        // Nothing can read the cache any more.
        self.effect.stop();
    }
}

/// A memoized derived computation.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(1);
/// let c = count.clone();
/// let doubled = computed(move || c.get().as_f64().unwrap_or(0.0) * 2.0);
///
/// assert_eq!(doubled.get(), Value::from(2));
/// count.set(5);
/// assert_eq!(doubled.get(), Value::from(10));
/// ```
#[derive(Clone)]
pub struct Computed(Arc<ComputedInner>);

impl Computed {
    fn build<F, R>(getter: F, setter: Option<Setter>) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        Self(Arc::new_cyclic(|weak: &Weak<ComputedInner>| {
            let weak = weak.clone();
            let scheduler: Scheduler = Arc::new(move |_: &ReactiveEffect| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.dirty.swap(true, Ordering::AcqRel) {
                    inner.trigger();
                }
            });
            ComputedInner {
                id: ObjectId::new(),
                effect: ReactiveEffect::new(getter, Some(scheduler), None),
                value: RwLock::new(Value::Undefined),
                dirty: AtomicBool::new(true),
                dep: OnceLock::new(),
                setter,
            }
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Read the value, recomputing it if a dependency changed.
    pub fn get(&self) -> Value {
        self.0.get()
    }

    /// Pass `value` to the setter. Getter-only computed values warn and
    /// ignore the write.
    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.0.dirty.load(Ordering::Acquire)
    }

    pub fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }

    /// The effect that runs the getter.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.0.effect
    }

    /// Install debug hooks on the underlying effect.
    pub fn set_debug_hooks(&self, on_track: Option<DebugHook>, on_trigger: Option<DebugHook>) {
        self.0.effect.set_debug_hooks(on_track, on_trigger);
    }

    /// This computed value as a [`Ref`] handle.
    pub fn to_ref(&self) -> Ref {
        let source: Arc<dyn RefSource> = self.0.clone();
        Ref::from_source(source)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("dirty", &self.is_dirty())
            .field("readonly", &self.is_readonly())
            .finish()
    }
}

impl From<Computed> for Ref {
    fn from(computed: Computed) -> Self {
        computed.to_ref()
    }
}

impl From<&Computed> for Ref {
    fn from(computed: &Computed) -> Self {
        computed.to_ref()
    }
}

impl From<Computed> for Value {
    fn from(computed: Computed) -> Self {
        Value::Ref(computed.to_ref())
    }
}

impl From<&Computed> for Value {
    fn from(computed: &Computed) -> Self {
        Value::Ref(computed.to_ref())
    }
}

/// A getter-only computed value.
pub fn computed<F, R>(getter: F) -> Computed
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    Computed::build(getter, None)
}

/// A computed value whose writes are passed to `setter`.
pub fn writable_computed<F, R, S>(getter: F, setter: S) -> Computed
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
    S: Fn(Value) + Send + Sync + 'static,
{
    Computed::build(getter, Some(Box::new(setter)))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use std::sync::atomic::AtomicI32;

    fn number(value: &Value) -> f64 {
        value.as_f64().unwrap_or(f64::NAN)
    }

    #[test]
    fn computed_is_lazy() {
        let evaluations = Arc::new(AtomicI32::new(0));
        let evaluations_clone = evaluations.clone();
        let c = computed(move || {
            evaluations_clone.fetch_add(1, Ordering::SeqCst);
            1
        });

        // Should not compute until accessed
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
        assert!(c.is_dirty());

        assert_eq!(c.get(), Value::from(1));
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);
        assert!(!c.is_dirty());
    }

    #[test]
    fn computed_caches_until_dependency_changes() {
        let source = Ref::new(2);
        let evaluations = Arc::new(AtomicI32::new(0));
        let (evaluations_clone, s) = (evaluations.clone(), source.clone());
        let doubled = computed(move || {
            evaluations_clone.fetch_add(1, Ordering::SeqCst);
            number(&s.get()) * 2.0
        });

        assert_eq!(doubled.get(), Value::from(4));
        assert_eq!(doubled.get(), Value::from(4));
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        source.set(5);
        // Marked dirty, but not recomputed yet.
        assert!(doubled.is_dirty());
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        assert_eq!(doubled.get(), Value::from(10));
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effects_rerun_when_computed_changes() {
        let source = Ref::new(1);
        let s = source.clone();
        let plus_one = computed(move || number(&s.get()) + 1.0);

        let seen = Arc::new(RwLock::new(Vec::new()));
        let (seen_clone, c) = (seen.clone(), plus_one.clone());
        let _runner = effect(move || seen_clone.write().push(c.get()));

        source.set(10);
        assert_eq!(*seen.read(), [Value::from(2), Value::from(11)]);
    }

    #[test]
    fn chained_computed_values() {
        let source = Ref::new(1);
        let s = source.clone();
        let a = computed(move || number(&s.get()) * 10.0);
        let a_clone = a.clone();
        let b = computed(move || number(&a_clone.get()) + 1.0);

        assert_eq!(b.get(), Value::from(11));
        source.set(2);
        assert!(a.is_dirty());
        assert!(b.is_dirty());
        assert_eq!(b.get(), Value::from(21));
    }

    #[test]
    fn writable_computed_forwards_writes() {
        let source = Ref::new(1);
        let (read, write) = (source.clone(), source.clone());
        let c = writable_computed(
            move || number(&read.get()) + 1.0,
            move |value| write.set(number(&value) - 1.0),
        );

        c.set(10);
        assert_eq!(source.get(), Value::from(9));
        assert_eq!(c.get(), Value::from(10));
        assert!(!c.is_readonly());
    }

    #[test]
    fn getter_only_computed_ignores_writes() {
        let c = computed(|| 1);
        assert!(c.is_readonly());
        assert!(c.to_ref().is_readonly());
        c.set(5);
        assert_eq!(c.get(), Value::from(1));
    }

    #[test]
    fn dropping_the_computed_stops_its_effect() {
        let source = Ref::new(1);
        let s = source.clone();
        let c = computed(move || s.get());
        c.get();
        let effect = c.effect().clone();
        assert!(effect.is_active());

        drop(c);
        assert!(!effect.is_active());
        assert_eq!(effect.dependency_count(), 0);
    }
}
