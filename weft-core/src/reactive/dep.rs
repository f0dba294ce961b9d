//! Dependency Sets
//!
//! A [`Dep`] is the subscriber collection for one observable location. Two
//! bit masks ride along with it: `w` ("was tracked before this run") and
//! `n` ("tracked during this run"). Each nesting level of effect execution
//! owns one bit, so a Dep can be re-subscribed incrementally: at the end of
//! a run, anything that was tracked before but not now is dropped, without
//! clearing and rebuilding every subscription.
//!
//! Subscribers are held weakly. An effect is owned by whoever created it
//! (its runner, its scope, or a computed value), never by the state it
//! watches.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::effect::{ReactiveEffect, WeakEffect};
use super::subscriber::SubscriberId;

pub(crate) struct DepInner {
    subscribers: Mutex<IndexMap<SubscriberId, WeakEffect>>,
    w: AtomicU32,
    n: AtomicU32,
}

/// The set of effects subscribed to one observable location.
#[derive(Clone)]
pub struct Dep(Arc<DepInner>);

/// A Dep as referenced from an effect's dependency list.
#[derive(Clone)]
pub(crate) struct WeakDep(Weak<DepInner>);

impl WeakDep {
    pub(crate) fn upgrade(&self) -> Option<Dep> {
        self.0.upgrade().map(Dep)
    }

    pub(crate) fn points_to(&self, dep: &Dep) -> bool {
        Weak::as_ptr(&self.0) == Arc::as_ptr(&dep.0)
    }
}

impl Dep {
    pub fn new() -> Self {
        Self(Arc::new(DepInner {
            subscribers: Mutex::new(IndexMap::new()),
            w: AtomicU32::new(0),
            n: AtomicU32::new(0),
        }))
    }

    /// Number of subscribed effects that are still alive.
    pub fn len(&self) -> usize {
        self.0.subscribers.lock().values().filter(|e| e.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, effect: &ReactiveEffect) -> bool {
        self.0.subscribers.lock().contains_key(&effect.id())
    }

    /// Snapshot of the live subscribers, in subscription order.
    pub fn subscribers(&self) -> Vec<ReactiveEffect> {
        self.0.subscribers.lock().values().filter_map(WeakEffect::upgrade).collect()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakDep {
        WeakDep(Arc::downgrade(&self.0))
    }

    pub(crate) fn insert(&self, effect: &ReactiveEffect) {
        self.0.subscribers.lock().insert(effect.id(), effect.downgrade());
    }

    pub(crate) fn remove(&self, effect: &ReactiveEffect) {
        self.remove_id(effect.id());
    }

    pub(crate) fn remove_id(&self, id: SubscriberId) {
        self.0.subscribers.lock().shift_remove(&id);
    }

    pub(crate) fn was_tracked(&self, bit: u32) -> bool {
        self.0.w.load(Ordering::Relaxed) & bit != 0
    }

    pub(crate) fn new_tracked(&self, bit: u32) -> bool {
        self.0.n.load(Ordering::Relaxed) & bit != 0
    }

    pub(crate) fn mark_was_tracked(&self, bit: u32) {
        self.0.w.fetch_or(bit, Ordering::Relaxed);
    }

    pub(crate) fn mark_new_tracked(&self, bit: u32) {
        self.0.n.fetch_or(bit, Ordering::Relaxed);
    }

    pub(crate) fn clear_bits(&self, bit: u32) {
        self.0.w.fetch_and(!bit, Ordering::Relaxed);
        self.0.n.fetch_and(!bit, Ordering::Relaxed);
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("subscribers", &self.len())
            .field("w", &self.0.w.load(Ordering::Relaxed))
            .field("n", &self.0.n.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn subscribing_twice_is_a_no_op() {
        let dep = Dep::new();
        let effect = ReactiveEffect::new(|| Value::Undefined, None, None);

        dep.insert(&effect);
        dep.insert(&effect);
        assert_eq!(dep.len(), 1);
        assert!(dep.contains(&effect));

        dep.remove(&effect);
        assert!(dep.is_empty());
    }

    #[test]
    fn subscribers_are_not_kept_alive() {
        let dep = Dep::new();
        let kept = ReactiveEffect::new(|| Value::Undefined, None, None);
        let dropped = ReactiveEffect::new(|| Value::Undefined, None, None);
        dep.insert(&kept);
        dep.insert(&dropped);
        assert_eq!(dep.len(), 2);

        drop(dropped);
        assert_eq!(dep.len(), 1);
        assert_eq!(dep.subscribers(), [kept]);
    }

    #[test]
    fn markers_are_per_bit() {
        let dep = Dep::new();
        dep.mark_was_tracked(0b10);
        dep.mark_new_tracked(0b100);

        assert!(dep.was_tracked(0b10));
        assert!(!dep.was_tracked(0b100));
        assert!(dep.new_tracked(0b100));

        dep.clear_bits(0b10);
        assert!(!dep.was_tracked(0b10));
        assert!(dep.new_tracked(0b100));
    }

    #[test]
    fn weak_dep_tracks_liveness() {
        let dep = Dep::new();
        let weak = dep.downgrade();
        assert!(weak.points_to(&dep));
        assert!(weak.upgrade().is_some());

        drop(dep);
        assert!(weak.upgrade().is_none());
    }
}
