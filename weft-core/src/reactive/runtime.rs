//! Reactive Runtime
//!
//! The runtime connects reads to writes. It owns the Dependency Registry, a
//! two-level map from raw target to observable key to [`Dep`], and implements
//! the track and trigger halves of the protocol.
//!
//! # How It Works
//!
//! 1. When wrapped state is read inside a running effect, `track` finds (or
//!    creates) the Dep for that `(target, key)` pair and subscribes the
//!    effect using the marker-bit algorithm.
//!
//! 2. When wrapped state is written, `trigger` collects the Deps for the
//!    written key plus any structural keys the write affects (iteration,
//!    map keys, array length), flattens them into one de-duplicated list of
//!    effects, and notifies each one.
//!
//! 3. A notified effect is handed to its scheduler if it has one, and run
//!    directly otherwise.
//!
//! # Thread Safety
//!
//! The registry is a process-wide `DashMap` keyed by target identity.
//! Entries are removed when their target is dropped. No registry guard is
//! held while effects run or while subscriptions are released.

use std::sync::OnceLock;

use dashmap::DashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::context::{ReactiveContext, MAX_MARKER_BITS};
use super::dep::Dep;
use super::effect::ReactiveEffect;
use super::operations::{DebugOp, EventInfo, TrackKey, TrackOp, TriggerOp};
use super::subscriber::SubscriberId;
use crate::value::{Object, ObjectId, ObjectKind, Value};

type KeyToDepMap = IndexMap<TrackKey, Dep>;

static REGISTRY: OnceLock<DashMap<ObjectId, KeyToDepMap>> = OnceLock::new();

fn get_registry() -> &'static DashMap<ObjectId, KeyToDepMap> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Introspection over the global Dependency Registry.
pub struct Runtime;

impl Runtime {
    /// The Dep recorded for `(target, key)`, if anything ever tracked it.
    pub fn dep(target: &Object, key: &TrackKey) -> Option<Dep> {
        get_registry()
            .get(&target.id())
            .and_then(|deps| deps.get(key).cloned())
    }

    /// Whether any key of `target` was ever tracked.
    pub fn is_tracked(target: &Object) -> bool {
        get_registry().contains_key(&target.id())
    }

    /// Number of targets with registry entries.
    pub fn target_count() -> usize {
        get_registry().len()
    }
}

/// Drop the registry entry of a target that no longer exists.
pub(crate) fn forget_target(id: ObjectId) {
    let removed = get_registry().remove(&id);
    drop(removed);
}

/// Record that the running effect read `key` of `target`.
pub fn track(target: &Object, op: TrackOp, key: TrackKey) {
    if !ReactiveContext::is_tracking() {
        return;
    }
    let dep = {
        let mut deps = get_registry().entry(target.id()).or_default();
        deps.entry(key.clone()).or_default().clone()
    };
    track_effects_with(&dep, || EventInfo::track(target.id(), op, key));
}

/// Subscribe the running effect to `dep`.
pub fn track_effects(dep: &Dep) {
    track_effects_with(dep, || EventInfo {
        target: ObjectId::default(),
        op: DebugOp::Track(TrackOp::Get),
        key: None,
        new_value: None,
        old_value: None,
    });
}

pub(crate) fn track_effects_with(dep: &Dep, info: impl FnOnce() -> EventInfo) {
    let Some(frame) = ReactiveContext::tracking_frame() else {
        return;
    };
    let effect = frame.effect;

    let should_track = if frame.depth <= MAX_MARKER_BITS {
        if dep.new_tracked(frame.bit) {
            false
        } else {
            dep.mark_new_tracked(frame.bit);
            !dep.was_tracked(frame.bit)
        }
    } else {
        // Full cleanup mode.
        !dep.contains(&effect)
    };

    if should_track {
        dep.insert(&effect);
        effect.push_dep(dep);
        if cfg!(debug_assertions) {
            if let Some(hook) = effect.on_track_hook() {
                hook(&info().for_effect(&effect));
            }
        }
    }
}

/// Announce a write to `target` and notify the affected effects.
///
/// For arrays, a `Set` of `length` notifies the length Dep and every index
/// Dep at or past the new length.
pub fn trigger(
    target: &Object,
    op: TriggerOp,
    key: Option<TrackKey>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    let deps: SmallVec<[Dep; 4]> = {
        let Some(deps_map) = get_registry().get(&target.id()) else {
            // never been tracked
            return;
        };
        collect_deps(&deps_map, target.kind(), op, key.as_ref(), new_value)
    };
    if deps.is_empty() {
        return;
    }

    let mut effects: IndexMap<SubscriberId, ReactiveEffect> = IndexMap::new();
    for dep in &deps {
        for effect in dep.subscribers() {
            effects.entry(effect.id()).or_insert(effect);
        }
    }
    trace!(
        object = %target.id(),
        %op,
        key = ?key,
        deps = deps.len(),
        effects = effects.len(),
        "trigger"
    );

    let info = cfg!(debug_assertions).then(|| EventInfo {
        target: target.id(),
        op: DebugOp::Trigger(op),
        key,
        new_value: new_value.cloned(),
        old_value: old_value.cloned(),
    });
    trigger_effects_with(effects.into_values(), info.as_ref());
}

fn collect_deps(
    deps_map: &KeyToDepMap,
    kind: ObjectKind,
    op: TriggerOp,
    key: Option<&TrackKey>,
    new_value: Option<&Value>,
) -> SmallVec<[Dep; 4]> {
    let mut deps = SmallVec::new();
    let is_array = kind == ObjectKind::Array;

    if op == TriggerOp::Clear {
        // collection being cleared
        deps.extend(deps_map.values().cloned());
    } else if is_array && key.is_some_and(TrackKey::is_length) {
        let new_len = new_value.and_then(Value::as_f64).unwrap_or(0.0);
        for (dep_key, dep) in deps_map {
            let past_end = dep_key.as_index().is_some_and(|i| i as f64 >= new_len);
            if dep_key.is_length() || past_end {
                deps.push(dep.clone());
            }
        }
    } else {
        let mut push = |k: &TrackKey| {
            if let Some(dep) = deps_map.get(k) {
                deps.push(dep.clone());
            }
        };
        if let Some(key) = key {
            push(key);
        }

        // also run for iteration key on ADD | DELETE | Map.SET
        match op {
            TriggerOp::Add | TriggerOp::Delete if !is_array => {
                push(&TrackKey::Iterate);
                if kind == ObjectKind::Map {
                    push(&TrackKey::MapKeyIterate);
                }
            }
            TriggerOp::Add if key.and_then(TrackKey::as_index).is_some() => {
                // new index added to array -> length changes
                push(&TrackKey::length());
            }
            TriggerOp::Set if kind == ObjectKind::Map => push(&TrackKey::Iterate),
            _ => {}
        }
    }
    deps
}

/// Notify every effect in `effects`.
pub fn trigger_effects(effects: impl IntoIterator<Item = ReactiveEffect>) {
    trigger_effects_with(effects, None);
}

pub(crate) fn trigger_effects_with(
    effects: impl IntoIterator<Item = ReactiveEffect>,
    info: Option<&EventInfo>,
) {
    for effect in effects {
        if !effect.is_active() {
            continue;
        }
        let is_current = ReactiveContext::active_effect().is_some_and(|a| a.ptr_eq(&effect));
        if is_current && !effect.allow_recurse() {
            continue;
        }
        if cfg!(debug_assertions) {
            if let (Some(info), Some(hook)) = (info, effect.on_trigger_hook()) {
                hook(&info.for_effect(&effect));
            }
        }
        match effect.scheduler() {
            Some(scheduler) => scheduler(&effect),
            None => {
                effect.run();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::reactive;
    use crate::reactive::effect::effect;
    use crate::value::PropKey;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counting_effect(target: &Object, key: TrackKey) -> (ReactiveEffect, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let target = target.clone();
        let effect = ReactiveEffect::new(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                track(&target, TrackOp::Get, key.clone());
            },
            None,
            None,
        );
        effect.run();
        (effect, runs)
    }

    #[test]
    fn track_outside_effect_is_a_no_op() {
        let target = Object::record();
        track(&target, TrackOp::Get, TrackKey::Prop(PropKey::from("a")));
        assert!(!Runtime::is_tracked(&target));
    }

    #[test]
    fn trigger_runs_subscribers_of_the_key() {
        let target = Object::record();
        let key = TrackKey::Prop(PropKey::from("a"));
        let (effect, runs) = counting_effect(&target, key.clone());

        assert!(Runtime::dep(&target, &key).unwrap().contains(&effect));
        trigger(&target, TriggerOp::Set, Some(key), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger(&target, TriggerOp::Set, Some(TrackKey::Prop(PropKey::from("b"))), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_notifies_iteration() {
        let target = Object::record();
        let (_effect, runs) = counting_effect(&target, TrackKey::Iterate);

        trigger(&target, TriggerOp::Add, Some(TrackKey::Prop(PropKey::from("new"))), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger(&target, TriggerOp::Set, Some(TrackKey::Prop(PropKey::from("new"))), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn map_set_notifies_iteration_but_not_key_iteration() {
        let target = Object::map_from(Vec::<(Value, Value)>::new());
        let (_values, value_runs) = counting_effect(&target, TrackKey::Iterate);
        let (_keys, key_runs) = counting_effect(&target, TrackKey::MapKeyIterate);

        trigger(&target, TriggerOp::Set, Some(TrackKey::entry(&Value::from("k"))), None, None);
        assert_eq!(value_runs.load(Ordering::SeqCst), 2);
        assert_eq!(key_runs.load(Ordering::SeqCst), 1);

        trigger(&target, TriggerOp::Delete, Some(TrackKey::entry(&Value::from("k"))), None, None);
        assert_eq!(value_runs.load(Ordering::SeqCst), 3);
        assert_eq!(key_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn array_length_notifies_truncated_indices() {
        let target = Object::array([1, 2, 3]);
        let (_first, first_runs) = counting_effect(&target, TrackKey::Prop(PropKey::Index(0)));
        let (_last, last_runs) = counting_effect(&target, TrackKey::Prop(PropKey::Index(2)));

        trigger(
            &target,
            TriggerOp::Set,
            Some(TrackKey::length()),
            Some(&Value::from(1)),
            Some(&Value::from(3)),
        );
        assert_eq!(first_runs.load(Ordering::SeqCst), 1);
        assert_eq!(last_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn array_index_add_notifies_length() {
        let target = Object::array([1]);
        let (_effect, runs) = counting_effect(&target, TrackKey::length());

        trigger(&target, TriggerOp::Add, Some(TrackKey::Prop(PropKey::Index(1))), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_notifies_every_key() {
        let target = Object::set_from(Vec::<Value>::new());
        let (_a, a_runs) = counting_effect(&target, TrackKey::entry(&Value::from("a")));
        let (_b, b_runs) = counting_effect(&target, TrackKey::Iterate);

        trigger(&target, TriggerOp::Clear, None, None, None);
        assert_eq!(a_runs.load(Ordering::SeqCst), 2);
        assert_eq!(b_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_on_two_keys_runs_once_per_trigger() {
        let target = Object::record();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let tracked = target.clone();
        let effect = ReactiveEffect::new(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                track(&tracked, TrackOp::Get, TrackKey::Prop(PropKey::from("a")));
                track(&tracked, TrackOp::Iterate, TrackKey::Iterate);
            },
            None,
            None,
        );
        effect.run();

        trigger(&target, TriggerOp::Add, Some(TrackKey::Prop(PropKey::from("a"))), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn registry_entry_dies_with_target() {
        let target = Object::record();
        let weak = target.downgrade();
        let effect = ReactiveEffect::new(
            move || {
                if let Some(target) = weak.upgrade() {
                    track(&target, TrackOp::Iterate, TrackKey::Iterate);
                }
            },
            None,
            None,
        );
        effect.run();
        assert!(Runtime::is_tracked(&target));

        let id = target.id();
        drop(target);
        assert!(!get_registry().contains_key(&id));
    }

    #[test]
    fn unstopped_effects_do_not_leak_what_they_watch() {
        let obj = Object::record_from([("a", 1)]);
        let (weak, id) = (obj.downgrade(), obj.id());
        let state = reactive(obj).into_reactive().unwrap();
        let s = state.clone();
        let runner = effect(move || s.get("a"));
        assert!(get_registry().contains_key(&id));
        let dep = get_registry()
            .get(&id)
            .and_then(|deps| deps.get(&TrackKey::Prop(PropKey::from("a"))).cloned())
            .unwrap();
        assert_eq!(dep.len(), 1);

        drop(runner);
        assert!(dep.is_empty());
        drop(state);
        assert!(weak.upgrade().is_none());
        assert!(!get_registry().contains_key(&id));
    }

    #[test]
    fn a_dropped_runner_stops_reacting() {
        let state = reactive(Object::record_from([("a", 1)])).into_reactive().unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let (runs_clone, s) = (runs.clone(), state.clone());
        let runner = effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            s.get("a")
        });

        state.set("a", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        drop(runner);
        state.set("a", 3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
