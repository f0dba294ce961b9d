//! Boxed Reactive Values
//!
//! A [`Ref`] is a single observable cell. Reading it inside an effect
//! subscribes the effect to the cell's own Dependency Set; writing a
//! different value notifies those subscribers.
//!
//! # How Refs Work
//!
//! 1. A plain ref stores the raw form of what it was given and exposes the
//!    reactive form, so `Ref::new(object)` reads back a wrapper.
//!
//! 2. A write compares the raw form of the new value with the stored raw
//!    value (NaN-aware) and only notifies on a real change.
//!
//! 3. Shallow refs store values as given and only notify on reassignment;
//!    in-place mutation of their contents is announced with [`trigger_ref`].
//!
//! Other cells (custom refs, property refs, computed values) plug in through
//! the [`RefSource`] trait and share the same handle type.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::operations::{DebugOp, EventInfo, TrackKey, TrackOp, TriggerOp};
use super::runtime::{track_effects_with, trigger_effects_with};
use crate::diagnostics::dev_warn;
use crate::proxy::{self, Reactive};
use crate::value::{has_changed, Object, ObjectId, ObjectKind, PropKey, Value};

/// A value cell that can stand behind a [`Ref`] handle.
pub trait RefSource: Send + Sync + 'static {
    /// Identity of the cell.
    fn id(&self) -> ObjectId;

    /// Read the current value, tracking the read.
    fn get(&self) -> Value;

    /// Write a new value.
    fn set(&self, value: Value);

    fn is_readonly(&self) -> bool {
        false
    }

    fn is_shallow(&self) -> bool {
        false
    }

    /// Notify subscribers without changing the value.
    fn trigger(&self) {}
}

/// Subscribe the running effect to a cell's Dep, creating it on first use.
pub(crate) fn track_ref_value(id: ObjectId, dep: &OnceLock<Dep>) {
    if !ReactiveContext::is_tracking() {
        return;
    }
    let dep = dep.get_or_init(Dep::new);
    track_effects_with(dep, || EventInfo::track(id, TrackOp::Get, TrackKey::value()));
}

/// Notify a cell's subscribers, if it ever had any.
pub(crate) fn trigger_ref_value(id: ObjectId, dep: &OnceLock<Dep>, new_value: Option<Value>) {
    let Some(dep) = dep.get() else {
        return;
    };
    let info = cfg!(debug_assertions).then(|| EventInfo {
        target: id,
        op: DebugOp::Trigger(TriggerOp::Set),
        key: Some(TrackKey::value()),
        new_value,
        old_value: None,
    });
    trigger_effects_with(dep.subscribers(), info.as_ref());
}

/// A shared handle to a boxed reactive value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let c = count.clone();
/// effect(move || println!("count is {}", c.get()));
///
/// count.set(5); // prints "count is 5"
/// ```
#[derive(Clone)]
pub struct Ref(Arc<dyn RefSource>);

impl Ref {
    /// Box `value`. If `value` is already a ref, it is returned as-is.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::create(value.into(), false)
    }

    pub(crate) fn from_source(source: Arc<dyn RefSource>) -> Self {
        Self(source)
    }

    fn create(value: Value, shallow: bool) -> Self {
        match value {
            Value::Ref(r) => r,
            value => Self(Arc::new(RefImpl::new(value, shallow))),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn RefSource> {
        Arc::downgrade(&self.0)
    }

    /// Read the value, subscribing the running effect.
    pub fn get(&self) -> Value {
        self.0.get()
    }

    /// Write the value, notifying subscribers if it changed.
    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    pub fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.is_shallow()
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Ref {}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref{}", self.id())
    }
}

/// Box `value` without making its contents reactive.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    Ref::create(value.into(), true)
}

pub fn is_ref(value: &Value) -> bool {
    value.is_ref()
}

/// The boxed value if `value` is a ref, otherwise `value` itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// Force a notification of the ref's subscribers.
pub fn trigger_ref(r: &Ref) {
    r.0.trigger();
}

// ---------------------------------------------------------------------------
// Plain refs
// ---------------------------------------------------------------------------

struct RefState {
    raw: Value,
    value: Value,
}

struct RefImpl {
    id: ObjectId,
    shallow: bool,
    state: RwLock<RefState>,
    dep: OnceLock<Dep>,
}

impl RefImpl {
    fn new(value: Value, shallow: bool) -> Self {
        let state = if shallow {
            RefState {
                raw: value.clone(),
                value,
            }
        } else {
            RefState {
                raw: proxy::to_raw(&value),
                value: proxy::to_reactive(&value),
            }
        };
        Self {
            id: ObjectId::new(),
            shallow,
            state: RwLock::new(state),
            dep: OnceLock::new(),
        }
    }
}

impl RefSource for RefImpl {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn get(&self) -> Value {
        track_ref_value(self.id, &self.dep);
        self.state.read().value.clone()
    }

    fn set(&self, value: Value) {
        let raw = if self.shallow { value } else { proxy::to_raw(&value) };
        if !has_changed(&raw, &self.state.read().raw) {
            return;
        }
        let exposed = if self.shallow {
            raw.clone()
        } else {
            proxy::to_reactive(&raw)
        };
        let previous = {
            let mut state = self.state.write();
            let old = std::mem::replace(&mut state.value, exposed.clone());
            state.raw = raw;
            old
        };
        drop(previous);
        trigger_ref_value(self.id, &self.dep, Some(exposed));
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }

    fn trigger(&self) {
        let current = cfg!(debug_assertions).then(|| self.state.read().value.clone());
        trigger_ref_value(self.id, &self.dep, current);
    }
}

// ---------------------------------------------------------------------------
// Custom refs
// ---------------------------------------------------------------------------

/// Track and trigger handles given to a [`custom_ref`] factory.
#[derive(Clone)]
pub struct CustomRefHooks {
    id: ObjectId,
    dep: Arc<OnceLock<Dep>>,
}

impl CustomRefHooks {
    /// Record a read of the ref.
    pub fn track(&self) {
        track_ref_value(self.id, &self.dep);
    }

    /// Announce a change of the ref.
    pub fn trigger(&self) {
        trigger_ref_value(self.id, &self.dep, None);
    }
}

struct CustomRefImpl {
    hooks: CustomRefHooks,
    getter: Box<dyn Fn() -> Value + Send + Sync>,
    setter: Box<dyn Fn(Value) + Send + Sync>,
}

impl RefSource for CustomRefImpl {
    fn id(&self) -> ObjectId {
        self.hooks.id
    }

    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, value: Value) {
        (self.setter)(value);
    }

    fn trigger(&self) {
        self.hooks.trigger();
    }
}

/// Build a ref whose reads and writes are user-defined.
///
/// The factory receives hooks to call when the value is read and when it
/// changes, and returns the getter and setter.
pub fn custom_ref<F, G, S>(factory: F) -> Ref
where
    F: FnOnce(CustomRefHooks) -> (G, S),
    G: Fn() -> Value + Send + Sync + 'static,
    S: Fn(Value) + Send + Sync + 'static,
{
    let hooks = CustomRefHooks {
        id: ObjectId::new(),
        dep: Arc::new(OnceLock::new()),
    };
    let (getter, setter) = factory(hooks.clone());
    Ref(Arc::new(CustomRefImpl {
        hooks,
        getter: Box::new(getter),
        setter: Box::new(setter),
    }))
}

// ---------------------------------------------------------------------------
// Property refs
// ---------------------------------------------------------------------------

/// Property access on either a wrapper or a raw record.
fn read_property(object: &Value, key: &PropKey) -> Value {
    match object {
        Value::Reactive(wrapper) => wrapper.get(key.to_value()),
        Value::Object(obj) => obj.get(key),
        _ => Value::Undefined,
    }
}

struct ObjectRefImpl {
    id: ObjectId,
    object: Value,
    key: PropKey,
    default: Value,
}

impl RefSource for ObjectRefImpl {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn get(&self) -> Value {
        match read_property(&self.object, &self.key) {
            Value::Undefined => self.default.clone(),
            value => value,
        }
    }

    fn set(&self, value: Value) {
        match &self.object {
            Value::Reactive(wrapper) => {
                wrapper.set(self.key.to_value(), value);
            }
            Value::Object(obj) => {
                obj.set(self.key.clone(), value);
            }
            _ => {}
        }
    }
}

/// A ref bound to `object[key]`. Reads and writes go through `object`, so a
/// ref to a wrapper property stays in sync with the wrapper.
///
/// If the property already holds a ref, that ref is returned.
pub fn to_ref(object: &Value, key: impl Into<PropKey>) -> Ref {
    to_ref_with_default(object, key, Value::Undefined)
}

/// Like [`to_ref`], reading `default` while the property is `Undefined`.
pub fn to_ref_with_default(object: &Value, key: impl Into<PropKey>, default: impl Into<Value>) -> Ref {
    let key = key.into();
    if let Value::Ref(existing) = read_raw_slot(object, &key) {
        return existing;
    }
    Ref(Arc::new(ObjectRefImpl {
        id: ObjectId::new(),
        object: object.clone(),
        key,
        default: default.into(),
    }))
}

// Wrappers unwrap refs on read; look at the stored slot instead.
fn read_raw_slot(object: &Value, key: &PropKey) -> Value {
    match object {
        Value::Reactive(wrapper) => wrapper.raw_object().get(key),
        other => read_property(other, key),
    }
}

/// One property ref per enumerable string key of `object`.
pub fn to_refs(object: &Value) -> IndexMap<PropKey, Ref> {
    if !proxy::is_proxy(object) {
        dev_warn!("to_refs() expects a reactive object but received a plain one.");
    }
    let (keys, is_array) = match object {
        Value::Reactive(wrapper) => (wrapper.own_keys(), wrapper.target_kind() == ObjectKind::Array),
        Value::Object(obj) => (obj.own_keys(), obj.is_array()),
        _ => (Vec::new(), false),
    };
    keys.into_iter()
        .filter(|key| !matches!(key, PropKey::Symbol(_)) && !(is_array && key.is_length()))
        .map(|key| {
            let r = to_ref(object, key.clone());
            (key, r)
        })
        .collect()
}

/// A view of an object whose ref-valued properties read as their values
/// and accept plain writes into the ref.
#[derive(Clone, Debug)]
pub enum ProxyRefs {
    /// Wrappers already unwrap refs; the view delegates to it.
    Reactive(Reactive),
    /// A raw record whose ref slots are unwrapped by the view.
    Raw(Object),
}

impl ProxyRefs {
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        match self {
            Self::Reactive(wrapper) => wrapper.get(key.to_value()),
            Self::Raw(obj) => unref(&obj.get(&key)),
        }
    }

    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let (key, value) = (key.into(), value.into());
        match self {
            Self::Reactive(wrapper) => wrapper.set(key.to_value(), value),
            Self::Raw(obj) => match obj.get(&key) {
                Value::Ref(existing) if !value.is_ref() => {
                    existing.set(value);
                    true
                }
                _ => obj.set(key, value),
            },
        }
    }
}

/// Wrap `object` so ref-valued properties are unwrapped. Returns `None` for
/// values that are not objects.
pub fn proxy_refs(object: &Value) -> Option<ProxyRefs> {
    match object {
        Value::Reactive(wrapper) => Some(ProxyRefs::Reactive(wrapper.clone())),
        Value::Object(obj) => Some(ProxyRefs::Raw(obj.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{is_reactive, reactive};
    use crate::reactive::effect::{effect, EffectRunner};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counted(r: &Ref) -> (EffectRunner, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let (runs_clone, r) = (runs.clone(), r.clone());
        let runner = effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            r.get()
        });
        (runner, runs)
    }

    #[test]
    fn ref_notifies_on_change() {
        let count = Ref::new(1);
        let (_runner, runs) = counted(&count);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        count.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(count.get(), Value::from(2));

        // Same value, no notification.
        count.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nan_is_not_a_change() {
        let r = Ref::new(f64::NAN);
        let (_runner, runs) = counted(&r);
        r.set(f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ref_of_ref_is_the_same_ref() {
        let inner = Ref::new(1);
        let outer = Ref::new(&inner);
        assert!(outer.ptr_eq(&inner));
    }

    #[test]
    fn object_values_read_back_reactive() {
        let obj = Object::record_from([("a", 1)]);
        let r = Ref::new(&obj);
        assert!(is_reactive(&r.get()));

        let shallow = shallow_ref(&obj);
        assert_eq!(shallow.get(), Value::from(&obj));
    }

    #[test]
    fn writing_the_wrapper_of_the_stored_raw_is_not_a_change() {
        let obj = Object::record();
        let r = Ref::new(&obj);
        let (_runner, runs) = counted(&r);
        r.set(reactive(&obj));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_ref_forces_notification() {
        let obj = Object::record_from([("a", 1)]);
        let r = shallow_ref(&obj);
        let (_runner, runs) = counted(&r);

        obj.set(PropKey::from("a"), Value::from(2));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        trigger_ref(&r);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_ref_uses_its_hooks() {
        let store = Arc::new(RwLock::new(Value::from(0)));
        let r = custom_ref(|hooks| {
            let (read_store, read_hooks) = (store.clone(), hooks.clone());
            let write_store = store.clone();
            (
                move || {
                    read_hooks.track();
                    read_store.read().clone()
                },
                move |value| {
                    *write_store.write() = value;
                    hooks.trigger();
                },
            )
        });
        let (_runner, runs) = counted(&r);

        r.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(r.get(), Value::from(5));
    }

    #[test]
    fn to_ref_stays_in_sync_with_the_wrapper() {
        let state = reactive(Object::record_from([("a", 1)]));
        let a = to_ref(&state, "a");
        let (_runner, runs) = counted(&a);

        let wrapper = state.as_reactive().unwrap();
        wrapper.set("a", 2);
        assert_eq!(a.get(), Value::from(2));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        a.set(3);
        assert_eq!(wrapper.get("a"), Value::from(3));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn to_ref_reuses_existing_refs_and_defaults() {
        let existing = Ref::new(1);
        let obj = Value::from(Object::record_from([("r", Value::from(&existing))]));
        assert!(to_ref(&obj, "r").ptr_eq(&existing));

        let missing = to_ref_with_default(&obj, "missing", 7);
        assert_eq!(missing.get(), Value::from(7));
    }

    #[test]
    fn to_refs_skips_array_length() {
        let list = reactive(Object::array([1, 2]));
        let refs = to_refs(&list);
        let keys: Vec<PropKey> = refs.keys().cloned().collect();
        assert_eq!(keys, [PropKey::Index(0), PropKey::Index(1)]);
        assert_eq!(refs[&PropKey::Index(1)].get(), Value::from(2));
    }

    #[test]
    fn proxy_refs_unwraps_raw_records() {
        let count = Ref::new(1);
        let obj = Value::from(Object::record_from([("count", Value::from(&count)), ("plain", Value::from(2))]));
        let view = proxy_refs(&obj).unwrap();

        assert_eq!(view.get("count"), Value::from(1));
        assert!(view.set("count", 5));
        assert_eq!(count.get(), Value::from(5));

        assert!(view.set("plain", 3));
        assert_eq!(view.get("plain"), Value::from(3));
    }
}
