//! Observable Wrappers
//!
//! [`reactive`], [`readonly`], [`shallow_reactive`] and [`shallow_readonly`]
//! return a [`Reactive`] handle that intercepts reads and writes on a raw
//! [`Object`]. Reads through a mutable wrapper are tracked; writes trigger.
//!
//! # How Wrapping Works
//!
//! 1. A wrapper is created at most once per (target, kind) and lives as
//!    long as its raw object. The cache owns the wrapper's identity; each
//!    handle owns the raw object, so neither keeps the other alive in a
//!    cycle.
//!
//! 2. Records and arrays use the property handlers in `base`, with the
//!    array methods in `array`. Maps, sets and their weak variants use the
//!    method handlers in `collection`. The family is fixed at creation.
//!
//! 3. Nested composites are wrapped lazily, on read, with the same kind of
//!    wrapper as the parent (shallow wrappers return them as stored).
//!
//! 4. `readonly` over a mutable wrapper layers a readonly wrapper on top of
//!    it. Reads go through the inner wrapper, so they are still tracked.

mod array;
mod base;
mod cache;
mod collection;

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::diagnostics::dev_warn;
use crate::value::{Object, ObjectId, ObjectKind, PropKey, Value, LENGTH};

/// The four wrapper variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    Reactive,
    Readonly,
    ShallowReactive,
    ShallowReadonly,
}

impl WrapperKind {
    pub fn is_readonly(self) -> bool {
        matches!(self, Self::Readonly | Self::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Self::ShallowReactive | Self::ShallowReadonly)
    }
}

/// Which handler set a wrapper dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandlerFamily {
    Common,
    Collection,
}

impl HandlerFamily {
    fn of(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Record | ObjectKind::Array => Some(Self::Common),
            ObjectKind::Map | ObjectKind::Set | ObjectKind::WeakMap | ObjectKind::WeakSet => {
                Some(Self::Collection)
            }
            ObjectKind::Opaque => None,
        }
    }
}

/// What a wrapper intercepts: a raw object, or another wrapper.
pub(crate) enum ProxyTarget {
    Raw(Object),
    Wrapper(Reactive),
}

impl ProxyTarget {
    fn get(&self, key: &PropKey) -> Value {
        match self {
            Self::Raw(obj) => obj.get(key),
            Self::Wrapper(wrapper) => wrapper.get(key.to_value()),
        }
    }

    fn has(&self, key: &PropKey) -> bool {
        match self {
            Self::Raw(obj) => obj.has_own(key),
            Self::Wrapper(wrapper) => wrapper.has(key.to_value()),
        }
    }

    fn own_keys(&self) -> Vec<PropKey> {
        match self {
            Self::Raw(obj) => obj.own_keys(),
            Self::Wrapper(wrapper) => wrapper.own_keys(),
        }
    }
}

/// The identity half of a wrapper. It never owns the raw object.
pub(crate) struct ReactiveInner {
    id: ObjectId,
    kind: WrapperKind,
    family: HandlerFamily,
    /// The mutable wrapper a readonly wrapper is layered over.
    layer: Option<Arc<ReactiveInner>>,
}

/// Cache slot of a wrapper: its own kind, plus the kind of the wrapper it
/// is layered over.
pub(crate) type Slot = (WrapperKind, Option<WrapperKind>);

impl ReactiveInner {
    fn slot(&self) -> Slot {
        (self.kind, self.layer.as_ref().map(|inner| inner.kind))
    }
}

/// The wrappers of one raw object.
pub(crate) type Wrappers = SmallVec<[Arc<ReactiveInner>; 2]>;

/// An intercepting wrapper over a composite value.
///
/// Clones share the wrapper; equality is identity. Wrappers are unique per
/// target and kind for the whole life of the target, so two lookups of the
/// same target compare equal even if no handle was kept in between.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<ReactiveInner>,
    raw: Object,
}

impl Reactive {
    /// The wrapper of `kind` over `target`, if one was created.
    pub fn lookup(target: &Object, kind: WrapperKind) -> Option<Reactive> {
        cache::lookup(target.id(), (kind, None)).map(|inner| Reactive {
            inner,
            raw: target.clone(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ReactiveInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn kind(&self) -> WrapperKind {
        self.inner.kind
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.kind.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.kind.is_shallow()
    }

    /// The raw object at the bottom of any wrapper layers.
    pub fn raw_object(&self) -> Object {
        self.raw.clone()
    }

    /// Kind of the raw object at the bottom of any wrapper layers.
    pub fn target_kind(&self) -> ObjectKind {
        self.raw.kind()
    }

    pub(crate) fn target(&self) -> ProxyTarget {
        match &self.inner.layer {
            Some(inner) => ProxyTarget::Wrapper(Reactive {
                inner: inner.clone(),
                raw: self.raw.clone(),
            }),
            None => ProxyTarget::Raw(self.raw.clone()),
        }
    }

    // ------------------------------------------------------------------
    // Generic traps
    // ------------------------------------------------------------------

    /// Read a property, or the entry for `key` of a map.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        match self.inner.family {
            HandlerFamily::Common => match PropKey::from_value(&key) {
                Some(key) => base::get(self, &key),
                None => Value::Undefined,
            },
            HandlerFamily::Collection => collection::get(self, &key),
        }
    }

    /// Write a property, or the entry for `key` of a map. Returns whether
    /// the write was accepted.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let (key, value) = (key.into(), value.into());
        match self.inner.family {
            HandlerFamily::Common => match PropKey::from_value(&key) {
                Some(key) => base::set(self, key, value),
                None => false,
            },
            HandlerFamily::Collection => collection::set(self, key, value),
        }
    }

    /// Whether the property, entry or member is present.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        match self.inner.family {
            HandlerFamily::Common => match PropKey::from_value(&key) {
                Some(key) => base::has(self, &key),
                None => false,
            },
            HandlerFamily::Collection => collection::has(self, &key),
        }
    }

    /// Remove a property, entry or member.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        match self.inner.family {
            HandlerFamily::Common => match PropKey::from_value(&key) {
                Some(key) => base::delete(self, &key),
                None => false,
            },
            HandlerFamily::Collection => collection::delete(self, &key),
        }
    }

    /// Own property keys of a record or array. Collections have none.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match self.inner.family {
            HandlerFamily::Common => base::own_keys(self),
            HandlerFamily::Collection => Vec::new(),
        }
    }

    /// Array length, record key count, or collection size.
    pub fn len(&self) -> usize {
        match self.inner.family {
            HandlerFamily::Common if self.target_kind() == ObjectKind::Array => {
                self.get(LENGTH).as_f64().map_or(0, |n| n as usize)
            }
            HandlerFamily::Common => self.own_keys().len(),
            HandlerFamily::Collection => self.size().unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}{})", self.kind(), self.target_kind(), self.raw.id())
    }
}

/// Drop the wrappers of a raw object that no longer exists.
pub(crate) fn evict_target(id: ObjectId) {
    cache::evict_target(id);
}

fn create_reactive_object(target: Value, kind: WrapperKind) -> Value {
    let (raw, layer) = match &target {
        Value::Object(obj) => (obj.clone(), None),
        // Already a wrapper; only readonly() layers over a mutable one.
        Value::Reactive(wrapper) if kind.is_readonly() && !wrapper.is_readonly() => {
            (wrapper.raw.clone(), Some(wrapper.inner.clone()))
        }
        Value::Reactive(_) | Value::Ref(_) => return target,
        other => {
            dev_warn!("value cannot be made reactive: {}", other);
            return target;
        }
    };

    let slot = (kind, layer.as_ref().map(|inner| inner.kind));
    if let Some(inner) = cache::lookup(raw.id(), slot) {
        return Value::Reactive(Reactive { inner, raw });
    }

    // Only specific value types can be observed.
    let family = match &layer {
        None if raw.is_skipped() || raw.is_frozen() => return target,
        None => HandlerFamily::of(raw.kind()),
        Some(inner) => Some(inner.family),
    };
    let Some(family) = family else {
        return target;
    };

    let inner = cache::get_or_create(raw.id(), slot, || {
        Arc::new(ReactiveInner {
            id: ObjectId::new(),
            kind,
            family,
            layer,
        })
    });
    Value::Reactive(Reactive { inner, raw })
}

/// A deep mutable wrapper over `target`.
///
/// Primitives are returned unchanged (with a warning), as are refs,
/// objects marked raw, frozen objects and opaque values. Wrapping a
/// readonly wrapper returns it.
pub fn reactive(target: impl Into<Value>) -> Value {
    let target = target.into();
    // If trying to observe a readonly wrapper, return the readonly version.
    if matches!(&target, Value::Reactive(wrapper) if wrapper.is_readonly()) {
        return target;
    }
    create_reactive_object(target, WrapperKind::Reactive)
}

/// A deep readonly wrapper over `target`. Writes warn and do nothing.
pub fn readonly(target: impl Into<Value>) -> Value {
    create_reactive_object(target.into(), WrapperKind::Readonly)
}

/// A mutable wrapper that only tracks and triggers at the root level.
pub fn shallow_reactive(target: impl Into<Value>) -> Value {
    create_reactive_object(target.into(), WrapperKind::ShallowReactive)
}

/// A readonly wrapper that returns nested values as stored.
pub fn shallow_readonly(target: impl Into<Value>) -> Value {
    create_reactive_object(target.into(), WrapperKind::ShallowReadonly)
}

/// Whether `value` is a mutable wrapper, or a readonly wrapper layered over
/// one.
pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Reactive(wrapper) if wrapper.is_readonly() => match wrapper.target() {
            ProxyTarget::Wrapper(inner) => is_reactive(&Value::Reactive(inner)),
            ProxyTarget::Raw(_) => false,
        },
        Value::Reactive(_) => true,
        _ => false,
    }
}

/// Whether `value` is a readonly wrapper or a getter-only computed value.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Reactive(wrapper) => wrapper.is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

/// Whether `value` is a shallow wrapper or a shallow ref.
pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Reactive(wrapper) => wrapper.is_shallow(),
        Value::Ref(r) => r.is_shallow(),
        _ => false,
    }
}

/// Whether `value` is reactive or readonly.
pub fn is_proxy(value: &Value) -> bool {
    is_reactive(value) || is_readonly(value)
}

/// The raw object behind a wrapper, or `value` itself.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Reactive(wrapper) => Value::Object(wrapper.raw_object()),
        other => other.clone(),
    }
}

/// Mark an object so it is never wrapped. Returns the value.
pub fn mark_raw(value: impl Into<Value>) -> Value {
    let value = value.into();
    if let Value::Object(obj) = &value {
        obj.mark_skip();
    }
    value
}

/// [`reactive`] for composites, identity for everything else.
pub fn to_reactive(value: &Value) -> Value {
    if value.is_object() {
        reactive(value.clone())
    } else {
        value.clone()
    }
}

/// [`readonly`] for composites, identity for everything else.
pub fn to_readonly(value: &Value) -> Value {
    if value.is_object() {
        readonly(value.clone())
    } else {
        value.clone()
    }
}

fn to_shallow(value: &Value) -> Value {
    value.clone()
}

/// The wrapping applied to values read through a wrapper of `kind`.
pub(crate) fn wrap_for(kind: WrapperKind) -> fn(&Value) -> Value {
    match kind {
        WrapperKind::ShallowReactive | WrapperKind::ShallowReadonly => to_shallow,
        WrapperKind::Readonly => to_readonly,
        WrapperKind::Reactive => to_reactive,
    }
}
