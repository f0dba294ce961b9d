//! Raw composite values.
//!
//! An [`Object`] is a shared handle to plain data: a record, an array, a
//! keyed collection, or an opaque host value. Nothing here tracks or
//! triggers; the wrapper layer builds observability on top of these
//! operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use super::{ObjectId, PropKey, Value};
use crate::error::{ReactiveError, Result};
use crate::proxy::{self, ReactiveInner};
use crate::reactive::{self, RefSource};

/// The shape of a raw composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Record,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
    /// Anything outside the wrappable kinds (dates, regexes, host handles).
    Opaque,
}

impl ObjectKind {
    /// Whether this is one of the four keyed collections.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Map | Self::Set | Self::WeakMap | Self::WeakSet)
    }

    /// Whether this is a weak keyed collection.
    pub fn is_weak(self) -> bool {
        matches!(self, Self::WeakMap | Self::WeakSet)
    }

    /// Whether entries map keys to values (as opposed to set membership).
    pub fn is_map_like(self) -> bool {
        matches!(self, Self::Map | Self::WeakMap)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Record => "Object",
            Self::Array => "Array",
            Self::Map => "Map",
            Self::Set => "Set",
            Self::WeakMap => "WeakMap",
            Self::WeakSet => "WeakSet",
            Self::Opaque => "Opaque",
        };
        f.write_str(name)
    }
}

/// A key held by a weak collection. It never keeps its referent alive.
#[derive(Clone)]
pub(crate) enum WeakKey {
    Object(Weak<ObjectInner>),
    Reactive(Weak<ReactiveInner>),
    Ref(Weak<dyn RefSource>),
}

impl WeakKey {
    fn new(key: &Value) -> Result<Self> {
        match key {
            Value::Object(obj) => Ok(Self::Object(Arc::downgrade(&obj.0))),
            Value::Reactive(wrapper) => Ok(Self::Reactive(wrapper.downgrade())),
            Value::Ref(r) => Ok(Self::Ref(r.downgrade())),
            other => Err(ReactiveError::InvalidWeakKey(other.to_string())),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::Object(weak) => weak.strong_count() > 0,
            Self::Reactive(weak) => weak.strong_count() > 0,
            Self::Ref(weak) => weak.strong_count() > 0,
        }
    }
}

pub(crate) enum ObjectData {
    Record(IndexMap<PropKey, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
    WeakMap(IndexMap<ObjectId, (WeakKey, Value)>),
    WeakSet(IndexMap<ObjectId, WeakKey>),
    Opaque(Arc<str>),
}

impl ObjectData {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::Record(_) => ObjectKind::Record,
            Self::Array(_) => ObjectKind::Array,
            Self::Map(_) => ObjectKind::Map,
            Self::Set(_) => ObjectKind::Set,
            Self::WeakMap(_) => ObjectKind::WeakMap,
            Self::WeakSet(_) => ObjectKind::WeakSet,
            Self::Opaque(_) => ObjectKind::Opaque,
        }
    }
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    kind: ObjectKind,
    skip: AtomicBool,
    frozen: AtomicBool,
    data: RwLock<ObjectData>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        reactive::forget_target(self.id);
        proxy::evict_target(self.id);
    }
}

/// A shared handle to a raw composite value.
///
/// Cloning the handle shares the underlying data; identity is stable for the
/// life of the value.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

/// Weak counterpart of [`Object`]. Does not keep the object, its registry
/// entry or its wrappers alive.
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

impl Object {
    fn from_data(data: ObjectData) -> Self {
        Self(Arc::new(ObjectInner {
            id: ObjectId::new(),
            kind: data.kind(),
            skip: AtomicBool::new(false),
            frozen: AtomicBool::new(false),
            data: RwLock::new(data),
        }))
    }

    /// An empty record.
    pub fn record() -> Self {
        Self::from_data(ObjectData::Record(IndexMap::new()))
    }

    /// A record with the given properties, in order.
    pub fn record_from<K, V, I>(entries: I) -> Self
    where
        K: Into<PropKey>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_data(ObjectData::Record(map))
    }

    /// An array holding the given items.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::from_data(ObjectData::Array(items.into_iter().map(Into::into).collect()))
    }

    /// A map with the given entries, in order.
    pub fn map_from<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_data(ObjectData::Map(map))
    }

    /// A set holding the given members, in order.
    pub fn set_from<V, I>(members: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::from_data(ObjectData::Set(members.into_iter().map(Into::into).collect()))
    }

    pub fn weak_map() -> Self {
        Self::from_data(ObjectData::WeakMap(IndexMap::new()))
    }

    pub fn weak_set() -> Self {
        Self::from_data(ObjectData::WeakSet(IndexMap::new()))
    }

    /// A value of a type the engine never wraps, identified by `tag`.
    pub fn opaque(tag: impl Into<Arc<str>>) -> Self {
        Self::from_data(ObjectData::Opaque(tag.into()))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.kind
    }

    pub fn is_array(&self) -> bool {
        self.0.kind == ObjectKind::Array
    }

    /// The tag of an opaque value.
    pub fn tag(&self) -> Option<Arc<str>> {
        match &*self.0.data.read() {
            ObjectData::Opaque(tag) => Some(tag.clone()),
            _ => None,
        }
    }

    /// Whether two handles refer to the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }

    /// Prevent further property writes. Frozen values are never wrapped.
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn mark_skip(&self) {
        self.0.skip.store(true, Ordering::Release);
    }

    /// Whether the value was marked to never be wrapped.
    pub fn is_skipped(&self) -> bool {
        self.0.skip.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Properties (records and arrays)
    // ------------------------------------------------------------------

    /// Read a property. Missing properties read as `Undefined`.
    pub fn get(&self, key: &PropKey) -> Value {
        match &*self.0.data.read() {
            ObjectData::Record(map) => map.get(key).cloned().unwrap_or_default(),
            ObjectData::Array(items) => match key {
                PropKey::Index(index) => items.get(*index).cloned().unwrap_or_default(),
                key if key.is_length() => Value::from(items.len()),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// Whether the property is present. For arrays, every index below the
    /// length is present, and so is `length`.
    pub fn has_own(&self, key: &PropKey) -> bool {
        match &*self.0.data.read() {
            ObjectData::Record(map) => map.contains_key(key),
            ObjectData::Array(items) => match key {
                PropKey::Index(index) => *index < items.len(),
                key => key.is_length(),
            },
            _ => false,
        }
    }

    /// Write a property, returning whether the write was accepted.
    ///
    /// Writing an array index past the end fills the gap with `Undefined`.
    /// Writing `length` truncates or extends; it must be a non-negative
    /// integer. Arrays reject other named properties, and any write that
    /// would grow them past [`MAX_DENSE_LEN`] slots.
    pub fn set(&self, key: PropKey, value: Value) -> bool {
        if self.is_frozen() {
            return false;
        }
        let displaced = {
            let mut data = self.0.data.write();
            match &mut *data {
                ObjectData::Record(map) => map.insert(key, value).into_iter().collect(),
                ObjectData::Array(items) => match key {
                    PropKey::Index(index) => {
                        if index >= items.len() {
                            match index.checked_add(1) {
                                Some(len) if len <= MAX_DENSE_LEN => {
                                    items.resize(len, Value::Undefined)
                                }
                                _ => return false,
                            }
                        }
                        vec![std::mem::replace(&mut items[index], value)]
                    }
                    key if key.is_length() => match array_length(&value) {
                        Some(len) if len <= items.len() => items.split_off(len),
                        Some(len) if len > MAX_DENSE_LEN => return false,
                        Some(len) => {
                            items.resize(len, Value::Undefined);
                            Vec::new()
                        }
                        None => return false,
                    },
                    _ => return false,
                },
                _ => return false,
            }
        };
        drop(displaced);
        true
    }

    /// Remove a property, returning whether the delete was accepted.
    ///
    /// Deleting an array index leaves `Undefined` in its slot; `length`
    /// cannot be deleted.
    pub fn delete(&self, key: &PropKey) -> bool {
        if self.is_frozen() {
            return false;
        }
        let removed = {
            let mut data = self.0.data.write();
            match &mut *data {
                ObjectData::Record(map) => map.shift_remove(key),
                ObjectData::Array(items) => match key {
                    PropKey::Index(index) => items
                        .get_mut(*index)
                        .map(std::mem::take),
                    key if key.is_length() => return false,
                    _ => None,
                },
                _ => return false,
            }
        };
        drop(removed);
        true
    }

    /// Own property keys: integer keys ascending, then names in insertion
    /// order, then symbols. Arrays list their indices followed by `length`.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match &*self.0.data.read() {
            ObjectData::Record(map) => {
                let mut indices: Vec<usize> = map.keys().filter_map(PropKey::as_index).collect();
                indices.sort_unstable();
                let mut keys: Vec<PropKey> = indices.into_iter().map(PropKey::Index).collect();
                keys.extend(map.keys().filter(|k| matches!(k, PropKey::Name(_))).cloned());
                keys.extend(map.keys().filter(|k| matches!(k, PropKey::Symbol(_))).cloned());
                keys
            }
            ObjectData::Array(items) => {
                let mut keys: Vec<PropKey> = (0..items.len()).map(PropKey::Index).collect();
                keys.push(PropKey::length());
                keys
            }
            _ => Vec::new(),
        }
    }

    /// Array length, record key count, or collection size.
    pub fn len(&self) -> usize {
        match &*self.0.data.read() {
            ObjectData::Record(map) => map.len(),
            ObjectData::Array(items) => items.len(),
            ObjectData::Map(map) => map.len(),
            ObjectData::Set(set) => set.len(),
            ObjectData::WeakMap(map) => map.values().filter(|(k, _)| k.is_alive()).count(),
            ObjectData::WeakSet(set) => set.values().filter(|k| k.is_alive()).count(),
            ObjectData::Opaque(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of the array's items, or `None` if this is not an array.
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match &*self.0.data.read() {
            ObjectData::Array(items) => Some(items.clone()),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Keyed collections
    // ------------------------------------------------------------------

    /// Value stored under `key` in a map or weak map.
    pub fn get_entry(&self, key: &Value) -> Option<Value> {
        match &*self.0.data.read() {
            ObjectData::Map(map) => map.get(key).cloned(),
            ObjectData::WeakMap(map) => key
                .identity()
                .and_then(|id| map.get(&id))
                .map(|(_, value)| value.clone()),
            _ => None,
        }
    }

    /// Whether a collection holds `key`.
    pub fn has_entry(&self, key: &Value) -> bool {
        match &*self.0.data.read() {
            ObjectData::Map(map) => map.contains_key(key),
            ObjectData::Set(set) => set.contains(key),
            ObjectData::WeakMap(map) => key.identity().is_some_and(|id| map.contains_key(&id)),
            ObjectData::WeakSet(set) => key.identity().is_some_and(|id| set.contains_key(&id)),
            _ => false,
        }
    }

    /// Insert or overwrite an entry of a map or weak map.
    pub fn set_entry(&self, key: Value, value: Value) -> Result<()> {
        let displaced = {
            let mut data = self.0.data.write();
            match &mut *data {
                ObjectData::Map(map) => (map.insert(key, value), Vec::new()),
                ObjectData::WeakMap(map) => {
                    let weak = WeakKey::new(&key)?;
                    let id = key
                        .identity()
                        .ok_or_else(|| ReactiveError::InvalidWeakKey(key.to_string()))?;
                    let stale = prune_weak_map(map);
                    (map.insert(id, (weak, value)).map(|(_, v)| v), stale)
                }
                other => {
                    return Err(ReactiveError::Unsupported {
                        op: "set",
                        kind: other.kind(),
                    })
                }
            }
        };
        drop(displaced);
        Ok(())
    }

    /// Add a member to a set or weak set.
    pub fn add_entry(&self, member: Value) -> Result<()> {
        let mut data = self.0.data.write();
        match &mut *data {
            ObjectData::Set(set) => {
                set.insert(member);
            }
            ObjectData::WeakSet(set) => {
                let weak = WeakKey::new(&member)?;
                if let Some(id) = member.identity() {
                    set.retain(|_, k| k.is_alive());
                    set.insert(id, weak);
                }
            }
            other => {
                return Err(ReactiveError::Unsupported {
                    op: "add",
                    kind: other.kind(),
                })
            }
        }
        Ok(())
    }

    /// Remove an entry from a collection, returning whether it was present.
    pub fn delete_entry(&self, key: &Value) -> bool {
        let removed = {
            let mut data = self.0.data.write();
            match &mut *data {
                ObjectData::Map(map) => map.shift_remove_entry(key),
                ObjectData::Set(set) => set.shift_take(key).map(|member| (member, Value::Undefined)),
                ObjectData::WeakMap(map) => key
                    .identity()
                    .and_then(|id| map.shift_remove(&id))
                    .map(|(_, value)| (Value::Undefined, value)),
                ObjectData::WeakSet(set) => key
                    .identity()
                    .and_then(|id| set.shift_remove(&id))
                    .map(|_| (Value::Undefined, Value::Undefined)),
                _ => None,
            }
        };
        removed.is_some()
    }

    /// Remove every entry of a map or set. Returns the number removed.
    pub fn clear_entries(&self) -> Result<usize> {
        let removed = {
            let mut data = self.0.data.write();
            match &mut *data {
                ObjectData::Map(map) => {
                    let taken = std::mem::take(map);
                    (taken.len(), ClearedEntries::Map(taken))
                }
                ObjectData::Set(set) => {
                    let taken = std::mem::take(set);
                    (taken.len(), ClearedEntries::Set(taken))
                }
                other => {
                    return Err(ReactiveError::Unsupported {
                        op: "clear",
                        kind: other.kind(),
                    })
                }
            }
        };
        let (count, cleared) = removed;
        drop(cleared);
        Ok(count)
    }

    /// Number of entries of a map or set.
    pub fn size(&self) -> Result<usize> {
        match &*self.0.data.read() {
            ObjectData::Map(map) => Ok(map.len()),
            ObjectData::Set(set) => Ok(set.len()),
            other => Err(ReactiveError::Unsupported {
                op: "size",
                kind: other.kind(),
            }),
        }
    }

    /// Snapshot of a map's `(key, value)` pairs, or a set's `(member, member)`
    /// pairs, in insertion order.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>> {
        match &*self.0.data.read() {
            ObjectData::Map(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            ObjectData::Set(set) => Ok(set.iter().map(|v| (v.clone(), v.clone())).collect()),
            other => Err(ReactiveError::Unsupported {
                op: "iterate",
                kind: other.kind(),
            }),
        }
    }

    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&ObjectData) -> R) -> R {
        f(&self.0.data.read())
    }
}

enum ClearedEntries {
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

fn prune_weak_map(map: &mut IndexMap<ObjectId, (WeakKey, Value)>) -> Vec<Value> {
    let dead: Vec<ObjectId> = map
        .iter()
        .filter(|(_, (k, _))| !k.is_alive())
        .map(|(id, _)| *id)
        .collect();
    dead.into_iter()
        .filter_map(|id| map.shift_remove(&id).map(|(_, v)| v))
        .collect()
}

fn array_length(value: &Value) -> Option<usize> {
    let n = value.as_f64()?;
    (n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as usize)
}

/// Arrays are stored densely; this caps how far a single write may grow one.
pub const MAX_DENSE_LEN: usize = 1 << 24;

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_are_ordered() {
        let obj = Object::record_from([("b", 1), ("2", 2), ("a", 3), ("0", 4)]);
        obj.set(PropKey::from(crate::value::Symbol::new("s")), Value::from(5));
        let keys: Vec<String> = obj.own_keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, ["0", "2", "b", "a", "Symbol(s)"]);
    }

    #[test]
    fn array_index_write_extends() {
        let arr = Object::array([1, 2]);
        assert!(arr.set(PropKey::Index(4), Value::from(5)));
        assert_eq!(arr.len(), 5);
        assert!(arr.get(&PropKey::Index(3)).is_undefined());
        assert_eq!(arr.get(&PropKey::length()), Value::from(5));
    }

    #[test]
    fn array_length_write_truncates() {
        let arr = Object::array([1, 2, 3]);
        assert!(arr.set(PropKey::length(), Value::from(1)));
        assert_eq!(arr.array_items(), Some(vec![Value::from(1)]));
        assert!(!arr.set(PropKey::length(), Value::from(-1)));
        assert!(!arr.set(PropKey::from("name"), Value::from(1)));
    }

    #[test]
    fn array_growth_is_bounded() {
        let arr = Object::array([1]);
        assert!(!arr.set(PropKey::Index(usize::MAX), Value::from(1)));
        assert!(!arr.set(PropKey::Index(MAX_DENSE_LEN), Value::from(1)));
        assert!(!arr.set(PropKey::length(), Value::from(u32::MAX)));
        assert!(!arr.set(PropKey::length(), Value::from(MAX_DENSE_LEN + 1)));
        assert_eq!(arr.len(), 1);

        // Huge numeric keys are names, which arrays reject.
        let key = PropKey::from_value(&Value::Number(1e10)).unwrap();
        assert!(!key.is_index());
        assert!(!arr.set(key, Value::from(1)));

        assert!(arr.set(PropKey::Index(MAX_DENSE_LEN - 1), Value::from(2)));
        assert_eq!(arr.len(), MAX_DENSE_LEN);
    }

    #[test]
    fn array_delete_leaves_undefined() {
        let arr = Object::array([1, 2]);
        assert!(arr.delete(&PropKey::Index(0)));
        assert_eq!(arr.len(), 2);
        assert!(arr.get(&PropKey::Index(0)).is_undefined());
        assert!(!arr.delete(&PropKey::length()));
    }

    #[test]
    fn frozen_rejects_writes() {
        let obj = Object::record_from([("a", 1)]);
        obj.freeze();
        assert!(!obj.set(PropKey::from("a"), Value::from(2)));
        assert!(!obj.delete(&PropKey::from("a")));
        assert_eq!(obj.get(&PropKey::from("a")), Value::from(1));
    }

    #[test]
    fn weak_map_holds_keys_weakly() {
        let map = Object::weak_map();
        let key = Object::record();
        map.set_entry(Value::from(&key), Value::from(1)).unwrap();
        assert_eq!(map.get_entry(&Value::from(&key)), Some(Value::from(1)));
        assert_eq!(map.len(), 1);

        drop(key);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn weak_collections_reject_primitive_keys() {
        let set = Object::weak_set();
        assert!(matches!(
            set.add_entry(Value::from(1)),
            Err(ReactiveError::InvalidWeakKey(_))
        ));
        assert!(matches!(set.size(), Err(ReactiveError::Unsupported { .. })));
    }

    #[test]
    fn set_entries_pair_members() {
        let set = Object::set_from(["a", "b"]);
        let entries = set.entries().unwrap();
        assert_eq!(entries[1], (Value::from("b"), Value::from("b")));
    }
}
