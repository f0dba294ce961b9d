//! Method handlers for map, set, weak map and weak set wrappers.
//!
//! Reads track both the key as given and its raw form, so a lookup with a
//! wrapper and a lookup with its raw object observe the same entry. Writes
//! always store raw keys and values. A readonly wrapper layered over a
//! mutable one delegates reads to it, which does the tracking.
//!
//! Iteration returns snapshots taken at call time.

use crate::diagnostics::dev_warn;
use crate::error::{ReactiveError, Result};
use crate::reactive::{track, trigger, unref, TrackKey, TrackOp, TriggerOp};
use crate::value::{has_changed, Object, ObjectKind, Value};

use super::{to_raw, wrap_for, ProxyTarget, Reactive};

/// Wrap a value read out of a collection.
fn wrap(wrapper: &Reactive, value: &Value) -> Value {
    let kind = wrapper.kind();
    if kind.is_shallow() {
        return value.clone();
    }
    wrap_for(kind)(&unref(value))
}

fn track_key(raw: &Object, key: &Value, raw_key: &Value) {
    if key != raw_key {
        track(raw, TrackOp::Get, TrackKey::entry(key));
    }
    track(raw, TrackOp::Get, TrackKey::entry(raw_key));
}

fn check_identity_keys(target: &Object, key: &Value) {
    let raw_key = to_raw(key);
    if &raw_key != key && target.has_entry(&raw_key) {
        let kind = target.kind();
        let as_keys = if kind == ObjectKind::Map { " as keys" } else { "" };
        dev_warn!(
            "Reactive {} contains both the raw and reactive versions of the same object{}, \
             which can lead to inconsistencies. Avoid differentiating between the raw and \
             reactive versions of an object and only use the reactive version if possible.",
            kind,
            as_keys
        );
    }
}

fn warn_readonly(op: &str, key: Option<&Value>) {
    match key {
        Some(key) => dev_warn!("{} operation on key \"{}\" failed: target is readonly.", op, key),
        None => dev_warn!("{} operation failed: target is readonly.", op),
    }
}

pub(super) fn get(wrapper: &Reactive, key: &Value) -> Value {
    let raw = wrapper.raw_object();
    let raw_key = to_raw(key);
    if !wrapper.is_readonly() {
        track_key(&raw, key, &raw_key);
    }
    let found = match &wrapper.target() {
        // Ensure that the nested wrapper can do tracking for itself.
        ProxyTarget::Wrapper(inner) => Some(inner.get(key.clone())),
        ProxyTarget::Raw(obj) => obj.get_entry(key).or_else(|| obj.get_entry(&raw_key)),
    };
    found.map_or(Value::Undefined, |value| wrap(wrapper, &value))
}

pub(super) fn has(wrapper: &Reactive, key: &Value) -> bool {
    let raw = wrapper.raw_object();
    let raw_key = to_raw(key);
    if !wrapper.is_readonly() {
        track_key(&raw, key, &raw_key);
    }
    match &wrapper.target() {
        ProxyTarget::Wrapper(inner) => inner.has(key.clone()),
        ProxyTarget::Raw(obj) => obj.has_entry(key) || (key != &raw_key && obj.has_entry(&raw_key)),
    }
}

/// `Map.set`. Returns `false` for sets and for keys a weak map rejects.
pub(super) fn set(wrapper: &Reactive, key: Value, value: Value) -> bool {
    if wrapper.is_readonly() {
        warn_readonly("Set", Some(&key));
        return true;
    }
    let target = wrapper.raw_object();
    if !target.kind().is_map_like() {
        return false;
    }
    let value = to_raw(&value);

    let mut key = key;
    let mut had_key = target.has_entry(&key);
    if !had_key {
        key = to_raw(&key);
        had_key = target.has_entry(&key);
    } else {
        check_identity_keys(&target, &key);
    }

    let old_value = target.get_entry(&key).unwrap_or_default();
    if target.set_entry(key.clone(), value.clone()).is_err() {
        return false;
    }
    if !had_key {
        trigger(&target, TriggerOp::Add, Some(TrackKey::entry(&key)), Some(&value), None);
    } else if has_changed(&value, &old_value) {
        trigger(
            &target,
            TriggerOp::Set,
            Some(TrackKey::entry(&key)),
            Some(&value),
            Some(&old_value),
        );
    }
    true
}

pub(super) fn delete(wrapper: &Reactive, key: &Value) -> bool {
    if wrapper.is_readonly() {
        warn_readonly("Delete", Some(key));
        return false;
    }
    let target = wrapper.raw_object();
    let mut key = key.clone();
    let mut had_key = target.has_entry(&key);
    if !had_key {
        key = to_raw(&key);
        had_key = target.has_entry(&key);
    } else {
        check_identity_keys(&target, &key);
    }

    let old_value = target.get_entry(&key);
    let result = target.delete_entry(&key);
    if had_key {
        trigger(
            &target,
            TriggerOp::Delete,
            Some(TrackKey::entry(&key)),
            None,
            old_value.as_ref(),
        );
    }
    result
}

impl Reactive {
    fn require_collection(&self) -> Result<Object> {
        let raw = self.raw_object();
        if raw.kind().is_collection() {
            Ok(raw)
        } else {
            Err(ReactiveError::NotACollection { found: raw.kind() })
        }
    }

    /// The raw collection, if it supports size, clear and iteration.
    fn require_iterable(&self, op: &'static str) -> Result<Object> {
        let raw = self.require_collection()?;
        if raw.kind().is_weak() {
            return Err(ReactiveError::Unsupported { op, kind: raw.kind() });
        }
        Ok(raw)
    }

    /// Add a member to a set or weak set.
    pub fn add(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let target = self.require_collection()?;
        if self.is_readonly() {
            warn_readonly("Add", Some(&value));
            return Ok(());
        }
        if target.kind().is_map_like() {
            return Err(ReactiveError::Unsupported {
                op: "add",
                kind: target.kind(),
            });
        }
        let value = to_raw(&value);
        if !target.has_entry(&value) {
            target.add_entry(value.clone())?;
            trigger(
                &target,
                TriggerOp::Add,
                Some(TrackKey::entry(&value)),
                Some(&value),
                None,
            );
        }
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        let target = self.require_iterable("clear")?;
        if self.is_readonly() {
            warn_readonly("Clear", None);
            return Ok(());
        }
        let had_items = target.size()? != 0;
        target.clear_entries()?;
        if had_items {
            trigger(&target, TriggerOp::Clear, None, None, None);
        }
        Ok(())
    }

    /// Number of entries. Tracks iteration.
    pub fn size(&self) -> Result<usize> {
        let raw = self.require_iterable("size")?;
        if !self.is_readonly() {
            track(&raw, TrackOp::Iterate, TrackKey::Iterate);
        }
        match &self.target() {
            ProxyTarget::Wrapper(inner) => inner.size(),
            ProxyTarget::Raw(obj) => obj.size(),
        }
    }

    /// `(key, value)` pairs (for sets, `(member, member)`) as the target
    /// yields them, before this wrapper's own wrapping is applied.
    fn snapshot(&self, key: TrackKey) -> Result<Vec<(Value, Value)>> {
        let raw = self.require_iterable("iterate")?;
        if !self.is_readonly() {
            track(&raw, TrackOp::Iterate, key.clone());
        }
        match &self.target() {
            ProxyTarget::Wrapper(inner) => Ok(inner
                .snapshot(key)?
                .into_iter()
                .map(|(k, v)| (wrap(inner, &k), wrap(inner, &v)))
                .collect()),
            ProxyTarget::Raw(obj) => obj.entries(),
        }
    }

    /// Call `f(value, key)` for every entry.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) -> Result<()> {
        for (key, value) in self.snapshot(TrackKey::Iterate)? {
            f(wrap(self, &value), wrap(self, &key));
        }
        Ok(())
    }

    /// Keys of a map, or members of a set.
    ///
    /// On a map this only observes the key set: overwriting a value does not
    /// notify it.
    pub fn keys(&self) -> Result<Vec<Value>> {
        let key = if self.target_kind() == ObjectKind::Map {
            TrackKey::MapKeyIterate
        } else {
            TrackKey::Iterate
        };
        Ok(self
            .snapshot(key)?
            .into_iter()
            .map(|(key, _)| wrap(self, &key))
            .collect())
    }

    /// Values of a map, or members of a set.
    pub fn values(&self) -> Result<Vec<Value>> {
        Ok(self
            .snapshot(TrackKey::Iterate)?
            .into_iter()
            .map(|(_, value)| wrap(self, &value))
            .collect())
    }

    /// `(key, value)` pairs of a map, or `(member, member)` pairs of a set.
    pub fn entries(&self) -> Result<Vec<(Value, Value)>> {
        Ok(self
            .snapshot(TrackKey::Iterate)?
            .into_iter()
            .map(|(key, value)| (wrap(self, &key), wrap(self, &value)))
            .collect())
    }
}
