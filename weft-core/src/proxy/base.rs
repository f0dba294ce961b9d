//! Property handlers for record and array wrappers.

use crate::diagnostics::dev_warn;
use crate::reactive::{track, trigger, TrackKey, TrackOp, TriggerOp};
use crate::value::{has_changed, ObjectKind, PropKey, Value};

use super::{is_readonly, is_shallow, to_raw, wrap_for, Reactive};

/// Keys whose reads are never tracked.
fn is_non_trackable(key: &PropKey) -> bool {
    match key {
        PropKey::Symbol(sym) => sym.is_well_known(),
        PropKey::Name(name) => &**name == "__proto__",
        PropKey::Index(_) => false,
    }
}

pub(super) fn get(wrapper: &Reactive, key: &PropKey) -> Value {
    let kind = wrapper.kind();
    let res = wrapper.target().get(key);
    if is_non_trackable(key) {
        return res;
    }

    if !kind.is_readonly() {
        track(&wrapper.raw_object(), TrackOp::Get, TrackKey::Prop(key.clone()));
    }
    if kind.is_shallow() {
        return res;
    }

    if let Value::Ref(r) = &res {
        // ref unwrapping - skip unwrap for Array + integer key.
        if wrapper.target_kind() == ObjectKind::Array && key.is_index() {
            return res;
        }
        return r.get();
    }
    if res.is_object() {
        // Converting here instead of when the value was stored keeps
        // wrapping lazy.
        return wrap_for(kind)(&res);
    }
    res
}

pub(super) fn set(wrapper: &Reactive, key: PropKey, value: Value) -> bool {
    if wrapper.is_readonly() {
        dev_warn!("Set operation on key \"{}\" failed: target is readonly.", key);
        return true;
    }
    let target = wrapper.raw_object();
    let mut old_value = target.get(&key);
    if matches!(&old_value, Value::Ref(r) if r.is_readonly()) && !value.is_ref() {
        return false;
    }

    let mut value = value;
    if !wrapper.is_shallow() && !is_readonly(&value) {
        if !is_shallow(&value) {
            value = to_raw(&value);
            old_value = to_raw(&old_value);
        }
        if !target.is_array() {
            if let Value::Ref(old_ref) = &old_value {
                if !value.is_ref() {
                    old_ref.set(value);
                    return true;
                }
            }
        }
    }

    let had_key = target.has_own(&key);
    if !target.set(key.clone(), value.clone()) {
        return false;
    }
    if !had_key {
        trigger(&target, TriggerOp::Add, Some(TrackKey::Prop(key)), Some(&value), None);
    } else if has_changed(&value, &old_value) {
        trigger(
            &target,
            TriggerOp::Set,
            Some(TrackKey::Prop(key)),
            Some(&value),
            Some(&old_value),
        );
    }
    true
}

pub(super) fn delete(wrapper: &Reactive, key: &PropKey) -> bool {
    if wrapper.is_readonly() {
        dev_warn!("Delete operation on key \"{}\" failed: target is readonly.", key);
        return true;
    }
    let target = wrapper.raw_object();
    let had_key = target.has_own(key);
    let old_value = target.get(key);
    let result = target.delete(key);
    if result && had_key {
        trigger(
            &target,
            TriggerOp::Delete,
            Some(TrackKey::Prop(key.clone())),
            None,
            Some(&old_value),
        );
    }
    result
}

pub(super) fn has(wrapper: &Reactive, key: &PropKey) -> bool {
    let result = wrapper.target().has(key);
    if !wrapper.is_readonly() && !is_non_trackable_symbol(key) {
        track(&wrapper.raw_object(), TrackOp::Has, TrackKey::Prop(key.clone()));
    }
    result
}

fn is_non_trackable_symbol(key: &PropKey) -> bool {
    matches!(key, PropKey::Symbol(sym) if sym.is_well_known())
}

pub(super) fn own_keys(wrapper: &Reactive) -> Vec<PropKey> {
    if !wrapper.is_readonly() {
        let target = wrapper.raw_object();
        let key = if target.is_array() {
            TrackKey::length()
        } else {
            TrackKey::Iterate
        };
        track(&target, TrackOp::Iterate, key);
    }
    wrapper.target().own_keys()
}
