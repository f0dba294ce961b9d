//! JSON interop for the value model.
//!
//! Serializing a value snapshots its raw data without tracking. Wrappers
//! serialize as their raw targets and boxed values as their contents.

use std::cell::RefCell;

use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};

use super::{Object, ObjectId, ObjectKind, PropKey, Value};
use crate::error::{ReactiveError, Result};
use crate::reactive::untracked;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Value {
    /// Convert to a JSON tree. Cyclic graphs are rejected.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        if contains_cycle(self, &mut Vec::new()) {
            return Err(ReactiveError::Cyclic);
        }
        Ok(serde_json::to_value(self)?)
    }

    /// Parse JSON text into a raw value graph.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(json.into())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::from(s),
            serde_json::Value::Array(items) => {
                Self::Object(Object::array(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Self::Object(Object::record_from(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let seen = RefCell::new(Vec::new());
        Snapshot {
            value: self,
            seen: &seen,
        }
        .serialize(serializer)
    }
}

/// A value being serialized, with the chain of composites above it.
struct Snapshot<'a> {
    value: &'a Value,
    seen: &'a RefCell<Vec<ObjectId>>,
}

impl Snapshot<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Snapshot<'b> {
        Snapshot {
            value,
            seen: self.seen,
        }
    }

    fn object<S: Serializer>(&self, obj: &Object, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.seen.borrow().contains(&obj.id()) {
            return Err(S::Error::custom("cannot serialize cyclic structure"));
        }
        self.seen.borrow_mut().push(obj.id());
        let result = self.object_body(obj, serializer);
        self.seen.borrow_mut().pop();
        result
    }

    fn object_body<S: Serializer>(&self, obj: &Object, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match obj.kind() {
            ObjectKind::Record => {
                let props: Vec<(PropKey, Value)> = obj
                    .own_keys()
                    .into_iter()
                    .filter(|key| !matches!(key, PropKey::Symbol(_)))
                    .map(|key| {
                        let value = obj.get(&key);
                        (key, value)
                    })
                    .collect();
                let mut map = serializer.serialize_map(Some(props.len()))?;
                for (key, value) in &props {
                    map.serialize_entry(&key.to_string(), &self.child(value))?;
                }
                map.end()
            }
            ObjectKind::Array => {
                let items = obj.array_items().unwrap_or_default();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            }
            ObjectKind::Map => {
                let entries = obj.entries().map_err(S::Error::custom)?;
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (key, value) in &entries {
                    seq.serialize_element(&(self.child(key), self.child(value)))?;
                }
                seq.end()
            }
            ObjectKind::Set => {
                let entries = obj.entries().map_err(S::Error::custom)?;
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (member, _) in &entries {
                    seq.serialize_element(&self.child(member))?;
                }
                seq.end()
            }
            ObjectKind::WeakMap | ObjectKind::WeakSet => serializer.serialize_map(Some(0))?.end(),
            ObjectKind::Opaque => serializer.serialize_str(obj.tag().as_deref().unwrap_or("")),
        }
    }
}

impl Serialize for Snapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.value {
            Value::Undefined | Value::Null | Value::Symbol(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(obj) => self.object(obj, serializer),
            Value::Reactive(wrapper) => self.object(&wrapper.raw_object(), serializer),
            Value::Ref(r) => {
                let inner = untracked(|| r.get());
                Snapshot {
                    value: &inner,
                    seen: self.seen,
                }
                .serialize(serializer)
            }
        }
    }
}

fn contains_cycle(value: &Value, path: &mut Vec<ObjectId>) -> bool {
    let obj = match value {
        Value::Object(obj) => obj.clone(),
        Value::Reactive(wrapper) => wrapper.raw_object(),
        Value::Ref(r) => return contains_cycle(&untracked(|| r.get()), path),
        _ => return false,
    };
    if path.contains(&obj.id()) {
        return true;
    }
    path.push(obj.id());
    let children: Vec<Value> = match obj.kind() {
        ObjectKind::Record => obj.own_keys().iter().map(|key| obj.get(key)).collect(),
        ObjectKind::Array => obj.array_items().unwrap_or_default(),
        ObjectKind::Map | ObjectKind::Set => obj
            .entries()
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(k, v)| [k, v])
            .collect(),
        _ => Vec::new(),
    };
    let cyclic = children.iter().any(|child| contains_cycle(child, path));
    path.pop();
    cyclic
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trips_through_raw_objects() {
        let value = Value::from(json!({"name": "weft", "tags": ["a", "b"], "n": 3}));
        let obj = value.as_object().unwrap();
        assert_eq!(obj.kind(), ObjectKind::Record);
        assert_eq!(value.to_json().unwrap(), json!({"name": "weft", "tags": ["a", "b"], "n": 3}));
    }

    #[test]
    fn cycles_are_rejected() {
        let obj = Object::record();
        obj.set(PropKey::from("me"), Value::from(&obj));
        assert!(matches!(Value::from(&obj).to_json(), Err(ReactiveError::Cyclic)));
        // Break the cycle so the object can be freed.
        obj.delete(&PropKey::from("me"));
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let shared = Object::array([1]);
        let parent = Object::record_from([("a", Value::from(&shared)), ("b", Value::from(&shared))]);
        assert_eq!(Value::from(parent).to_json().unwrap(), json!({"a": [1], "b": [1]}));
    }

    #[test]
    fn sets_serialize_as_sequences() {
        let set = Object::set_from([1, 2]);
        assert_eq!(Value::from(set).to_json().unwrap(), json!([1, 2]));
    }
}
