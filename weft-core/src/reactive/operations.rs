//! Operation kinds and registry keys used by track and trigger.

use std::fmt;

use crate::value::{ObjectId, PropKey, Value};

use super::effect::ReactiveEffect;

/// Kind of read being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

impl fmt::Display for TriggerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "Set",
            Self::Add => "Add",
            Self::Delete => "Delete",
            Self::Clear => "Clear",
        };
        f.write_str(name)
    }
}

/// An observable location within a target, as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// A record or array property. Array length is `Prop(length)`.
    Prop(PropKey),
    /// A primitive keyed-collection entry.
    Entry(Value),
    /// A composite keyed-collection entry, held by identity only.
    Object(ObjectId),
    /// Structural key for anything that enumerates the target.
    Iterate,
    /// Structural key for enumerating a map's keys.
    MapKeyIterate,
}

impl TrackKey {
    /// The registry key for a keyed-collection entry.
    pub fn entry(key: &Value) -> Self {
        match key.identity() {
            Some(id) => Self::Object(id),
            None => Self::Entry(key.clone()),
        }
    }

    /// The key for the array `length` property.
    pub fn length() -> Self {
        Self::Prop(PropKey::length())
    }

    /// The key boxed values track under.
    pub(crate) fn value() -> Self {
        Self::Prop(PropKey::Name("value".into()))
    }

    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            Self::Prop(key) => key.as_index(),
            _ => None,
        }
    }

    pub(crate) fn is_length(&self) -> bool {
        matches!(self, Self::Prop(key) if key.is_length())
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prop(key) => write!(f, "{key}"),
            Self::Entry(value) => write!(f, "{value:?}"),
            Self::Object(id) => write!(f, "{id}"),
            Self::Iterate => f.write_str("<iterate>"),
            Self::MapKeyIterate => f.write_str("<map key iterate>"),
        }
    }
}

impl From<PropKey> for TrackKey {
    fn from(key: PropKey) -> Self {
        Self::Prop(key)
    }
}

/// Which side of the protocol produced a debugger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOp {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Details passed to `on_track` and `on_trigger` hooks in debug builds.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    pub effect: ReactiveEffect,
    pub target: ObjectId,
    pub op: DebugOp,
    pub key: Option<TrackKey>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

/// A debugger event before it is attributed to an effect.
#[derive(Debug, Clone)]
pub(crate) struct EventInfo {
    pub(crate) target: ObjectId,
    pub(crate) op: DebugOp,
    pub(crate) key: Option<TrackKey>,
    pub(crate) new_value: Option<Value>,
    pub(crate) old_value: Option<Value>,
}

impl EventInfo {
    pub(crate) fn track(target: ObjectId, op: TrackOp, key: TrackKey) -> Self {
        Self {
            target,
            op: DebugOp::Track(op),
            key: Some(key),
            new_value: None,
            old_value: None,
        }
    }

    pub(crate) fn for_effect(&self, effect: &ReactiveEffect) -> DebuggerEvent {
        DebuggerEvent {
            effect: effect.clone(),
            target: self.target,
            op: self.op,
            key: self.key.clone(),
            new_value: self.new_value.clone(),
            old_value: self.old_value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn entry_keys_use_identity_for_composites() {
        let obj = Object::record();
        assert_eq!(TrackKey::entry(&Value::from(&obj)), TrackKey::Object(obj.id()));
        assert_eq!(TrackKey::entry(&Value::from(1)), TrackKey::Entry(Value::from(1)));
    }

    #[test]
    fn length_key_is_a_property() {
        assert!(TrackKey::length().is_length());
        assert_eq!(TrackKey::Prop(PropKey::Index(2)).as_index(), Some(2));
        assert_eq!(TrackKey::Iterate.as_index(), None);
    }
}
