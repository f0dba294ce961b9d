//! Dynamic Values
//!
//! The engine observes plain, dynamically shaped data: records, arrays,
//! maps and sets whose slots hold other values. [`Value`] is that slot type.
//!
//! # Equality
//!
//! Three comparisons are used throughout the engine:
//!
//! - `==` on [`Value`] is SameValueZero: NaN equals NaN, `+0` equals `-0`,
//!   and composites compare by identity. Map and set keys, and array
//!   `includes`, use it.
//! - [`strict_equals`] never matches NaN. Array `index_of` uses it.
//! - [`has_changed`] is the negation of SameValue: NaN is unchanged from NaN,
//!   but `+0` is changed from `-0`. Writes use it to decide whether to notify.

mod json;
mod key;
mod object;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub use key::{ObjectId, PropKey, Symbol, LENGTH, MAX_INDEX};
pub use object::{Object, ObjectKind, WeakObject, MAX_DENSE_LEN};

use crate::proxy::Reactive;
use crate::reactive::Ref;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number.
    Number(f64),
    /// An immutable string.
    Str(Arc<str>),
    /// A symbol.
    Symbol(Symbol),
    /// A raw composite value.
    Object(Object),
    /// An intercepting wrapper over a composite value.
    Reactive(Reactive),
    /// A boxed reactive value or memoized computation.
    Ref(Ref),
}

impl Value {
    /// Whether the value is a composite (object, wrapper, or boxed value).
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Reactive(_) | Self::Ref(_))
    }

    /// Whether the value is `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether the value is a boxed value.
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    /// Identity of a composite value.
    pub fn identity(&self) -> Option<ObjectId> {
        match self {
            Self::Object(obj) => Some(obj.id()),
            Self::Reactive(wrapper) => Some(wrapper.id()),
            Self::Ref(r) => Some(r.id()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Self::Reactive(wrapper) => Some(wrapper),
            _ => None,
        }
    }

    /// The boxed value, if this is one.
    pub fn as_ref_box(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Consume the value, returning the wrapper if it is one.
    pub fn into_reactive(self) -> Option<Reactive> {
        match self {
            Self::Reactive(wrapper) => Some(wrapper),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
            Self::Reactive(_) => "reactive",
            Self::Ref(_) => "ref",
        }
    }
}

/// SameValue (`Object.is`).
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x.to_bits() == y.to_bits()
            }
        }
        _ => a == b,
    }
}

/// Whether a write of `value` over `old` is an observable change.
pub fn has_changed(value: &Value, old: &Value) -> bool {
    !same_value(value, old)
}

/// Strict equality: like SameValueZero but NaN never matches.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => a == b,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Reactive(a), Self::Reactive(b)) => a.ptr_eq(b),
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => {
                // Keep the hash consistent with SameValueZero.
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Self::Str(s) => s.hash(state),
            Self::Symbol(sym) => sym.hash(state),
            Self::Object(_) | Self::Reactive(_) | Self::Ref(_) => self.identity().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => fmt_number(*n, f),
            Self::Str(s) => f.write_str(s),
            Self::Symbol(sym) => write!(f, "{sym}"),
            Self::Object(obj) => write!(f, "[object {}]", obj.kind()),
            Self::Reactive(wrapper) => write!(f, "[reactive {}]", wrapper.target_kind()),
            Self::Ref(_) => f.write_str("[object Ref]"),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let exp = format!("{n:e}");
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                write!(f, "{mantissa}e+{power}")
            }
            _ => f.write_str(&exp),
        }
    } else {
        // Shortest round-trip digits, never in exponent form.
        write!(f, "{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Object(obj) => write!(f, "{obj:?}"),
            Self::Reactive(wrapper) => write!(f, "{wrapper:?}"),
            Self::Ref(r) => write!(f, "{r:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Self::Object(obj)
    }
}

impl From<&Object> for Value {
    fn from(obj: &Object) -> Self {
        Self::Object(obj.clone())
    }
}

impl From<Reactive> for Value {
    fn from(wrapper: Reactive) -> Self {
        Self::Reactive(wrapper)
    }
}

impl From<&Reactive> for Value {
    fn from(wrapper: &Reactive) -> Self {
        Self::Reactive(wrapper.clone())
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}

impl From<&Ref> for Value {
    fn from(r: &Ref) -> Self {
        Self::Ref(r.clone())
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}
