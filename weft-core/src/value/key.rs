//! Identities, symbols, and property keys.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Value;

/// Unique identity of a heap value (raw object, wrapper, or boxed value).
///
/// Ids are never reused, so an id observed once can never alias a
/// different live value later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// Ids below this bound are reserved for well-known symbols.
const WELL_KNOWN_LIMIT: u64 = 64;

/// A unique property key that is not a string.
///
/// Well-known symbols model the language's built-in symbols; reads keyed by
/// them are never tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    /// Create a fresh symbol with the given description.
    pub fn new(description: impl Into<Arc<str>>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(WELL_KNOWN_LIMIT);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            description: description.into(),
        }
    }

    fn well_known(id: u64, description: &str) -> Self {
        Self {
            id,
            description: Arc::from(description),
        }
    }

    /// `Symbol.iterator`.
    pub fn iterator() -> Self {
        Self::well_known(1, "Symbol.iterator")
    }

    /// `Symbol.asyncIterator`.
    pub fn async_iterator() -> Self {
        Self::well_known(2, "Symbol.asyncIterator")
    }

    /// `Symbol.hasInstance`.
    pub fn has_instance() -> Self {
        Self::well_known(3, "Symbol.hasInstance")
    }

    /// `Symbol.toPrimitive`.
    pub fn to_primitive() -> Self {
        Self::well_known(4, "Symbol.toPrimitive")
    }

    /// `Symbol.toStringTag`.
    pub fn to_string_tag() -> Self {
        Self::well_known(5, "Symbol.toStringTag")
    }

    /// `Symbol.unscopables`.
    pub fn unscopables() -> Self {
        Self::well_known(6, "Symbol.unscopables")
    }

    /// Whether this is one of the built-in symbols.
    pub fn is_well_known(&self) -> bool {
        self.id < WELL_KNOWN_LIMIT
    }

    /// The symbol's description.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

/// A property key of a record or array.
///
/// Canonical integer strings normalize to [`PropKey::Index`], so `"3"` and
/// `3` address the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// An array index or integer-like record key.
    Index(usize),
    /// A string key.
    Name(Arc<str>),
    /// A symbol key.
    Symbol(Symbol),
}

/// The array length property.
pub const LENGTH: &str = "length";

/// Largest integer key that addresses an array slot (`2^32 - 2`). Larger
/// integers are ordinary string keys.
pub const MAX_INDEX: usize = u32::MAX as usize - 1;

impl PropKey {
    /// Build a key from a string, normalizing integer-like strings.
    pub fn name(name: &str) -> Self {
        match parse_index(name) {
            Some(index) => Self::Index(index),
            None => Self::Name(Arc::from(name)),
        }
    }

    /// The `length` key.
    pub fn length() -> Self {
        Self::Name(Arc::from(LENGTH))
    }

    /// Whether this is the `length` key.
    pub fn is_length(&self) -> bool {
        matches!(self, Self::Name(name) if &**name == LENGTH)
    }

    /// Whether this key is an integer index.
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    /// The index, if this is an integer key.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            _ => None,
        }
    }

    /// Convert a value used as a property key.
    ///
    /// Composite values have no stable property-key form and yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Self::name(s)),
            Value::Number(n) => {
                if n.fract() == 0.0 && *n >= 0.0 && *n <= MAX_INDEX as f64 {
                    Some(Self::Index(*n as usize))
                } else {
                    Some(Self::name(&value.to_string()))
                }
            }
            Value::Symbol(sym) => Some(Self::Symbol(sym.clone())),
            Value::Undefined | Value::Null | Value::Bool(_) => Some(Self::name(&value.to_string())),
            Value::Object(_) | Value::Reactive(_) | Value::Ref(_) => None,
        }
    }

    /// The key as a value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Index(index) => Value::Str(Arc::from(index.to_string())),
            Self::Name(name) => Value::Str(name.clone()),
            Self::Symbol(sym) => Value::Symbol(sym.clone()),
        }
    }
}

/// Parse a canonical non-negative integer key (`"0"`, `"17"`, not `"01"`).
fn parse_index(key: &str) -> Option<usize> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || (bytes.len() > 1 && bytes[0] == b'0') {
        return None;
    }
    if !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    key.parse().ok().filter(|index| *index <= MAX_INDEX)
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
            Self::Symbol(sym) => write!(f, "{sym}"),
        }
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        Self::name(name)
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        Self::name(&name)
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        if index <= MAX_INDEX {
            Self::Index(index)
        } else {
            Self::Name(Arc::from(index.to_string()))
        }
    }
}

impl From<Symbol> for PropKey {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_strings_normalize_to_indices() {
        assert_eq!(PropKey::from("0"), PropKey::Index(0));
        assert_eq!(PropKey::from("42"), PropKey::Index(42));
        assert!(matches!(PropKey::from("01"), PropKey::Name(_)));
        assert!(matches!(PropKey::from("-1"), PropKey::Name(_)));
        assert!(matches!(PropKey::from("NaN"), PropKey::Name(_)));
        assert!(matches!(PropKey::from(""), PropKey::Name(_)));
    }

    #[test]
    fn numbers_become_keys() {
        assert_eq!(PropKey::from_value(&Value::Number(3.0)), Some(PropKey::Index(3)));
        assert_eq!(
            PropKey::from_value(&Value::Number(1.5)),
            Some(PropKey::Name(Arc::from("1.5")))
        );
        assert_eq!(
            PropKey::from_value(&Value::Number(-1.0)),
            Some(PropKey::Name(Arc::from("-1")))
        );
    }

    #[test]
    fn integers_past_the_index_range_are_names() {
        assert_eq!(
            PropKey::from_value(&Value::Number(MAX_INDEX as f64)),
            Some(PropKey::Index(MAX_INDEX))
        );
        assert_eq!(
            PropKey::from_value(&Value::Number(4294967295.0)),
            Some(PropKey::Name(Arc::from("4294967295")))
        );
        assert_eq!(
            PropKey::from_value(&Value::Number(1.8446744073709552e19)),
            Some(PropKey::Name(Arc::from("18446744073709552000")))
        );
        assert!(matches!(PropKey::from("4294967295"), PropKey::Name(_)));
        assert!(matches!(PropKey::from(usize::MAX), PropKey::Name(_)));
    }

    #[test]
    fn well_known_symbols_are_stable() {
        assert_eq!(Symbol::iterator(), Symbol::iterator());
        assert!(Symbol::iterator().is_well_known());

        let custom = Symbol::new("custom");
        assert!(!custom.is_well_known());
        assert_ne!(custom, Symbol::new("custom"));
    }

    #[test]
    fn length_key() {
        assert!(PropKey::length().is_length());
        assert!(PropKey::from("length").is_length());
        assert!(!PropKey::Index(0).is_length());
    }
}
