//! Error types.
//!
//! Misuse that the engine can absorb (writing through a readonly wrapper,
//! wrapping a primitive, writing a getter-only computed) is reported as a
//! debug-build warning and otherwise treated as a no-op. The variants here
//! cover calls that have no meaningful no-op: asking a plain record for
//! array methods, iterating a weak collection, and so on.

use thiserror::Error;

use crate::value::ObjectKind;

/// Result alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors returned by wrapper and value operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReactiveError {
    /// An array method was called on a wrapper whose target is not an array.
    #[error("expected an array target, found {found}")]
    NotAnArray {
        /// Kind of the wrapped target.
        found: ObjectKind,
    },

    /// A keyed-collection method was called on a record or array wrapper.
    #[error("expected a map, set, weak map or weak set target, found {found}")]
    NotACollection {
        /// Kind of the wrapped target.
        found: ObjectKind,
    },

    /// The operation exists on collections, but not on this kind.
    #[error("{op} is not supported on {kind}")]
    Unsupported {
        /// Operation name.
        op: &'static str,
        /// Kind of the wrapped target.
        kind: ObjectKind,
    },

    /// Weak collections only accept objects as keys.
    #[error("invalid value used as weak collection key: {0}")]
    InvalidWeakKey(String),

    /// A value graph contains a cycle and cannot be serialized.
    #[error("cannot serialize cyclic structure")]
    Cyclic,

    /// JSON conversion failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
