//! Weft Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine
//! over plain, dynamically shaped data. It implements:
//!
//! - Observable wrappers over records, arrays, maps and sets
//! - Effects that re-run when the state they read changes
//! - Boxed reactive values and lazily recomputed computed values
//! - Scopes for tearing down groups of effects at once
//!
//! The engine is UI-agnostic: a change produces a synchronous notification,
//! and the subscriber (or its scheduler) decides what to do with it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: The dynamic value model (records, arrays, keyed collections)
//! - `reactive`: Effects, dependency tracking, refs, computed values, scopes
//! - `proxy`: The observable wrapper factory and its handlers
//! - `error`: Errors for calls with no meaningful no-op
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{effect, reactive, computed, Object, Value};
//!
//! // Create observable state
//! let state = reactive(Object::record_from([("count", 0)]));
//! let state = state.into_reactive().unwrap();
//!
//! // Create a derived value
//! let s = state.clone();
//! let doubled = computed(move || s.get("count").as_f64().unwrap_or(0.0) * 2.0);
//!
//! // Create an effect
//! let (s, d) = (state.clone(), doubled.clone());
//! effect(move || {
//!     println!("Count: {}, Doubled: {}", s.get("count"), d.get());
//! });
//!
//! // Update the state
//! state.set("count", 5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod error;
pub mod proxy;
pub mod reactive;
pub mod value;

mod diagnostics;

pub use error::{ReactiveError, Result};
pub use proxy::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, Reactive, WrapperKind,
};
pub use reactive::{
    computed, custom_ref, effect, effect_scope, effect_with, get_current_scope, is_ref,
    on_scope_dispose, proxy_refs, shallow_ref, stop, to_ref, to_refs, trigger_ref, unref,
    writable_computed, Computed, EffectOptions, EffectRunner, EffectScope, ReactiveEffect, Ref,
};
pub use value::{Object, ObjectKind, PropKey, Symbol, Value};
