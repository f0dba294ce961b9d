//! Reactive Primitives
//!
//! This module implements the core reactive system: effects, the track and
//! trigger protocol, boxed values, computed values, and scopes. The wrapper
//! layer in [`crate::proxy`] builds observable records, arrays and
//! collections on top of it.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An Effect is a computation whose reads are recorded. When any location it
//! read changes, the effect is re-run (or handed to its scheduler).
//!
//! ## Dependency Sets
//!
//! Every observable location (a property of a target, an entry of a
//! collection, the value of a ref) owns a [`Dep`]: the set of effects that
//! read it during their most recent run.
//!
//! ## Refs and Computed Values
//!
//! A [`Ref`] is a single observable cell. A [`Computed`] is a cached derived
//! value that recomputes lazily, only when read after a dependency changed.
//!
//! ## Scopes
//!
//! An [`EffectScope`] collects the effects created while it runs so they can
//! be stopped together.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When observable state is read, we check
//! whether an effect is running and, if so, subscribe it.
//!
//! This approach (sometimes called "transparent reactivity") is used by
//! SolidJS, Vue 3, and Leptos.

mod computed;
mod context;
mod dep;
mod effect;
mod operations;
mod refs;
mod runtime;
mod scope;
mod subscriber;

pub use computed::{computed, writable_computed, Computed};
pub use context::{
    active_effect, enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked,
    ReactiveContext, TrackingPause, MAX_MARKER_BITS,
};
pub use dep::Dep;
pub use effect::{
    effect, effect_with, stop, DebugHook, EffectFn, EffectOptions, EffectRunner, ReactiveEffect,
    Scheduler, StopHook,
};
pub use operations::{DebugOp, DebuggerEvent, TrackKey, TrackOp, TriggerOp};
pub use refs::{
    custom_ref, is_ref, proxy_refs, shallow_ref, to_ref, to_ref_with_default, to_refs, trigger_ref,
    unref, CustomRefHooks, ProxyRefs, Ref, RefSource,
};
pub use runtime::{track, track_effects, trigger, trigger_effects, Runtime};
pub use scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope};
pub use subscriber::SubscriberId;

pub(crate) use runtime::forget_target;
