//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when wrapped state or a boxed value
//! is read, the current effect is registered as a subscriber.
//!
//! # Implementation
//!
//! A thread-local stack holds the running effects; the top is the current
//! reader. Alongside it live the nesting depth, the per-depth marker bit,
//! the "should track" toggle with its own save stack, and the stack of
//! active effect scopes.
//!
//! Entering an effect run returns a [`ReactiveContext`] guard. Dropping the
//! guard finalizes dependency markers and restores the previous state, so
//! the stack stays balanced even if the effect panics.
//!
//! No borrow of the thread-local state is held while user code runs.

use std::cell::RefCell;

use tracing::trace;

use super::effect::ReactiveEffect;
use super::scope::EffectScope;

/// Nesting levels that get their own marker bit. Deeper runs fall back to
/// clearing and rebuilding every subscription.
pub const MAX_MARKER_BITS: u32 = 30;

struct TrackingState {
    stack: Vec<ReactiveEffect>,
    depth: u32,
    bit: u32,
    should_track: bool,
    track_stack: Vec<bool>,
    scopes: Vec<EffectScope>,
}

thread_local! {
    static STATE: RefCell<TrackingState> = const {
        RefCell::new(TrackingState {
            stack: Vec::new(),
            depth: 0,
            bit: 1,
            should_track: true,
            track_stack: Vec::new(),
            scopes: Vec::new(),
        })
    };
}

fn bit_for(depth: u32) -> u32 {
    1u32.checked_shl(depth).unwrap_or(0)
}

/// The current reader together with its marker bit, when tracking is on.
pub(crate) struct TrackingFrame {
    pub(crate) effect: ReactiveEffect,
    pub(crate) depth: u32,
    pub(crate) bit: u32,
}

/// Guard for one effect run. Pops the effect when dropped.
pub struct ReactiveContext {
    effect: ReactiveEffect,
}

impl ReactiveContext {
    /// Enter a run of `effect`.
    ///
    /// Returns `None` if the effect is already on the reader stack; the
    /// re-entrant run is skipped.
    pub fn enter(effect: &ReactiveEffect) -> Option<Self> {
        let entered = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.stack.iter().any(|e| e.ptr_eq(effect)) {
                return None;
            }
            state.stack.push(effect.clone());
            let current = state.should_track;
            state.track_stack.push(current);
            state.should_track = true;
            state.depth += 1;
            state.bit = bit_for(state.depth);
            Some((state.depth, state.bit))
        });

        let (depth, bit) = entered?;
        trace!(effect = %effect.id(), depth, "entering effect");
        if depth <= MAX_MARKER_BITS {
            effect.init_dep_markers(bit);
        } else {
            effect.cleanup();
        }
        Some(Self {
            effect: effect.clone(),
        })
    }

    /// Whether a reader is running and tracking is enabled.
    pub fn is_tracking() -> bool {
        STATE.with(|state| {
            let state = state.borrow();
            state.should_track && !state.stack.is_empty()
        })
    }

    /// The innermost running effect, if any.
    pub fn active_effect() -> Option<ReactiveEffect> {
        STATE.with(|state| state.borrow().stack.last().cloned())
    }

    /// Current nesting depth of effect runs.
    pub fn depth() -> u32 {
        STATE.with(|state| state.borrow().depth)
    }

    pub(crate) fn tracking_frame() -> Option<TrackingFrame> {
        STATE.with(|state| {
            let state = state.borrow();
            if !state.should_track {
                return None;
            }
            state.stack.last().map(|effect| TrackingFrame {
                effect: effect.clone(),
                depth: state.depth,
                bit: state.bit,
            })
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let (depth, bit) = STATE.with(|state| {
            let state = state.borrow();
            (state.depth, state.bit)
        });
        if depth <= MAX_MARKER_BITS {
            self.effect.finalize_dep_markers(bit);
        }

        let popped = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.depth = state.depth.saturating_sub(1);
            state.bit = bit_for(state.depth);
            state.should_track = state.track_stack.pop().unwrap_or(true);
            state.stack.pop()
        });

        // Verify we're popping the right context.
        if let Some(entry) = &popped {
            debug_assert!(
                entry.ptr_eq(&self.effect),
                "ReactiveContext mismatch: expected {}, got {}",
                self.effect.id(),
                entry.id()
            );
        }
        drop(popped);
    }
}

/// Save the tracking toggle and turn tracking off.
pub fn pause_tracking() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        let current = state.should_track;
        state.track_stack.push(current);
        state.should_track = false;
    });
}

/// Save the tracking toggle and turn tracking on.
pub fn enable_tracking() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        let current = state.should_track;
        state.track_stack.push(current);
        state.should_track = true;
    });
}

/// Restore the most recently saved toggle (on, if nothing was saved).
pub fn reset_tracking() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.should_track = state.track_stack.pop().unwrap_or(true);
    });
}

/// Whether reads are currently being recorded.
pub fn is_tracking() -> bool {
    ReactiveContext::is_tracking()
}

/// The innermost running effect, if any.
pub fn active_effect() -> Option<ReactiveEffect> {
    ReactiveContext::active_effect()
}

/// Pauses tracking until dropped.
pub struct TrackingPause(());

impl TrackingPause {
    pub fn new() -> Self {
        pause_tracking();
        Self(())
    }
}

impl Default for TrackingPause {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Run `f` without recording any reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = TrackingPause::new();
    f()
}

pub(crate) fn push_scope(scope: EffectScope) {
    STATE.with(|state| state.borrow_mut().scopes.push(scope));
}

pub(crate) fn pop_scope() {
    let popped = STATE.with(|state| state.borrow_mut().scopes.pop());
    drop(popped);
}

pub(crate) fn current_scope() -> Option<EffectScope> {
    STATE.with(|state| state.borrow().scopes.last().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn noop_effect() -> ReactiveEffect {
        ReactiveEffect::new(|| Value::Undefined, None, None)
    }

    #[test]
    fn context_tracks_effect() {
        let effect = noop_effect();

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::active_effect().is_none());

        {
            let _ctx = ReactiveContext::enter(&effect).unwrap();

            assert!(ReactiveContext::is_tracking());
            assert!(ReactiveContext::active_effect().unwrap().ptr_eq(&effect));
            assert_eq!(ReactiveContext::depth(), 1);
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::active_effect().is_none());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = noop_effect();
        let inner = noop_effect();

        {
            let _ctx1 = ReactiveContext::enter(&outer).unwrap();
            assert!(active_effect().unwrap().ptr_eq(&outer));

            {
                let _ctx2 = ReactiveContext::enter(&inner).unwrap();
                assert!(active_effect().unwrap().ptr_eq(&inner));
                assert_eq!(ReactiveContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert!(active_effect().unwrap().ptr_eq(&outer));
        }

        assert!(active_effect().is_none());
    }

    #[test]
    fn reentering_a_running_effect_is_refused() {
        let effect = noop_effect();
        let _ctx = ReactiveContext::enter(&effect).unwrap();
        assert!(ReactiveContext::enter(&effect).is_none());
        assert_eq!(ReactiveContext::depth(), 1);
    }

    #[test]
    fn pause_and_reset_nest() {
        let effect = noop_effect();
        let _ctx = ReactiveContext::enter(&effect).unwrap();

        pause_tracking();
        assert!(!is_tracking());
        enable_tracking();
        assert!(is_tracking());
        reset_tracking();
        assert!(!is_tracking());
        reset_tracking();
        assert!(is_tracking());
    }

    #[test]
    fn untracked_restores_tracking() {
        let effect = noop_effect();
        let _ctx = ReactiveContext::enter(&effect).unwrap();

        let inside = untracked(is_tracking);
        assert!(!inside);
        assert!(is_tracking());
    }

    #[test]
    fn reset_without_save_turns_tracking_on() {
        pause_tracking();
        reset_tracking();
        reset_tracking();
        let effect = noop_effect();
        let _ctx = ReactiveContext::enter(&effect).unwrap();
        assert!(is_tracking());
    }

    #[test]
    fn marker_bits_saturate() {
        assert_eq!(bit_for(1), 2);
        assert_eq!(bit_for(30), 1 << 30);
        assert_eq!(bit_for(40), 0);
    }
}
