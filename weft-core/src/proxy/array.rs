//! Array methods on wrappers.
//!
//! The search methods on a mutable wrapper track every index plus `length`
//! and search the raw items, retrying with the raw form of the argument so
//! that searching for a wrapper finds its raw object.
//!
//! The length-altering methods run the native algorithms through the
//! wrapper's own traps with tracking paused. They notify exactly what the
//! individual writes notify, and never subscribe the running effect to
//! `length`, which would make an effect that pushes re-trigger itself.

use crate::error::{ReactiveError, Result};
use crate::reactive::{track, TrackKey, TrackOp, TrackingPause};
use crate::value::{strict_equals, ObjectKind, PropKey, Value, LENGTH};

use super::{to_raw, Reactive};

#[derive(Clone, Copy)]
enum Search {
    Includes,
    IndexOf,
    LastIndexOf,
}

impl Search {
    fn matches(self, item: &Value, needle: &Value) -> bool {
        match self {
            // SameValueZero
            Self::Includes => item == needle,
            Self::IndexOf | Self::LastIndexOf => strict_equals(item, needle),
        }
    }

    fn find(self, items: &[Value], needle: &Value) -> Option<usize> {
        match self {
            Self::LastIndexOf => items.iter().rposition(|item| self.matches(item, needle)),
            _ => items.iter().position(|item| self.matches(item, needle)),
        }
    }
}

impl Reactive {
    fn require_array(&self) -> Result<()> {
        match self.target_kind() {
            ObjectKind::Array => Ok(()),
            found => Err(ReactiveError::NotAnArray { found }),
        }
    }

    fn length(&self) -> usize {
        self.get(LENGTH).as_f64().map_or(0, |n| n as usize)
    }

    fn search(&self, mode: Search, needle: Value) -> Result<Option<usize>> {
        self.require_array()?;
        if self.is_readonly() {
            // Plain algorithm over the traps: reads come back wrapped.
            let len = self.length();
            let items: Vec<Value> = (0..len).map(|i| self.get(i)).collect();
            return Ok(mode.find(&items, &needle));
        }

        let arr = self.raw_object();
        let len = self.length();
        for i in 0..len {
            track(&arr, TrackOp::Get, TrackKey::Prop(PropKey::Index(i)));
        }
        let items = arr.array_items().unwrap_or_default();
        // Run with the original arguments first (which may be wrappers);
        // retry with raw values if that fails.
        Ok(mode
            .find(&items, &needle)
            .or_else(|| mode.find(&items, &to_raw(&needle))))
    }

    /// Whether the array contains `value` (SameValueZero).
    pub fn includes(&self, value: impl Into<Value>) -> Result<bool> {
        Ok(self.search(Search::Includes, value.into())?.is_some())
    }

    /// First index holding `value` (strict equality).
    pub fn index_of(&self, value: impl Into<Value>) -> Result<Option<usize>> {
        self.search(Search::IndexOf, value.into())
    }

    /// Last index holding `value` (strict equality).
    pub fn last_index_of(&self, value: impl Into<Value>) -> Result<Option<usize>> {
        self.search(Search::LastIndexOf, value.into())
    }

    /// Move `from` to `to`, or clear `to` when `from` is absent.
    fn move_item(&self, from: usize, to: usize) {
        if self.has(from) {
            let item = self.get(from);
            self.set(to, item);
        } else {
            self.delete(to);
        }
    }

    /// Append items, returning the new length.
    pub fn push<V, I>(&self, items: I) -> Result<usize>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.require_array()?;
        let _pause = TrackingPause::new();
        let mut len = self.length();
        for item in items {
            self.set(len, item);
            len += 1;
        }
        self.set(LENGTH, len);
        Ok(len)
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Result<Value> {
        self.require_array()?;
        let _pause = TrackingPause::new();
        let len = self.length();
        if len == 0 {
            self.set(LENGTH, 0);
            return Ok(Value::Undefined);
        }
        let index = len - 1;
        let item = self.get(index);
        self.delete(index);
        self.set(LENGTH, index);
        Ok(item)
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Result<Value> {
        self.require_array()?;
        let _pause = TrackingPause::new();
        let len = self.length();
        if len == 0 {
            self.set(LENGTH, 0);
            return Ok(Value::Undefined);
        }
        let first = self.get(0);
        for k in 1..len {
            self.move_item(k, k - 1);
        }
        self.delete(len - 1);
        self.set(LENGTH, len - 1);
        Ok(first)
    }

    /// Prepend items, returning the new length.
    pub fn unshift<V, I>(&self, items: I) -> Result<usize>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.require_array()?;
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let _pause = TrackingPause::new();
        let len = self.length();
        let count = items.len();
        if count > 0 {
            for k in (1..=len).rev() {
                self.move_item(k - 1, k + count - 1);
            }
            for (j, item) in items.into_iter().enumerate() {
                self.set(j, item);
            }
        }
        self.set(LENGTH, len + count);
        Ok(len + count)
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    /// Returns the removed items.
    ///
    /// A negative `start` counts from the end. With no `delete_count` and no
    /// items, everything from `start` on is removed.
    pub fn splice<V, I>(&self, start: isize, delete_count: Option<usize>, items: I) -> Result<Vec<Value>>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.require_array()?;
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let _pause = TrackingPause::new();
        let len = self.length();

        let actual_start = if start < 0 {
            len.saturating_sub(start.unsigned_abs())
        } else {
            (start as usize).min(len)
        };
        let remaining = len - actual_start;
        let delete_count = match delete_count {
            None if items.is_empty() => remaining,
            None => 0,
            Some(count) => count.min(remaining),
        };

        let removed: Vec<Value> = (0..delete_count)
            .filter(|k| self.has(actual_start + k))
            .map(|k| self.get(actual_start + k))
            .collect();

        let item_count = items.len();
        if item_count < delete_count {
            for k in actual_start..len - delete_count {
                self.move_item(k + delete_count, k + item_count);
            }
            for k in (len - delete_count + item_count..len).rev() {
                self.delete(k);
            }
        } else if item_count > delete_count {
            for k in (actual_start..len - delete_count).rev() {
                self.move_item(k + delete_count, k + item_count);
            }
        }
        for (j, item) in items.into_iter().enumerate() {
            self.set(actual_start + j, item);
        }
        self.set(LENGTH, len - delete_count + item_count);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ReactiveError;
    use crate::proxy::{reactive, readonly};
    use crate::reactive::{effect, Runtime, TrackKey};
    use crate::value::{Object, Value};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn items(list: &crate::proxy::Reactive) -> Vec<Value> {
        list.raw_object().array_items().unwrap()
    }

    #[test]
    fn includes_finds_raw_and_wrapped_items() {
        let obj = Object::record();
        let list = reactive(Object::array([Value::from(&obj)])).into_reactive().unwrap();

        assert!(list.includes(&obj).unwrap());
        // The wrapper is not stored, but its raw object is.
        assert!(list.includes(reactive(&obj)).unwrap());
        assert_eq!(list.index_of(reactive(&obj)).unwrap(), Some(0));
    }

    #[test]
    fn nan_search_semantics() {
        let list = reactive(Object::array([f64::NAN])).into_reactive().unwrap();
        assert!(list.includes(f64::NAN).unwrap());
        assert_eq!(list.index_of(f64::NAN).unwrap(), None);
    }

    #[test]
    fn last_index_of_searches_backwards() {
        let list = reactive(Object::array([1, 2, 1])).into_reactive().unwrap();
        assert_eq!(list.last_index_of(1).unwrap(), Some(2));
        assert_eq!(list.last_index_of(3).unwrap(), None);
    }

    #[test]
    fn search_tracks_every_index() {
        let raw = Object::array([1, 2]);
        let list = reactive(&raw).into_reactive().unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let (runs_clone, l) = (runs.clone(), list.clone());
        let _runner = effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            l.includes(3).unwrap_or(false)
        });

        assert!(Runtime::dep(&raw, &TrackKey::Prop(1usize.into())).is_some());
        list.set(1, 3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn push_and_pop() {
        let list = reactive(Object::array([1])).into_reactive().unwrap();
        assert_eq!(list.push([2, 3]).unwrap(), 3);
        assert_eq!(items(&list), [Value::from(1), Value::from(2), Value::from(3)]);

        assert_eq!(list.pop().unwrap(), Value::from(3));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn shift_and_unshift() {
        let list = reactive(Object::array([1, 2, 3])).into_reactive().unwrap();
        assert_eq!(list.shift().unwrap(), Value::from(1));
        assert_eq!(items(&list), [Value::from(2), Value::from(3)]);

        assert_eq!(list.unshift([0, 1]).unwrap(), 4);
        assert_eq!(
            items(&list),
            [Value::from(0), Value::from(1), Value::from(2), Value::from(3)]
        );
    }

    #[test]
    fn splice_removes_and_inserts() {
        let list = reactive(Object::array([1, 2, 3, 4, 5])).into_reactive().unwrap();
        let removed = list.splice(1, Some(2), ["a"]).unwrap();
        assert_eq!(removed, [Value::from(2), Value::from(3)]);
        assert_eq!(
            items(&list),
            [Value::from(1), Value::from("a"), Value::from(4), Value::from(5)]
        );

        let removed = list.splice(-1, None, Vec::<Value>::new()).unwrap();
        assert_eq!(removed, [Value::from(5)]);

        list.splice(1, Some(0), ["b", "c"]).unwrap();
        assert_eq!(
            items(&list),
            [Value::from(1), Value::from("b"), Value::from("c"), Value::from("a"), Value::from(4)]
        );
    }

    #[test]
    fn mutators_do_not_track_length() {
        let list = reactive(Object::array(Vec::<Value>::new())).into_reactive().unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let (runs_clone, l) = (runs.clone(), list.clone());
        let _pusher = effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            l.push([1]).unwrap_or_default()
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        list.push([2]).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn readonly_arrays_are_not_mutated() {
        let raw = Object::array([1]);
        let list = readonly(&raw).into_reactive().unwrap();
        list.push([2]).unwrap();
        assert_eq!(raw.array_items(), Some(vec![Value::from(1)]));
        assert!(list.includes(1).unwrap());
    }

    #[test]
    fn array_methods_require_an_array() {
        let state = reactive(Object::record()).into_reactive().unwrap();
        assert!(matches!(state.push([1]), Err(ReactiveError::NotAnArray { .. })));
    }
}
