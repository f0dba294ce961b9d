//! Wrapper cache.
//!
//! One process-wide map from raw object identity to that object's wrappers,
//! one per slot. Entries are strong and are removed when the raw object is
//! dropped. A wrapper's identity never holds its raw object, so an entry
//! cannot keep its own key alive.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::{ReactiveInner, Slot, Wrappers};
use crate::value::ObjectId;

type ProxyMap = DashMap<ObjectId, Wrappers>;

static PROXY_MAP: OnceLock<ProxyMap> = OnceLock::new();

fn proxy_map() -> &'static ProxyMap {
    PROXY_MAP.get_or_init(DashMap::new)
}

pub(crate) fn lookup(target: ObjectId, slot: Slot) -> Option<Arc<ReactiveInner>> {
    proxy_map()
        .get(&target)
        .and_then(|wrappers| wrappers.iter().find(|w| w.slot() == slot).cloned())
}

/// The wrapper in `slot` for `target`, or a new one from `create`.
///
/// Check and insert happen under one shard lock, so racing callers agree
/// on a single wrapper.
pub(crate) fn get_or_create(
    target: ObjectId,
    slot: Slot,
    create: impl FnOnce() -> Arc<ReactiveInner>,
) -> Arc<ReactiveInner> {
    let mut wrappers = proxy_map().entry(target).or_default();
    if let Some(existing) = wrappers.iter().find(|w| w.slot() == slot) {
        return existing.clone();
    }
    let wrapper = create();
    wrappers.push(wrapper.clone());
    wrapper
}

/// Remove every wrapper of `target`.
pub(crate) fn evict_target(target: ObjectId) {
    let removed = proxy_map().remove(&target);
    drop(removed);
}
