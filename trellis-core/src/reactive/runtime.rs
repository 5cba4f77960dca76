//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observable targets
//! to effects. It owns the dependency store and dispatches change
//! notifications.
//!
//! # How It Works
//!
//! 1. When an effect reads part of a target, [`track`] records the effect in
//!    the store under `(target, key)` and hands the effect a back-reference
//!    so it can unsubscribe before its next run.
//!
//! 2. When part of a target changes, [`trigger`] snapshots the subscribers
//!    of the changed key and re-runs each one, or hands it to the effect's
//!    scheduler when one is attached.
//!
//! 3. Operations that add or remove entries also notify the subscribers of
//!    the target's structural keys, so computations that iterated the target
//!    or read its length re-run even though no key they read was written.
//!
//! # Store Shape
//!
//! The store is a thread-local two-level map: target ID to key to an ordered
//! set of subscribed effects. Subscriber sets are shared (`Rc`) between the
//! store and the effects' own membership lists; removing a subscription from
//! either side is visible to both.
//!
//! Store entries for targets whose containers have been dropped are queued
//! by the container destructors and swept on the next track or trigger.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context;
use super::effect::{EffectHandle, EffectId};
use super::value::{Key, TargetId, Value};

/// Effects subscribed to one dependency key, in subscription order.
pub(crate) type DepSet = Rc<RefCell<IndexMap<EffectId, EffectHandle>>>;

/// What part of a target a read or write touched.
///
/// Entry keys mirror [`Key`]. The remaining variants are synthetic: they
/// name aspects of a target that are not a single entry but can still be
/// depended upon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named property on an object target.
    Prop(Rc<str>),
    /// A position in an array target.
    Index(usize),
    /// A keyed entry in a map target, or a member of a set target.
    Entry(Value),
    /// The enumeration of a target as a whole. Invalidated when entries are
    /// added or removed.
    Iterate,
    /// An array target's length.
    Length,
    /// The value slot of a boxed reference or a computed value.
    Value,
}

impl From<Key> for DepKey {
    fn from(key: Key) -> Self {
        match key {
            Key::Prop(name) => DepKey::Prop(name),
            Key::Index(index) => DepKey::Index(index),
            Key::Entry(value) => DepKey::Entry(value),
        }
    }
}

/// The kind of mutation a trigger reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// An existing entry's value changed.
    Set,
    /// A new entry appeared.
    Add,
    /// An existing entry disappeared.
    Delete,
}

thread_local! {
    static STORE: RefCell<HashMap<TargetId, HashMap<DepKey, DepSet>>> =
        RefCell::new(HashMap::new());
    static RECLAIMED: RefCell<Vec<TargetId>> = RefCell::new(Vec::new());
}

/// Record that the running effect read `key` on `target`.
///
/// Returns `true` if a subscription was recorded. Does nothing when no
/// effect is running or tracking is paused.
pub fn track(target: TargetId, key: DepKey) -> bool {
    if context::paused() {
        return false;
    }
    let Some(current) = context::current_effect() else {
        return false;
    };
    sweep_reclaimed();

    let dep = STORE.with(|store| {
        store
            .borrow_mut()
            .entry(target)
            .or_default()
            .entry(key)
            .or_insert_with(|| Rc::new(RefCell::new(IndexMap::new())))
            .clone()
    });

    let newly_subscribed = dep
        .borrow_mut()
        .insert(current.id(), current.clone())
        .is_none();
    if newly_subscribed {
        current.add_membership(dep);
    }
    true
}

/// Re-run or schedule every effect subscribed to `key` on `target`.
///
/// `Add` and `Delete` operations additionally notify subscribers of the
/// target's `Iterate` and `Length` keys. The effect currently at the top of
/// the tracking stack is excluded, so an effect writing to its own
/// dependency does not restart itself.
///
/// Subscribers are snapshotted before any of them runs; re-tracking during
/// a run cannot extend the dispatch.
pub fn trigger(target: TargetId, key: DepKey, op: OpKind) {
    sweep_reclaimed();

    let current_id = context::current_effect().map(|e| e.id());
    let mut to_run: IndexMap<EffectId, EffectHandle> = IndexMap::new();

    STORE.with(|store| {
        let store = store.borrow();
        let Some(keys) = store.get(&target) else {
            return;
        };
        collect_subscribers(keys, &key, current_id, &mut to_run);
        if matches!(op, OpKind::Add | OpKind::Delete) {
            collect_subscribers(keys, &DepKey::Iterate, current_id, &mut to_run);
            collect_subscribers(keys, &DepKey::Length, current_id, &mut to_run);
        }
    });

    if to_run.is_empty() {
        return;
    }
    tracing::trace!(
        target_id = target.raw(),
        ?key,
        ?op,
        subscribers = to_run.len(),
        "dispatching trigger"
    );

    for (_, effect) in to_run {
        match effect.scheduler() {
            Some(schedule) => schedule(&effect),
            None => {
                effect.run();
            }
        }
    }
}

fn collect_subscribers(
    keys: &HashMap<DepKey, DepSet>,
    key: &DepKey,
    current_id: Option<EffectId>,
    out: &mut IndexMap<EffectId, EffectHandle>,
) {
    let Some(dep) = keys.get(key) else {
        return;
    };
    for (id, effect) in dep.borrow().iter() {
        if Some(*id) != current_id {
            out.entry(*id).or_insert_with(|| effect.clone());
        }
    }
}

/// Queue a dropped target's store entry for removal.
///
/// Called from container destructors. The entry is swept on the next track
/// or trigger; `try_with` tolerates destructor runs during thread teardown.
pub(crate) fn reclaim(target: TargetId) {
    let _ = RECLAIMED.try_with(|dead| dead.borrow_mut().push(target));
}

fn sweep_reclaimed() {
    let dead: Vec<TargetId> = RECLAIMED.with(|dead| {
        let mut dead = dead.borrow_mut();
        if dead.is_empty() {
            Vec::new()
        } else {
            std::mem::take(&mut *dead)
        }
    });
    if dead.is_empty() {
        return;
    }
    STORE.with(|store| {
        let mut store = store.borrow_mut();
        for target in dead {
            store.remove(&target);
        }
    });
}

#[cfg(test)]
pub(crate) fn store_tracks_target(target: TargetId) -> bool {
    STORE.with(|store| store.borrow().contains_key(&target))
}

#[cfg(test)]
pub(crate) fn tracked_key_count(target: TargetId) -> usize {
    STORE.with(|store| {
        store
            .borrow()
            .get(&target)
            .map(|keys| keys.len())
            .unwrap_or(0)
    })
}
