//! Observable Wrappers
//!
//! An observable wrapper presents a container value through an interception
//! layer: reads subscribe the running effect to what was read, writes notify
//! the subscribers of what changed. The raw container is never copied; the
//! wrapper holds the same shared handle and adds behavior around it.
//!
//! # How Wrapping Works
//!
//! 1. [`reactive`] (and its shallow/read-only variants) accepts a container
//!    value and returns it wrapped. Primitives pass through unchanged with a
//!    warning, since there is nothing to intercept.
//!
//! 2. Reads go through [`Reactive::get`]: the effect on top of the tracking
//!    stack is subscribed to the entry's key, and a container child is
//!    itself returned wrapped (unless the wrapper is shallow), so tracking
//!    follows the read path all the way down.
//!
//! 3. Writes go through [`Reactive::set`] and friends: the raw container is
//!    mutated first, then the dependency store is triggered with the key and
//!    the kind of change. Writes that do not change anything (same-value
//!    writes) trigger nothing.
//!
//! # Wrapper Identity
//!
//! A wrapper is a value, not an allocation: wrapping the same container in
//! the same mode always produces an equal wrapper, and equality between
//! wrappers is target identity plus mode. Storing a wrapper into reactive
//! state strips it back to the raw container first, so raw trees never
//! contain wrappers.
//!
//! # Container Kinds
//!
//! Objects, arrays, maps, and sets each implement a small protocol
//! ([`RawContainer`]) that normalizes keys, performs raw operations, and
//! names the structural key that addition and removal invalidate. The
//! wrapper logic above it is identical for all four kinds.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::context;
use super::runtime::{self, DepKey, OpKind};
use super::value::{ArrRef, Key, MapRef, ObjRef, SetRef, TargetId, Value};

/// How a wrapper observes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Mode {
    shallow: bool,
    readonly: bool,
}

/// Deep mutable view of a container value.
///
/// Reads track, writes trigger, and container children come back wrapped in
/// the same mode. Non-container values pass through unchanged.
pub fn reactive(value: Value) -> Value {
    wrap(
        value,
        Mode {
            shallow: false,
            readonly: false,
        },
    )
}

/// Mutable view whose reads track only the first level.
///
/// Children are returned as their raw values, so mutating a child directly
/// notifies nobody.
pub fn shallow_reactive(value: Value) -> Value {
    wrap(
        value,
        Mode {
            shallow: true,
            readonly: false,
        },
    )
}

/// Deep read-only view. Writes warn and change nothing, and entry reads do
/// not track. Existence, size, and enumeration reads still subscribe, so a
/// read-only consumer follows shape changes made elsewhere.
pub fn readonly(value: Value) -> Value {
    wrap(
        value,
        Mode {
            shallow: false,
            readonly: true,
        },
    )
}

/// Read-only view of the first level only.
pub fn shallow_readonly(value: Value) -> Value {
    wrap(
        value,
        Mode {
            shallow: true,
            readonly: true,
        },
    )
}

/// Strip a reactive wrapper, yielding the raw container value.
///
/// Non-wrapper values pass through unchanged.
pub fn to_raw(value: Value) -> Value {
    match value {
        Value::Reactive(wrapper) => wrapper.raw(),
        other => other,
    }
}

fn wrap(value: Value, mode: Mode) -> Value {
    let target = match value {
        Value::Obj(obj) => Target::Obj(obj),
        Value::Arr(arr) => Target::Arr(arr),
        Value::Map(map) => Target::Map(map),
        Value::Set(set) => Target::Set(set),
        // Re-wrapping observes the same raw target in the requested mode.
        Value::Reactive(wrapper) => return wrap(wrapper.raw(), mode),
        primitive => {
            tracing::warn!(kind = primitive.kind(), "value cannot be made observable");
            return primitive;
        }
    };
    Value::Reactive(Reactive { target, mode })
}

fn normalize_key(key: Key) -> Key {
    match key {
        Key::Entry(value) => Key::Entry(to_raw(value)),
        other => other,
    }
}

// ----------------------------------------------------------------------------
// Container protocol
// ----------------------------------------------------------------------------

/// Result of a keyed write against a raw container.
struct WriteOutcome {
    op: OpKind,
    changed: bool,
}

/// Uniform protocol the wrapper speaks to each container kind.
///
/// Supporting a new kind of container means implementing this; the wrapper
/// logic does not change.
trait RawContainer {
    fn target_id(&self) -> TargetId;
    fn kind_name(&self) -> &'static str;
    /// The structural key that entry addition and removal invalidate.
    fn structure_key(&self) -> DepKey;
    /// Rewrite a caller-facing key into this container's own key space.
    /// `None` means the key cannot address anything in this container.
    fn canonical(&self, key: Key) -> Option<Key>;
    fn read(&self, key: &Key) -> Option<Value>;
    fn write(&self, key: &Key, value: Value) -> Option<WriteOutcome>;
    fn has(&self, key: &Key) -> bool;
    /// Remove the entry at `key`. Returns whether a change was made.
    fn delete(&self, key: &Key) -> bool;
    /// Operation kind reported for a removal.
    fn delete_op(&self) -> OpKind {
        OpKind::Delete
    }
    fn size(&self) -> usize;
    fn snapshot(&self) -> Vec<(Key, Value)>;
}

/// Property text for a value used as an object key.
fn prop_name(value: &Value) -> Option<Rc<str>> {
    match value {
        Value::Str(name) => Some(name.clone()),
        Value::Int(number) => Some(Rc::from(number.to_string())),
        Value::Float(number) => Some(Rc::from(number.to_string())),
        Value::Bool(flag) => Some(Rc::from(if *flag { "true" } else { "false" })),
        Value::Null => Some(Rc::from("null")),
        _ => None,
    }
}

impl RawContainer for ObjRef {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn kind_name(&self) -> &'static str {
        "obj"
    }

    fn structure_key(&self) -> DepKey {
        DepKey::Iterate
    }

    fn canonical(&self, key: Key) -> Option<Key> {
        match key {
            Key::Prop(name) => Some(Key::Prop(name)),
            Key::Index(index) => Some(Key::Prop(Rc::from(index.to_string()))),
            Key::Entry(value) => prop_name(&value).map(Key::Prop),
        }
    }

    fn read(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Prop(name) => self.get(name),
            _ => None,
        }
    }

    fn write(&self, key: &Key, value: Value) -> Option<WriteOutcome> {
        let Key::Prop(name) = key else {
            return None;
        };
        let previous = self.insert(name.clone(), value.clone());
        Some(match previous {
            None => WriteOutcome {
                op: OpKind::Add,
                changed: true,
            },
            Some(previous) => WriteOutcome {
                op: OpKind::Set,
                changed: !previous.same_value(&value),
            },
        })
    }

    fn has(&self, key: &Key) -> bool {
        match key {
            Key::Prop(name) => self.contains_key(name),
            _ => false,
        }
    }

    fn delete(&self, key: &Key) -> bool {
        match key {
            Key::Prop(name) => self.remove(name).is_some(),
            _ => false,
        }
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.entries()
            .into_iter()
            .map(|(name, value)| (Key::Prop(name), value))
            .collect()
    }
}

impl RawContainer for ArrRef {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn kind_name(&self) -> &'static str {
        "arr"
    }

    fn structure_key(&self) -> DepKey {
        DepKey::Length
    }

    fn canonical(&self, key: Key) -> Option<Key> {
        match key {
            Key::Index(index) => Some(Key::Index(index)),
            Key::Prop(name) => name.parse::<usize>().ok().map(Key::Index),
            Key::Entry(Value::Int(number)) => usize::try_from(number).ok().map(Key::Index),
            Key::Entry(Value::Float(number)) => {
                if number.fract() == 0.0 && number >= 0.0 && number < usize::MAX as f64 {
                    Some(Key::Index(number as usize))
                } else {
                    None
                }
            }
            Key::Entry(_) => None,
        }
    }

    fn read(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Index(index) => self.get(*index),
            _ => None,
        }
    }

    fn write(&self, key: &Key, value: Value) -> Option<WriteOutcome> {
        let Key::Index(index) = key else {
            return None;
        };
        let index = *index;
        Some(self.with_mut(|items| {
            if index < items.len() {
                let changed = !items[index].same_value(&value);
                items[index] = value;
                WriteOutcome {
                    op: OpKind::Set,
                    changed,
                }
            } else {
                // Writing past the end pads the gap with nulls.
                items.resize(index, Value::Null);
                items.push(value);
                WriteOutcome {
                    op: OpKind::Add,
                    changed: true,
                }
            }
        }))
    }

    fn has(&self, key: &Key) -> bool {
        match key {
            Key::Index(index) => *index < self.len(),
            _ => false,
        }
    }

    fn delete(&self, key: &Key) -> bool {
        let Key::Index(index) = key else {
            return false;
        };
        let index = *index;
        self.with_mut(|items| {
            if index < items.len() && !items[index].is_null() {
                items[index] = Value::Null;
                true
            } else {
                false
            }
        })
    }

    /// Removing an array entry nulls the slot without shifting, so the
    /// length and the other positions are untouched.
    fn delete_op(&self) -> OpKind {
        OpKind::Set
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.items()
            .into_iter()
            .enumerate()
            .map(|(index, value)| (Key::Index(index), value))
            .collect()
    }
}

/// The map/set key a caller-facing key stands for.
fn entry_value(key: Key) -> Option<Value> {
    match key {
        Key::Entry(value) => Some(value),
        Key::Prop(name) => Some(Value::Str(name)),
        Key::Index(index) => Some(Value::Int(index as i64)),
    }
}

impl RawContainer for MapRef {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn kind_name(&self) -> &'static str {
        "map"
    }

    fn structure_key(&self) -> DepKey {
        DepKey::Iterate
    }

    fn canonical(&self, key: Key) -> Option<Key> {
        entry_value(key).map(Key::Entry)
    }

    fn read(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Entry(entry) => self.get(entry),
            _ => None,
        }
    }

    fn write(&self, key: &Key, value: Value) -> Option<WriteOutcome> {
        let Key::Entry(entry) = key else {
            return None;
        };
        let previous = self.insert(entry.clone(), value.clone());
        Some(match previous {
            None => WriteOutcome {
                op: OpKind::Add,
                changed: true,
            },
            Some(previous) => WriteOutcome {
                op: OpKind::Set,
                changed: !previous.same_value(&value),
            },
        })
    }

    fn has(&self, key: &Key) -> bool {
        match key {
            Key::Entry(entry) => self.contains_key(entry),
            _ => false,
        }
    }

    fn delete(&self, key: &Key) -> bool {
        match key {
            Key::Entry(entry) => self.remove(entry).is_some(),
            _ => false,
        }
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.entries()
            .into_iter()
            .map(|(entry, value)| (Key::Entry(entry), value))
            .collect()
    }
}

impl RawContainer for SetRef {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn kind_name(&self) -> &'static str {
        "set"
    }

    fn structure_key(&self) -> DepKey {
        DepKey::Iterate
    }

    fn canonical(&self, key: Key) -> Option<Key> {
        entry_value(key).map(Key::Entry)
    }

    fn read(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Entry(member) if self.contains(member) => Some(member.clone()),
            _ => None,
        }
    }

    fn write(&self, _key: &Key, _value: Value) -> Option<WriteOutcome> {
        // Sets have members, not keyed slots. Mutation goes through add.
        None
    }

    fn has(&self, key: &Key) -> bool {
        match key {
            Key::Entry(member) => self.contains(member),
            _ => false,
        }
    }

    fn delete(&self, key: &Key) -> bool {
        match key {
            Key::Entry(member) => self.remove(member),
            _ => false,
        }
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.members()
            .into_iter()
            .map(|member| (Key::Entry(member.clone()), member))
            .collect()
    }
}

#[derive(Clone)]
enum Target {
    Obj(ObjRef),
    Arr(ArrRef),
    Map(MapRef),
    Set(SetRef),
}

impl Target {
    fn container(&self) -> &dyn RawContainer {
        match self {
            Target::Obj(obj) => obj,
            Target::Arr(arr) => arr,
            Target::Map(map) => map,
            Target::Set(set) => set,
        }
    }

    fn raw_value(&self) -> Value {
        match self {
            Target::Obj(obj) => Value::Obj(obj.clone()),
            Target::Arr(arr) => Value::Arr(arr.clone()),
            Target::Map(map) => Value::Map(map.clone()),
            Target::Set(set) => Value::Set(set.clone()),
        }
    }

    fn mark_tracked(&self) {
        match self {
            Target::Obj(obj) => obj.mark_tracked(),
            Target::Arr(arr) => arr.mark_tracked(),
            Target::Map(map) => map.mark_tracked(),
            Target::Set(set) => set.mark_tracked(),
        }
    }
}

// ----------------------------------------------------------------------------
// Reactive
// ----------------------------------------------------------------------------

/// A container value seen through an observing wrapper.
///
/// Obtained from [`reactive`] and its variants, or from reading a container
/// child through an existing deep wrapper.
#[derive(Clone)]
pub struct Reactive {
    target: Target,
    mode: Mode,
}

impl Reactive {
    /// The wrapped target's ID.
    pub fn target_id(&self) -> TargetId {
        self.target.container().target_id()
    }

    /// Whether writes through this wrapper are rejected.
    pub fn is_readonly(&self) -> bool {
        self.mode.readonly
    }

    /// Whether children are returned raw instead of wrapped.
    pub fn is_shallow(&self) -> bool {
        self.mode.shallow
    }

    /// The underlying raw container, as a plain value. Never tracks.
    pub fn raw(&self) -> Value {
        self.target.raw_value()
    }

    fn track_key(&self, key: DepKey) {
        if runtime::track(self.target_id(), key) {
            self.target.mark_tracked();
        }
    }

    fn canonical_key(&self, key: Key) -> Option<Key> {
        self.target.container().canonical(normalize_key(key))
    }

    /// Wrap a child the way this wrapper's mode dictates.
    fn observe_child(&self, value: Value) -> Value {
        if self.mode.shallow {
            return value;
        }
        if value.is_container() || value.is_reactive() {
            wrap(
                value,
                Mode {
                    shallow: false,
                    readonly: self.mode.readonly,
                },
            )
        } else {
            value
        }
    }

    fn observe_entry_key(&self, key: Key) -> Key {
        match key {
            Key::Entry(value) => Key::Entry(self.observe_child(value)),
            other => other,
        }
    }

    /// Read one entry.
    ///
    /// Missing entries (and keys this container cannot address) read as
    /// `Null`. Inside an effect the read subscribes the effect to the
    /// entry's key, unless this wrapper is read-only.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let Some(key) = self.canonical_key(key.into()) else {
            return Value::Null;
        };
        // Read-only exempts entry reads alone; existence, size, and
        // enumeration reads subscribe in every mode.
        if !self.mode.readonly {
            self.track_key(DepKey::from(key.clone()));
        }
        let Some(value) = self.target.container().read(&key) else {
            return Value::Null;
        };
        self.observe_child(value)
    }

    /// Write one entry.
    ///
    /// The stored value is stripped of any wrapper first. Subscribers are
    /// triggered only when the entry actually changed, under same-value-zero
    /// comparison. On a read-only wrapper this warns and does nothing.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = normalize_key(key.into());
        if self.mode.readonly {
            tracing::warn!(key = %key, "write through a read-only wrapper ignored");
            return;
        }
        let container = self.target.container();
        let Some(key) = container.canonical(key) else {
            tracing::warn!(
                kind = container.kind_name(),
                "key cannot address this target"
            );
            return;
        };
        let value = to_raw(value.into());
        let Some(outcome) = container.write(&key, value) else {
            tracing::warn!(
                kind = container.kind_name(),
                "target does not support keyed writes"
            );
            return;
        };
        if outcome.changed {
            runtime::trigger(self.target_id(), DepKey::from(key), outcome.op);
        }
    }

    /// Whether an entry exists. Tracks the entry's key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let Some(key) = self.canonical_key(key.into()) else {
            return false;
        };
        self.track_key(DepKey::from(key.clone()));
        self.target.container().has(&key)
    }

    /// Remove an entry. Returns whether something was removed.
    ///
    /// Removal of an existing entry triggers its key and the structural
    /// subscribers. On a read-only wrapper this warns and does nothing.
    pub fn remove(&self, key: impl Into<Key>) -> bool {
        let key = normalize_key(key.into());
        if self.mode.readonly {
            tracing::warn!(key = %key, "removal through a read-only wrapper ignored");
            return false;
        }
        let container = self.target.container();
        let Some(key) = container.canonical(key) else {
            return false;
        };
        if container.delete(&key) {
            runtime::trigger(self.target_id(), DepKey::from(key), container.delete_op());
            true
        } else {
            false
        }
    }

    /// Number of entries. Tracks the structural key.
    pub fn len(&self) -> usize {
        self.track_key(self.target.container().structure_key());
        self.target.container().size()
    }

    /// Whether the target has no entries. Tracks the structural key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries, in insertion order.
    ///
    /// Subscribes to the structural key and to every entry visited, so both
    /// reshaping the target and changing an entry re-run the caller. Values
    /// (and container map keys) come back wrapped per this wrapper's mode.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.track_key(self.target.container().structure_key());
        self.target
            .container()
            .snapshot()
            .into_iter()
            .map(|(key, value)| {
                self.track_key(DepKey::from(key.clone()));
                (self.observe_entry_key(key), self.observe_child(value))
            })
            .collect()
    }

    /// Snapshot of the entry keys. Subscribes to the structural key only.
    pub fn keys(&self) -> Vec<Key> {
        self.track_key(self.target.container().structure_key());
        self.target
            .container()
            .snapshot()
            .into_iter()
            .map(|(key, _)| self.observe_entry_key(key))
            .collect()
    }

    /// Snapshot of the entry values, tracked like [`Reactive::entries`].
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Visit every entry, tracked like [`Reactive::entries`].
    pub fn for_each(&self, mut f: impl FnMut(&Key, &Value)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }

    // ------------------------------------------------------------------
    // Array operations
    // ------------------------------------------------------------------

    fn as_array_target(&self, op: &'static str) -> Option<&ArrRef> {
        match &self.target {
            Target::Arr(arr) => Some(arr),
            _ => {
                tracing::warn!(
                    kind = self.target.container().kind_name(),
                    op,
                    "operation only supported on array targets"
                );
                None
            }
        }
    }

    /// Append to an array target. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let Some(arr) = self.as_array_target("push") else {
            return self.target.container().size();
        };
        if self.mode.readonly {
            tracing::warn!("push through a read-only wrapper ignored");
            return arr.len();
        }
        let value = to_raw(value.into());
        let index = {
            // The raw edit must not record reads for the running effect.
            let _pause = context::pause_tracking();
            arr.with_mut(|items| {
                items.push(value);
                items.len() - 1
            })
        };
        runtime::trigger(arr.id(), DepKey::Index(index), OpKind::Add);
        index + 1
    }

    /// Remove and return the last element of an array target.
    pub fn pop(&self) -> Option<Value> {
        let arr = self.as_array_target("pop")?;
        if self.mode.readonly {
            tracing::warn!("pop through a read-only wrapper ignored");
            return None;
        }
        let popped = {
            let _pause = context::pause_tracking();
            arr.with_mut(|items| items.pop())
        }?;
        runtime::trigger(arr.id(), DepKey::Index(arr.len()), OpKind::Delete);
        Some(self.observe_child(popped))
    }

    /// Remove and return the first element of an array target.
    pub fn shift(&self) -> Option<Value> {
        let arr = self.as_array_target("shift")?;
        if self.mode.readonly {
            tracing::warn!("shift through a read-only wrapper ignored");
            return None;
        }
        if arr.is_empty() {
            return None;
        }
        let removed = self.edit_items(arr, |items| items.remove(0));
        Some(self.observe_child(removed))
    }

    /// Prepend to an array target. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let Some(arr) = self.as_array_target("unshift") else {
            return self.target.container().size();
        };
        if self.mode.readonly {
            tracing::warn!("unshift through a read-only wrapper ignored");
            return arr.len();
        }
        let value = to_raw(value.into());
        self.edit_items(arr, move |items| {
            items.insert(0, value);
            items.len()
        })
    }

    /// Replace a range of an array target, returning the removed elements.
    ///
    /// `start` and `delete_count` are clamped to the array's bounds.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let Some(arr) = self.as_array_target("splice") else {
            return Vec::new();
        };
        if self.mode.readonly {
            tracing::warn!("splice through a read-only wrapper ignored");
            return Vec::new();
        }
        let items: Vec<Value> = items.into_iter().map(to_raw).collect();
        let removed = self.edit_items(arr, move |list| {
            let start = start.min(list.len());
            let end = (start + delete_count).min(list.len());
            list.splice(start..end, items).collect::<Vec<Value>>()
        });
        removed
            .into_iter()
            .map(|value| self.observe_child(value))
            .collect()
    }

    /// Run a raw list edit, then trigger per-index changes by diffing the
    /// before and after contents.
    fn edit_items<R>(&self, arr: &ArrRef, edit: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let (result, old_items) = {
            let _pause = context::pause_tracking();
            let old_items = arr.items();
            let result = arr.with_mut(edit);
            (result, old_items)
        };
        let new_items = arr.items();
        let target = arr.id();

        let shared = old_items.len().min(new_items.len());
        for index in 0..shared {
            if !old_items[index].same_value(&new_items[index]) {
                runtime::trigger(target, DepKey::Index(index), OpKind::Set);
            }
        }
        for index in old_items.len()..new_items.len() {
            runtime::trigger(target, DepKey::Index(index), OpKind::Add);
        }
        for index in new_items.len()..old_items.len() {
            runtime::trigger(target, DepKey::Index(index), OpKind::Delete);
        }
        result
    }

    /// Position of `needle` in an array target, or `None`.
    ///
    /// The search runs in two passes: first comparing elements as observed
    /// through this wrapper, then comparing raw contents, so the needle is
    /// found whether the caller holds the wrapped or the raw form of an
    /// element. The array's length and every visited position are tracked.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        let arr = self.as_array_target("index_of")?;
        self.track_key(DepKey::Length);
        // Both passes scan under one borrow; tracking and child wrapping
        // never re-enter the cell.
        arr.with(|items| {
            for (index, item) in items.iter().enumerate() {
                self.track_key(DepKey::Index(index));
                if self.observe_child(item.clone()).same_value(needle) {
                    return Some(index);
                }
            }
            let raw_needle = to_raw(needle.clone());
            items.iter().position(|item| item.same_value(&raw_needle))
        })
    }

    /// Position of the last occurrence of `needle` in an array target.
    ///
    /// Same two-pass comparison and tracking as [`Reactive::index_of`].
    pub fn last_index_of(&self, needle: &Value) -> Option<usize> {
        let arr = self.as_array_target("last_index_of")?;
        self.track_key(DepKey::Length);
        arr.with(|items| {
            for (index, item) in items.iter().enumerate().rev() {
                self.track_key(DepKey::Index(index));
                if self.observe_child(item.clone()).same_value(needle) {
                    return Some(index);
                }
            }
            let raw_needle = to_raw(needle.clone());
            items.iter().rposition(|item| item.same_value(&raw_needle))
        })
    }

    /// Membership test for array and set targets.
    ///
    /// Arrays search both wrapped and raw forms like [`Reactive::index_of`];
    /// sets track the member's key.
    pub fn contains(&self, needle: &Value) -> bool {
        match &self.target {
            Target::Arr(_) => self.index_of(needle).is_some(),
            Target::Set(_) => self.has(Key::Entry(needle.clone())),
            _ => {
                tracing::warn!(
                    kind = self.target.container().kind_name(),
                    "contains is only supported on array and set targets"
                );
                false
            }
        }
    }

    /// Add a member to a set target. Returns whether it was newly added.
    pub fn add(&self, member: impl Into<Value>) -> bool {
        let Target::Set(set) = &self.target else {
            tracing::warn!(
                kind = self.target.container().kind_name(),
                "add is only supported on set targets"
            );
            return false;
        };
        if self.mode.readonly {
            tracing::warn!("add through a read-only wrapper ignored");
            return false;
        }
        let member = to_raw(member.into());
        if set.insert(member.clone()) {
            runtime::trigger(set.id(), DepKey::Entry(member), OpKind::Add);
            true
        } else {
            false
        }
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.target_id() == other.target_id() && self.mode == other.mode
    }
}

impl Eq for Reactive {}

impl Hash for Reactive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target_id().hash(state);
        self.mode.readonly.hash(state);
        self.mode.shallow.hash(state);
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.target_id())
            .field("kind", &self.target.container().kind_name())
            .field("readonly", &self.mode.readonly)
            .field("shallow", &self.mode.shallow)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
