//! Dynamic Value Model
//!
//! Reactive state in Trellis is held in a dynamic value tree rather than in
//! statically typed cells. A [`Value`] is either a primitive (null, bool,
//! number, string) or a handle to a shared container: an object (string keys),
//! an array, a keyed map, or a set.
//!
//! # Identity
//!
//! Containers are reference types. Cloning a `Value` that holds a container
//! clones the handle, not the contents, so two clones observe the same
//! mutations. Every container carries a [`TargetId`] allocated from a global
//! counter; the dependency store is keyed by these IDs, and equality between
//! container values is identity equality on them.
//!
//! # Equality
//!
//! [`Value::same_value`] implements the "same-value-zero" comparison used by
//! the change gates throughout the runtime: `NaN` equals `NaN`, positive and
//! negative zero are equal, integers and floats compare numerically, and
//! containers compare by identity. `PartialEq`, `Eq`, and `Hash` all agree
//! with it, which is what lets a `Value` serve as a map key or set member.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::observe::Reactive;
use super::runtime;

/// Counter for generating unique target IDs.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier for a trackable target.
///
/// Containers, boxed references, and computed values all draw from the same
/// sequence, so a `TargetId` names exactly one target for the lifetime of the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocate the next unique target ID.
    pub fn next() -> Self {
        TargetId(TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value, mainly useful for logging.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

// ----------------------------------------------------------------------------
// Container handles
// ----------------------------------------------------------------------------

/// Shared storage for an object target: named properties in insertion order.
#[derive(Clone)]
pub struct ObjRef {
    cell: Rc<ObjCell>,
}

struct ObjCell {
    id: TargetId,
    tracked: Cell<bool>,
    entries: RefCell<IndexMap<Rc<str>, Value>>,
}

impl ObjRef {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::from_entries(IndexMap::new())
    }

    pub(crate) fn from_entries(entries: IndexMap<Rc<str>, Value>) -> Self {
        ObjRef {
            cell: Rc::new(ObjCell {
                id: TargetId::next(),
                tracked: Cell::new(false),
                entries: RefCell::new(entries),
            }),
        }
    }

    /// This object's target ID.
    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub(crate) fn mark_tracked(&self) {
        self.cell.tracked.set(true);
    }

    /// Look up a property, cloning the stored value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.cell.entries.borrow().get(key).cloned()
    }

    /// Insert or replace a property, returning the previous value if any.
    pub fn insert(&self, key: impl Into<Rc<str>>, value: Value) -> Option<Value> {
        self.cell.entries.borrow_mut().insert(key.into(), value)
    }

    /// Remove a property, returning it if it existed.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.cell.entries.borrow_mut().shift_remove(key)
    }

    /// Whether a property with this name exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.cell.entries.borrow().contains_key(key)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.cell.entries.borrow().len()
    }

    /// Whether the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the property names, in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.cell.entries.borrow().keys().cloned().collect()
    }

    /// Snapshot of the entries, in insertion order.
    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        self.cell
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for ObjRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjCell {
    fn drop(&mut self) {
        if self.tracked.get() {
            runtime::reclaim(self.id);
        }
    }
}

/// Shared storage for an array target.
#[derive(Clone)]
pub struct ArrRef {
    cell: Rc<ArrCell>,
}

struct ArrCell {
    id: TargetId,
    tracked: Cell<bool>,
    items: RefCell<Vec<Value>>,
}

impl ArrRef {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub(crate) fn from_items(items: Vec<Value>) -> Self {
        ArrRef {
            cell: Rc::new(ArrCell {
                id: TargetId::next(),
                tracked: Cell::new(false),
                items: RefCell::new(items),
            }),
        }
    }

    /// This array's target ID.
    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub(crate) fn mark_tracked(&self) {
        self.cell.tracked.set(true);
    }

    /// Clone the element at `index`, if it is in bounds.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.cell.items.borrow().get(index).cloned()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.cell.items.borrow().len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the elements.
    pub fn items(&self) -> Vec<Value> {
        self.cell.items.borrow().clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&Vec<Value>) -> R) -> R {
        f(&self.cell.items.borrow())
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.cell.items.borrow_mut())
    }
}

impl Default for ArrRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArrCell {
    fn drop(&mut self) {
        if self.tracked.get() {
            runtime::reclaim(self.id);
        }
    }
}

/// Shared storage for a map target: arbitrary value keys, insertion order.
#[derive(Clone)]
pub struct MapRef {
    cell: Rc<MapCell>,
}

struct MapCell {
    id: TargetId,
    tracked: Cell<bool>,
    entries: RefCell<IndexMap<Value, Value>>,
}

impl MapRef {
    /// Create an empty map.
    pub fn new() -> Self {
        MapRef {
            cell: Rc::new(MapCell {
                id: TargetId::next(),
                tracked: Cell::new(false),
                entries: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// This map's target ID.
    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub(crate) fn mark_tracked(&self) {
        self.cell.tracked.set(true);
    }

    /// Look up an entry, cloning the stored value.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.cell.entries.borrow().get(key).cloned()
    }

    /// Insert or replace an entry, returning the previous value if any.
    pub fn insert(&self, key: Value, value: Value) -> Option<Value> {
        self.cell.entries.borrow_mut().insert(key, value)
    }

    /// Remove an entry, returning its value if it existed.
    pub fn remove(&self, key: &Value) -> Option<Value> {
        self.cell.entries.borrow_mut().shift_remove(key)
    }

    /// Whether an entry with this key exists.
    pub fn contains_key(&self, key: &Value) -> bool {
        self.cell.entries.borrow().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cell.entries.borrow().len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the entries, in insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.cell
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MapCell {
    fn drop(&mut self) {
        if self.tracked.get() {
            runtime::reclaim(self.id);
        }
    }
}

/// Shared storage for a set target: unique members, insertion order.
#[derive(Clone)]
pub struct SetRef {
    cell: Rc<SetCell>,
}

struct SetCell {
    id: TargetId,
    tracked: Cell<bool>,
    members: RefCell<IndexSet<Value>>,
}

impl SetRef {
    /// Create an empty set.
    pub fn new() -> Self {
        SetRef {
            cell: Rc::new(SetCell {
                id: TargetId::next(),
                tracked: Cell::new(false),
                members: RefCell::new(IndexSet::new()),
            }),
        }
    }

    /// This set's target ID.
    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub(crate) fn mark_tracked(&self) {
        self.cell.tracked.set(true);
    }

    /// Add a member. Returns `true` if it was not already present.
    pub fn insert(&self, member: Value) -> bool {
        self.cell.members.borrow_mut().insert(member)
    }

    /// Remove a member. Returns `true` if it was present.
    pub fn remove(&self, member: &Value) -> bool {
        self.cell.members.borrow_mut().shift_remove(member)
    }

    /// Whether the set contains this member.
    pub fn contains(&self, member: &Value) -> bool {
        self.cell.members.borrow().contains(member)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.cell.members.borrow().len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the members, in insertion order.
    pub fn members(&self) -> Vec<Value> {
        self.cell.members.borrow().iter().cloned().collect()
    }
}

impl Default for SetRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SetCell {
    fn drop(&mut self) {
        if self.tracked.get() {
            runtime::reclaim(self.id);
        }
    }
}

// ----------------------------------------------------------------------------
// Value
// ----------------------------------------------------------------------------

/// A dynamic value: a primitive, a container handle, or a reactive wrapper.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value. Missing reads produce it.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Obj(ObjRef),
    Arr(ArrRef),
    Map(MapRef),
    Set(SetRef),
    /// A container seen through a reactive wrapper.
    Reactive(Reactive),
}

impl Value {
    /// Create an empty object value.
    pub fn obj() -> Value {
        Value::Obj(ObjRef::new())
    }

    /// Create an empty array value.
    pub fn arr() -> Value {
        Value::Arr(ArrRef::new())
    }

    /// Create an empty map value.
    pub fn map() -> Value {
        Value::Map(MapRef::new())
    }

    /// Create an empty set value.
    pub fn set() -> Value {
        Value::Set(SetRef::new())
    }

    /// A short name for this value's kind, used in messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Obj(_) => "obj",
            Value::Arr(_) => "arr",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Reactive(_) => "reactive",
        }
    }

    /// Whether this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a plain (unwrapped) container.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Obj(_) | Value::Arr(_) | Value::Map(_) | Value::Set(_)
        )
    }

    /// Whether this value is a reactive wrapper.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Value::Reactive(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<&ObjRef> {
        match self {
            Value::Obj(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_arr(&self) -> Option<&ArrRef> {
        match self {
            Value::Arr(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetRef> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(r) => Some(r),
            _ => None,
        }
    }

    /// Same-value-zero comparison.
    ///
    /// `NaN` equals `NaN`, positive and negative zero are equal, integers and
    /// floats compare numerically, containers and wrappers compare by
    /// identity. All change gates in the runtime use this comparison.
    pub fn same_value(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => float_as_int(*b) == Some(*a),
            (Obj(a), Obj(b)) => a.id() == b.id(),
            (Arr(a), Arr(b)) => a.id() == b.id(),
            (Map(a), Map(b)) => a.id() == b.id(),
            (Set(a), Set(b)) => a.id() == b.id(),
            (Reactive(a), Reactive(b)) => a == b,
            _ => false,
        }
    }

    /// Convert to a `serde_json::Value`.
    ///
    /// Maps serialize as objects with stringified keys, sets as arrays, and
    /// reactive wrappers as their underlying raw container. Floats that JSON
    /// cannot represent (`NaN`, infinities) become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::Int(i) => (*i).into(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Obj(o) => serde_json::Value::Object(
                o.entries()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Value::Arr(a) => {
                serde_json::Value::Array(a.items().into_iter().map(|v| v.to_json()).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.entries()
                    .into_iter()
                    .map(|(k, v)| (k.key_text(), v.to_json()))
                    .collect(),
            ),
            Value::Set(s) => {
                serde_json::Value::Array(s.members().into_iter().map(|v| v.to_json()).collect())
            }
            Value::Reactive(r) => r.raw().to_json(),
        }
    }

    /// Key text used when a non-string map key must appear in JSON output.
    fn key_text(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.to_json().to_string(),
        }
    }
}

/// The integer a float exactly represents, if any.
///
/// `-0.0` maps to `0`; `NaN`, infinities, fractional values, and magnitudes
/// outside the `i64` range map to `None`.
fn float_as_int(f: f64) -> Option<i64> {
    if f.fract() != 0.0 || f.is_infinite() {
        return None;
    }
    if f < -9_223_372_036_854_775_808.0 || f >= 9_223_372_036_854_775_808.0 {
        return None;
    }
    Some(f as i64)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            // Floats that represent an integer hash like that integer so that
            // hashing agrees with same_value across the two numeric kinds.
            Value::Float(f) => match float_as_int(*f) {
                Some(i) => {
                    state.write_u8(2);
                    i.hash(state);
                }
                None => {
                    state.write_u8(3);
                    let canonical = if f.is_nan() { f64::NAN } else { *f };
                    canonical.to_bits().hash(state);
                }
            },
            Value::Str(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::Obj(o) => {
                state.write_u8(5);
                o.id().hash(state);
            }
            Value::Arr(a) => {
                state.write_u8(6);
                a.id().hash(state);
            }
            Value::Map(m) => {
                state.write_u8(7);
                m.id().hash(state);
            }
            Value::Set(s) => {
                state.write_u8(8);
                s.id().hash(state);
            }
            Value::Reactive(r) => {
                state.write_u8(9);
                r.hash(state);
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Obj(o) => write!(f, "Obj(#{})", o.id().raw()),
            Value::Arr(a) => write!(f, "Arr(#{})", a.id().raw()),
            Value::Map(m) => write!(f, "Map(#{})", m.id().raw()),
            Value::Set(s) => write!(f, "Set(#{})", s.id().raw()),
            Value::Reactive(r) => write!(f, "Reactive(#{})", r.target_id().raw()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<Rc<str>> for Value {
    fn from(v: Rc<str>) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Arr(ArrRef::from_items(items))
    }
}

impl From<ObjRef> for Value {
    fn from(v: ObjRef) -> Self {
        Value::Obj(v)
    }
}

impl From<ArrRef> for Value {
    fn from(v: ArrRef) -> Self {
        Value::Arr(v)
    }
}

impl From<MapRef> for Value {
    fn from(v: MapRef) -> Self {
        Value::Map(v)
    }
}

impl From<SetRef> for Value {
    fn from(v: SetRef) -> Self {
        Value::Set(v)
    }
}

impl From<Reactive> for Value {
    fn from(v: Reactive) -> Self {
        Value::Reactive(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::Str(Rc::from(s)),
            serde_json::Value::Array(items) => {
                Value::Arr(ArrRef::from_items(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let entries = map
                    .into_iter()
                    .map(|(k, v)| (Rc::<str>::from(k), Value::from(v)))
                    .collect();
                Value::Obj(ObjRef::from_entries(entries))
            }
        }
    }
}

/// Error produced when a value does not have the shape a caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl TryFrom<Value> for i64 {
    type Error = ValueError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Int(i) => Ok(i),
            Value::Float(f) => float_as_int(f).ok_or(ValueError::KindMismatch {
                expected: "int",
                found: "float",
            }),
            other => Err(ValueError::KindMismatch {
                expected: "int",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = ValueError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_float().ok_or(ValueError::KindMismatch {
            expected: "number",
            found: v.kind(),
        })
    }
}

impl TryFrom<Value> for bool {
    type Error = ValueError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_bool().ok_or(ValueError::KindMismatch {
            expected: "bool",
            found: v.kind(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ValueError::KindMismatch {
                expected: "str",
                found: other.kind(),
            }),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "any JSON-compatible value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
                Ok(i64::try_from(v)
                    .map(Value::Int)
                    .unwrap_or(Value::Float(v as f64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Value, E> {
                Ok(Value::from(v))
            }

            fn visit_string<E>(self, v: String) -> Result<Value, E> {
                Ok(Value::from(v))
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
                Value::deserialize(d)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element::<Value>()? {
                    items.push(item);
                }
                Ok(Value::Arr(ArrRef::from_items(items)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let mut entries = IndexMap::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    entries.insert(Rc::<str>::from(key), value);
                }
                Ok(Value::Obj(ObjRef::from_entries(entries)))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

// ----------------------------------------------------------------------------
// Keys
// ----------------------------------------------------------------------------

/// Address of a single entry within a container target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property on an object target.
    Prop(Rc<str>),
    /// A position in an array target.
    Index(usize),
    /// A keyed entry in a map target, or a member of a set target.
    Entry(Value),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(s) => write!(f, "{s}"),
            Key::Index(i) => write!(f, "[{i}]"),
            Key::Entry(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Prop(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Prop(Rc::from(s))
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Key::Prop(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Entry(Value::Int(i))
    }
}

impl From<Value> for Key {
    fn from(v: Value) -> Self {
        Key::Entry(v)
    }
}

impl From<&Value> for Key {
    fn from(v: &Value) -> Self {
        Key::Entry(v.clone())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn same_value_treats_nan_as_equal() {
        let a = Value::Float(f64::NAN);
        let b = Value::Float(f64::NAN);
        assert!(a.same_value(&b));
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn same_value_treats_zero_signs_as_equal() {
        let pos = Value::Float(0.0);
        let neg = Value::Float(-0.0);
        assert!(pos.same_value(&neg));
        assert_eq!(hash_of(&pos), hash_of(&neg));
    }

    #[test]
    fn ints_and_floats_compare_numerically() {
        assert!(Value::Int(3).same_value(&Value::Float(3.0)));
        assert!(!Value::Int(3).same_value(&Value::Float(3.5)));
        assert_eq!(hash_of(&Value::Int(3)), hash_of(&Value::Float(3.0)));
        assert!(Value::Int(0).same_value(&Value::Float(-0.0)));
    }

    #[test]
    fn huge_floats_do_not_collapse_onto_ints() {
        // 2^53 + 1 is not representable as f64, so the int and the rounded
        // float must stay distinct.
        let int = Value::Int((1i64 << 53) + 1);
        let float = Value::Float((1u64 << 53) as f64);
        assert!(!int.same_value(&float));
        assert!(Value::Int(1i64 << 53).same_value(&float));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::obj();
        let b = a.clone();
        let c = Value::obj();
        assert!(a.same_value(&b));
        assert!(!a.same_value(&c));
    }

    #[test]
    fn container_clones_share_contents() {
        let a = ObjRef::new();
        let b = a.clone();
        a.insert("x", Value::Int(1));
        assert_eq!(b.get("x"), Some(Value::Int(1)));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn values_work_as_map_keys() {
        let map = MapRef::new();
        map.insert(Value::from("name"), Value::from("ada"));
        map.insert(Value::Int(1), Value::from("one"));
        map.insert(Value::Float(f64::NAN), Value::from("nan"));

        assert_eq!(map.get(&Value::from("name")), Some(Value::from("ada")));
        // Float(1.0) finds the entry stored under Int(1).
        assert_eq!(map.get(&Value::Float(1.0)), Some(Value::from("one")));
        assert_eq!(map.get(&Value::Float(f64::NAN)), Some(Value::from("nan")));
    }

    #[test]
    fn set_dedupes_by_same_value() {
        let set = SetRef::new();
        assert!(set.insert(Value::Int(1)));
        assert!(!set.insert(Value::Float(1.0)));
        assert!(set.insert(Value::Float(f64::NAN)));
        assert!(!set.insert(Value::Float(f64::NAN)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"name":"ada","tags":["a","b"],"meta":{"age":36,"score":9.5},"active":true,"nil":null}"#,
        )
        .unwrap();
        let value = Value::from(json.clone());

        let obj = value.as_obj().unwrap();
        assert_eq!(obj.get("name"), Some(Value::from("ada")));
        assert_eq!(obj.get("nil"), Some(Value::Null));
        let tags = obj.get("tags").unwrap();
        assert_eq!(tags.as_arr().unwrap().len(), 2);

        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn serde_deserialize_builds_containers() {
        let value: Value = serde_json::from_str(r#"{"xs":[1,2.5,"three"]}"#).unwrap();
        let xs = value.as_obj().unwrap().get("xs").unwrap();
        let xs = xs.as_arr().unwrap();
        assert_eq!(xs.get(0), Some(Value::Int(1)));
        assert_eq!(xs.get(1), Some(Value::Float(2.5)));
        assert_eq!(xs.get(2), Some(Value::from("three")));
    }

    #[test]
    fn try_from_reports_kind_mismatch() {
        let err = i64::try_from(Value::from("nope")).unwrap_err();
        assert_eq!(
            err,
            ValueError::KindMismatch {
                expected: "int",
                found: "str"
            }
        );
        assert_eq!(i64::try_from(Value::Float(4.0)), Ok(4));
        assert!(i64::try_from(Value::Float(4.5)).is_err());
    }

    #[test]
    fn display_renders_json_text() {
        let value: Value = serde_json::from_str(r#"{"a":1}"#).unwrap();
        assert_eq!(value.to_string(), r#"{"a":1}"#);
    }
}
