//! Signal Implementation
//!
//! A Signal is a boxed reactive reference: one slot whose reads and writes
//! are intercepted as a whole. It is the primitive for state that is not a
//! container, and the convenient root handle for state that is.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a running effect, the effect is
//!    subscribed to the signal's single value key.
//!
//! 2. When a signal is written with a value that differs from the current
//!    one (same-value-zero comparison), the subscribers are triggered.
//!    Writing an equal value triggers nothing.
//!
//! 3. A signal holding a container hands out the container deeply wrapped,
//!    so reads through the signal keep tracking into the tree.
//!
//! # Storage
//!
//! The slot stores the raw form of whatever it is given; wrappers are
//! stripped on the way in. The observable form is built once per write and
//! cached alongside, so repeated reads return the identical wrapper.
//!
//! # Example
//!
//! ```rust,ignore
//! let count = Signal::new(0);
//!
//! // Read the value (subscribes the running effect, if any)
//! let value = count.get();
//!
//! // Update the value (notifies subscribers)
//! count.set(5);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::observe::{reactive, to_raw};
use super::runtime::{self, DepKey, OpKind};
use super::value::{TargetId, Value};

struct SignalInner {
    /// Unique identifier for this signal.
    id: TargetId,

    /// The current value in raw form.
    raw: RefCell<Value>,

    /// The value as handed out by reads: containers are wrapped, primitives
    /// are the raw value itself.
    observed: RefCell<Value>,

    /// Whether the dependency store may hold entries for this signal.
    tracked: Cell<bool>,
}

impl Drop for SignalInner {
    fn drop(&mut self) {
        if self.tracked.get() {
            runtime::reclaim(self.id);
        }
    }
}

/// A reactive reference holding a single [`Value`].
///
/// Clones share the same slot.
#[derive(Clone)]
pub struct Signal {
    inner: Rc<SignalInner>,
}

impl Signal {
    /// Create a new signal with the given initial value.
    ///
    /// A wrapper passed as the initial value is stripped to its raw form
    /// first.
    pub fn new(value: impl Into<Value>) -> Self {
        let raw = to_raw(value.into());
        let observed = Self::observable_form(&raw);
        Signal {
            inner: Rc::new(SignalInner {
                id: TargetId::next(),
                raw: RefCell::new(raw),
                observed: RefCell::new(observed),
                tracked: Cell::new(false),
            }),
        }
    }

    fn observable_form(raw: &Value) -> Value {
        if raw.is_container() {
            reactive(raw.clone())
        } else {
            raw.clone()
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// Within a running effect this subscribes the effect to the signal.
    /// Container values come back deeply wrapped.
    pub fn get(&self) -> Value {
        if runtime::track(self.inner.id, DepKey::Value) {
            self.inner.tracked.set(true);
        }
        self.inner.observed.borrow().clone()
    }

    /// Get the current value without subscribing anything.
    pub fn get_untracked(&self) -> Value {
        self.inner.observed.borrow().clone()
    }

    /// The current value in raw form, without subscribing anything.
    pub fn raw(&self) -> Value {
        self.inner.raw.borrow().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// The stored value is stripped of any wrapper. If the new value is the
    /// same as the current one under same-value-zero comparison, nothing is
    /// stored and nobody is notified.
    pub fn set(&self, value: impl Into<Value>) {
        let raw = to_raw(value.into());
        if self.inner.raw.borrow().same_value(&raw) {
            return;
        }
        *self.inner.observed.borrow_mut() = Self::observable_form(&raw);
        *self.inner.raw.borrow_mut() = raw;
        runtime::trigger(self.inner.id, DepKey::Value, OpKind::Set);
    }

    /// Update the value using a function of the current raw value.
    pub fn update(&self, f: impl FnOnce(Value) -> Value) {
        let current = self.inner.raw.borrow().clone();
        self.set(f(current));
    }
}

impl Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.raw.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::effect;
    use crate::reactive::value::ObjRef;
    use std::cell::RefCell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), Value::Int(0));

        signal.set(42);
        assert_eq!(signal.get(), Value::Int(42));
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| Value::Int(v.as_int().unwrap_or(0) + 5));
        assert_eq!(signal.get(), Value::Int(15));
    }

    #[test]
    fn signal_reruns_subscribed_effects() {
        let signal = Signal::new(0);
        let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

        let seen_inner = seen.clone();
        let reader = signal.clone();
        effect(move || {
            seen_inner.borrow_mut().push(reader.get());
        });
        assert_eq!(&*seen.borrow(), &[Value::Int(0)]);

        signal.set(1);
        assert_eq!(&*seen.borrow(), &[Value::Int(0), Value::Int(1)]);

        // An equal write is silent.
        signal.set(1);
        assert_eq!(seen.borrow().len(), 2);

        // So is an equal write in another numeric representation.
        signal.set(Value::Float(1.0));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn signal_nan_writes_are_silent_after_the_first() {
        let signal = Signal::new(Value::Float(0.0));
        let runs = Rc::new(Cell::new(0));

        let runs_inner = runs.clone();
        let reader = signal.clone();
        effect(move || {
            reader.get();
            runs_inner.set(runs_inner.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        signal.set(Value::Float(f64::NAN));
        assert_eq!(runs.get(), 2);

        signal.set(Value::Float(f64::NAN));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn signal_get_untracked_subscribes_nothing() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));

        let runs_inner = runs.clone();
        let reader = signal.clone();
        effect(move || {
            reader.get_untracked();
            runs_inner.set(runs_inner.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        signal.set(5);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn signal_wraps_container_values() {
        let obj = ObjRef::new();
        obj.insert("name", Value::from("ada"));
        let signal = Signal::new(Value::Obj(obj));

        let held = signal.get();
        assert!(held.is_reactive());

        // Reads through the handed-out wrapper track into the tree.
        let names: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let names_inner = names.clone();
        let reader = signal.clone();
        effect(move || {
            let state = reader.get();
            let state = state.as_reactive().expect("container is wrapped");
            names_inner.borrow_mut().push(state.get("name"));
        });
        assert_eq!(&*names.borrow(), &[Value::from("ada")]);

        held.as_reactive().unwrap().set("name", "grace");
        assert_eq!(&*names.borrow(), &[Value::from("ada"), Value::from("grace")]);

        // The raw form stays unwrapped.
        assert!(!signal.raw().is_reactive());
    }

    #[test]
    fn signal_stores_raw_forms() {
        let signal = Signal::new(0);
        signal.set(reactive(Value::obj()));
        assert!(signal.raw().is_container());
        assert!(!signal.raw().is_reactive());
        assert!(signal.get().is_reactive());
    }

    #[test]
    fn signal_clone_shares_state() {
        let first = Signal::new(0);
        let second = first.clone();

        first.set(42);
        assert_eq!(second.get(), Value::Int(42));

        second.set(100);
        assert_eq!(first.get(), Value::Int(100));
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
