//! Reactive Primitives
//!
//! This module implements the core reactive system: observable values,
//! effects, signals, memos, and watchers. These primitives form the
//! foundation of Trellis's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Values and Wrappers
//!
//! State lives in a dynamic [`Value`] tree. Wrapping a container value with
//! [`reactive`] (or its shallow/read-only variants) puts an interception
//! layer around it: reads subscribe the running effect to exactly what was
//! read, writes notify exactly what changed.
//!
//! ## Effects
//!
//! An [`effect`] is a side-effecting computation that re-runs whenever
//! something it read changes. Each re-run drops the previous subscriptions
//! and collects fresh ones, so an effect always tracks what its latest run
//! actually read.
//!
//! ## Signals and Memos
//!
//! A [`Signal`] is a boxed reactive reference: one slot, read and written
//! as a whole. A [`Memo`] is a derived value that caches its result,
//! goes stale when a dependency changes, and recomputes on the next read.
//!
//! ## Watchers
//!
//! A watcher ([`watch`], [`watch_fn`]) delivers `(new, old)` pairs to a
//! callback when a getter's result changes, either synchronously inside
//! the write or batched through the [`crate::scheduler`] queue.
//!
//! # Implementation Notes
//!
//! The system uses a thread-local effect stack to detect dependencies.
//! When state is read, the effect on top of the stack (if any) is
//! subscribed to that read in the thread-local dependency store.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod memo;
mod observe;
mod runtime;
mod signal;
mod value;
mod watcher;

pub use context::{is_tracking, untracked};
pub use effect::{effect, effect_with, EffectHandle, EffectId, EffectOptions, SchedulerFn};
pub use memo::Memo;
pub use observe::{
    reactive, readonly, shallow_reactive, shallow_readonly, to_raw, Reactive,
};
pub use runtime::{track, trigger, DepKey, OpKind};
pub use signal::Signal;
pub use value::{ArrRef, Key, MapRef, ObjRef, SetRef, TargetId, Value, ValueError};
pub use watcher::{
    watch, watch_fn, FlushMode, WatchHandle, WatchOptions, WatchSource,
};
