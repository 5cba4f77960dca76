//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI
//! framework. It implements:
//!
//! - Observable wrapping of dynamic container values
//! - Dependency tracking between reads and the effects that performed them
//! - Reactive primitives (signals, memos, effects, watchers)
//! - A batched job scheduler for deferred delivery
//!
//! Rendering, templates, and host integration live in other crates; this
//! one is only the engine that decides what must re-run when state changes.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the tracking engine (values, wrappers, effects, signals,
//!   memos, and watchers)
//! - `scheduler`: the deduplicated job queue that post-flush watchers and
//!   host loops drain
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let reader = count.clone();
//! let doubled = Memo::new(move || {
//!     reader.get().as_int().unwrap_or(0) * 2
//! });
//!
//! // Create an effect
//! let (c, d) = (count.clone(), doubled.clone());
//! effect(move || {
//!     println!("Count: {}, Doubled: {}", c.get(), d.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod reactive;
pub mod scheduler;
