//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when one of its
//! dependencies has changed, and only when somebody reads it.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation inside a tracking
//!    frame and caches the result. Everything the computation read is now a
//!    dependency.
//!
//! 2. When a dependency changes, the memo is only marked dirty. The
//!    computation does not run. Readers of the memo are triggered so they
//!    can come back for the fresh value.
//!
//! 3. On the next access, a dirty memo recomputes once, re-collecting its
//!    dependencies from scratch, and caches the result again.
//!
//! # Why This Matters
//!
//! The lazy approach avoids unnecessary recomputation:
//!
//! - A signal changes ten times between two reads of the memo
//! - The computation runs once, at the next read
//! - A memo that is never read again never recomputes at all
//!
//! Chains of memos stay lazy end to end: invalidating the one at the bottom
//! marks the whole chain dirty, and a read at the top recomputes each link
//! exactly once.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::context;
use super::effect::{effect_with, EffectHandle, EffectOptions};
use super::runtime::{self, DepKey, OpKind};
use super::value::{TargetId, Value};

struct MemoInner {
    /// Unique identifier for this memo, used as its tracking target.
    id: TargetId,

    /// Lazy effect that runs the computation and collects dependencies.
    runner: EffectHandle,

    /// The cached value. Meaningful only while not dirty.
    cache: RefCell<Value>,

    /// Whether the cache is stale. Shared with the runner's scheduler.
    dirty: Rc<Cell<bool>>,

    /// Whether the dependency store may hold entries for this memo.
    tracked: Cell<bool>,
}

impl Drop for MemoInner {
    fn drop(&mut self) {
        self.runner.dispose();
        if self.tracked.get() {
            runtime::reclaim(self.id);
        }
    }
}

/// A lazily cached computation over reactive state.
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct Memo {
    inner: Rc<MemoInner>,
}

impl Memo {
    /// Create a new memo with the given computation.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F, V>(mut compute: F) -> Self
    where
        F: FnMut() -> V + 'static,
        V: Into<Value>,
    {
        let id = TargetId::next();
        let dirty = Rc::new(Cell::new(true));

        // When a dependency changes, mark stale and pass the invalidation
        // on to whoever read this memo. Recomputation waits for the next
        // read. An already-dirty memo stays quiet, so a burst of dependency
        // changes invalidates readers once.
        let dirty_flag = dirty.clone();
        let scheduler = Rc::new(move |_runner: &EffectHandle| {
            if !dirty_flag.get() {
                dirty_flag.set(true);
                runtime::trigger(id, DepKey::Value, OpKind::Set);
            }
        });

        let runner = effect_with(
            move || compute().into(),
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
            },
        );

        Memo {
            inner: Rc::new(MemoInner {
                id,
                runner,
                cache: RefCell::new(Value::Null),
                dirty,
                tracked: Cell::new(false),
            }),
        }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Current value, recomputing first if a dependency has changed.
    ///
    /// Within a running effect this also subscribes the effect to the memo.
    pub fn get(&self) -> Value {
        self.refresh();
        if runtime::track(self.inner.id, DepKey::Value) {
            self.inner.tracked.set(true);
        }
        self.inner.cache.borrow().clone()
    }

    /// Current value without subscribing the running effect.
    ///
    /// A dirty memo still recomputes.
    pub fn get_untracked(&self) -> Value {
        self.refresh();
        self.inner.cache.borrow().clone()
    }

    fn refresh(&self) {
        // A self-referential computation finds itself mid-run; it reads the
        // existing cache rather than recursing.
        if self.inner.dirty.get() && !context::on_stack(self.inner.runner.id()) {
            let value = self.inner.runner.run();
            *self.inner.cache.borrow_mut() = value;
            self.inner.dirty.set(false);
        }
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> usize {
        self.inner.runner.run_count()
    }

    /// Number of dependencies collected by the last computation run.
    pub fn dependency_count(&self) -> usize {
        self.inner.runner.dependency_count()
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("dirty", &self.inner.dirty.get())
            .field("run_count", &self.run_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
