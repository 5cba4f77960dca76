//! Effect Implementation
//!
//! An effect is a computation that re-runs whenever reactive state it read
//! during its last run changes.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its function immediately
//!    to establish initial dependencies.
//!
//! 2. Each run first clears every subscription left over from the previous
//!    run, then executes the body on the tracking stack. Reads performed by
//!    the body subscribe the effect afresh, so dependencies that a branch no
//!    longer reaches stop re-running the effect.
//!
//! 3. When a dependency changes, the effect either re-runs directly or is
//!    handed to its scheduler, which decides when the re-run happens.
//!
//! # Recursion
//!
//! An effect whose body writes to state it also reads must not restart
//! itself mid-run. Two guards enforce this: the trigger path skips the
//! effect at the top of the tracking stack, and `run` refuses to enter an
//! effect that is already anywhere on the stack.
//!
//! # Lazy Effects and Schedulers
//!
//! A lazy effect is created without running; the caller invokes the returned
//! handle when it wants the first run. A scheduler, when present, receives
//! the handle instead of the runtime re-running the effect in place. This
//! pair of options is what computed values and watchers are built from.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::context::{self, StackFrame};
use super::runtime::DepSet;
use super::value::Value;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        EffectId(EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value, mainly useful for logging.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Callback that decides when a triggered effect actually re-runs.
///
/// The runtime hands over the effect's handle; the scheduler may run it
/// immediately, queue it, or drop the notification entirely.
pub type SchedulerFn = Rc<dyn Fn(&EffectHandle)>;

/// Creation options for an effect.
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Create without running. The first run happens when the caller (or a
    /// trigger) invokes the handle.
    pub lazy: bool,
    /// Re-run routing. When set, dependency changes call this instead of
    /// re-running the effect in place. A non-lazy effect's first run is also
    /// routed through it.
    pub scheduler: Option<SchedulerFn>,
}

impl EffectOptions {
    /// Options for a lazy effect with no scheduler.
    pub fn lazy() -> Self {
        EffectOptions {
            lazy: true,
            scheduler: None,
        }
    }

    /// Options with a scheduler attached.
    pub fn scheduled(scheduler: SchedulerFn) -> Self {
        EffectOptions {
            lazy: false,
            scheduler: Some(scheduler),
        }
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("has_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

struct EffectInner {
    id: EffectId,
    func: RefCell<Box<dyn FnMut() -> Value>>,
    scheduler: Option<SchedulerFn>,
    /// Dependency sets this effect currently appears in, kept so a run can
    /// unsubscribe from all of them before re-tracking.
    memberships: RefCell<SmallVec<[DepSet; 4]>>,
    disposed: Cell<bool>,
    runs: Cell<usize>,
}

/// Shared handle to an effect.
///
/// Clones refer to the same effect. The handle is what schedulers receive
/// and what `run`, `dispose`, and the introspection methods hang off.
#[derive(Clone)]
pub struct EffectHandle {
    inner: Rc<EffectInner>,
}

/// Create an effect that runs immediately and re-runs on dependency changes.
///
/// The function's return value is kept as the result of each run and handed
/// back by [`EffectHandle::run`].
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let logger = effect(move || {
///     println!("count is {}", count.get());
/// });
///
/// count.set(5);  // prints: "count is 5"
/// ```
pub fn effect<F, V>(f: F) -> EffectHandle
where
    F: FnMut() -> V + 'static,
    V: Into<Value>,
{
    effect_with(f, EffectOptions::default())
}

/// Create an effect with explicit options.
///
/// Lazy effects do not run here; the caller runs the handle when ready.
/// A non-lazy effect with a scheduler does not run here either: its first
/// run is routed through the scheduler, same as any re-run.
pub fn effect_with<F, V>(mut f: F, options: EffectOptions) -> EffectHandle
where
    F: FnMut() -> V + 'static,
    V: Into<Value>,
{
    let handle = EffectHandle {
        inner: Rc::new(EffectInner {
            id: EffectId::next(),
            func: RefCell::new(Box::new(move || f().into())),
            scheduler: options.scheduler,
            memberships: RefCell::new(SmallVec::new()),
            disposed: Cell::new(false),
            runs: Cell::new(0),
        }),
    };

    if options.lazy {
        return handle;
    }
    match handle.inner.scheduler.clone() {
        Some(schedule) => schedule(&handle),
        None => {
            handle.run();
        }
    }
    handle
}

impl EffectHandle {
    /// Run the effect body, re-collecting its dependencies.
    ///
    /// Returns the body's value. Runs nothing and returns `Null` if the
    /// effect is disposed or already running somewhere on the stack.
    pub fn run(&self) -> Value {
        if self.inner.disposed.get() {
            return Value::Null;
        }
        if context::on_stack(self.inner.id) {
            return Value::Null;
        }

        self.clear_memberships();
        let _frame = StackFrame::enter(self.clone());
        let value = (self.inner.func.borrow_mut())();
        self.inner.runs.set(self.inner.runs.get() + 1);
        value
    }

    /// Unsubscribe from every dependency set collected by the last run.
    fn clear_memberships(&self) {
        let mut memberships = self.inner.memberships.borrow_mut();
        for dep in memberships.drain(..) {
            dep.borrow_mut().shift_remove(&self.inner.id);
        }
    }

    /// Permanently stop the effect and drop all its subscriptions.
    pub fn dispose(&self) {
        if self.inner.disposed.get() {
            return;
        }
        self.clear_memberships();
        self.inner.disposed.set(true);
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Number of dependency sets this effect currently appears in.
    pub fn dependency_count(&self) -> usize {
        self.inner.memberships.borrow().len()
    }

    /// This effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    pub(crate) fn scheduler(&self) -> Option<SchedulerFn> {
        self.inner.scheduler.clone()
    }

    pub(crate) fn add_membership(&self, dep: DepSet) {
        self.inner.memberships.borrow_mut().push(dep);
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
