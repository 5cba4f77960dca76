//! Watcher Implementation
//!
//! A watcher runs a getter over reactive state and delivers `(new, old)`
//! pairs to a callback when the getter's result changes. It is the bridge
//! from the tracking engine to imperative code that wants to observe state
//! without recomputing anything eagerly.
//!
//! # How Watchers Work
//!
//! 1. Setup runs the getter once inside a tracking frame. That primes the
//!    remembered value and subscribes the watcher to everything the getter
//!    read. The callback is not invoked unless `immediate` is set, in which
//!    case it fires with the initial value and no previous one.
//!
//! 2. When a dependency changes, the watcher re-runs the getter (collecting
//!    fresh dependencies) and compares the result with the remembered value
//!    under same-value-zero. An unchanged result delivers nothing, so
//!    writes that cancel out in the getter are invisible to the callback.
//!
//! 3. On a change, the callback receives the new value and the previously
//!    delivered one, and the new value becomes the remembered one.
//!
//! # Flush Timing
//!
//! `FlushMode::Sync` delivers inside the write that caused the change.
//! `FlushMode::Post` enqueues one job on the [`crate::scheduler`] queue
//! instead; however many writes land before the flush, the callback runs
//! once with the final value. A callback that writes back to its own source
//! is dropped while it is running, so sync watchers cannot feed themselves
//! forever.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::scheduler::{queue_job, Job};

use super::effect::{effect_with, EffectHandle, EffectOptions, SchedulerFn};
use super::memo::Memo;
use super::signal::Signal;
use super::value::Value;

/// When a watcher delivers relative to the write that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Deliver inside the trigger, before the write call returns.
    #[default]
    Sync,
    /// Enqueue a deduplicated job; deliver when the scheduler flushes.
    Post,
}

/// Options accepted by [`watch`] and [`watch_fn`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire the callback once at setup, with no previous value.
    pub immediate: bool,
    /// When to deliver changes.
    pub flush: FlushMode,
}

impl WatchOptions {
    /// Options with `immediate` set.
    pub fn immediate() -> Self {
        WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        }
    }

    /// Options with post flush timing.
    pub fn post() -> Self {
        WatchOptions {
            flush: FlushMode::Post,
            ..WatchOptions::default()
        }
    }
}

/// Something a watcher can read a value from.
///
/// Implemented by [`Signal`] and [`Memo`] (owned or borrowed); arbitrary
/// getters go through [`watch_fn`].
pub trait WatchSource {
    fn into_getter(self) -> Box<dyn FnMut() -> Value>;
}

impl WatchSource for Signal {
    fn into_getter(self) -> Box<dyn FnMut() -> Value> {
        Box::new(move || self.get())
    }
}

impl WatchSource for &Signal {
    fn into_getter(self) -> Box<dyn FnMut() -> Value> {
        self.clone().into_getter()
    }
}

impl WatchSource for Memo {
    fn into_getter(self) -> Box<dyn FnMut() -> Value> {
        Box::new(move || self.get())
    }
}

impl WatchSource for &Memo {
    fn into_getter(self) -> Box<dyn FnMut() -> Value> {
        self.clone().into_getter()
    }
}

struct WatchState {
    /// The last value delivered to (or primed for) the callback.
    previous: RefCell<Value>,
    callback: RefCell<Box<dyn FnMut(Value, Option<Value>)>>,
    /// The stable job queued for post-flush delivery, created on first use.
    job: RefCell<Option<Job>>,
    /// Guards the callback against re-entry from its own writes.
    running: Cell<bool>,
}

/// Clears the running flag when delivery ends, however it ends.
struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn run_watch_job(state: &Rc<WatchState>, runner: &EffectHandle) {
    if runner.is_disposed() || state.running.get() {
        return;
    }
    let new = runner.run();
    let old = state.previous.borrow().clone();
    if new.same_value(&old) {
        return;
    }
    *state.previous.borrow_mut() = new.clone();

    state.running.set(true);
    let _guard = DeliveryGuard(&state.running);
    (state.callback.borrow_mut())(new, Some(old));
}

/// Watch a [`Signal`] or [`Memo`] and deliver its changes to `callback`.
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    C: FnMut(Value, Option<Value>) + 'static,
{
    watch_fn(source.into_getter(), callback, options)
}

/// Watch an arbitrary getter over reactive state.
///
/// The getter is re-run on every delivery attempt, so it re-collects its
/// dependencies each time. Reading several sources in one getter is the way
/// to watch them jointly.
pub fn watch_fn<F, V, C>(getter: F, callback: C, options: WatchOptions) -> WatchHandle
where
    F: FnMut() -> V + 'static,
    V: Into<Value>,
    C: FnMut(Value, Option<Value>) + 'static,
{
    let state = Rc::new(WatchState {
        previous: RefCell::new(Value::Null),
        callback: RefCell::new(Box::new(callback)),
        job: RefCell::new(None),
        running: Cell::new(false),
    });

    let flush = options.flush;
    let job_state = state.clone();
    let scheduler: SchedulerFn = Rc::new(move |runner: &EffectHandle| match flush {
        FlushMode::Sync => run_watch_job(&job_state, runner),
        FlushMode::Post => {
            let job = {
                let mut slot = job_state.job.borrow_mut();
                slot.get_or_insert_with(|| {
                    let state = job_state.clone();
                    let runner = runner.clone();
                    Job::new(move || run_watch_job(&state, &runner))
                })
                .clone()
            };
            queue_job(job);
        }
    });

    let runner = effect_with(
        getter,
        EffectOptions {
            lazy: true,
            scheduler: Some(scheduler),
        },
    );

    let initial = runner.run();
    *state.previous.borrow_mut() = initial.clone();
    if options.immediate {
        (state.callback.borrow_mut())(initial, None);
    }

    WatchHandle { runner, state }
}

/// Handle to a running watcher. Clones control the same watcher.
#[derive(Clone)]
pub struct WatchHandle {
    runner: EffectHandle,
    state: Rc<WatchState>,
}

impl WatchHandle {
    /// Tear the watcher down.
    ///
    /// Disposes the underlying effect, so nothing re-subscribes and pending
    /// queued deliveries become no-ops. Stopping twice is harmless.
    pub fn stop(&self) {
        self.runner.dispose();
        self.state.job.borrow_mut().take();
    }

    /// Whether the watcher has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.runner.is_disposed()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.runner.id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{flush_jobs, queued_job_count};

    type PairLog = Rc<RefCell<Vec<(Value, Option<Value>)>>>;

    fn recording_callback(log: &PairLog) -> impl FnMut(Value, Option<Value>) {
        let log = log.clone();
        move |new, old| log.borrow_mut().push((new, old))
    }

    #[test]
    fn watch_stays_quiet_until_a_change() {
        let source = Signal::new(0);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let _handle = watch(&source, recording_callback(&log), WatchOptions::default());
        assert!(log.borrow().is_empty());

        source.set(1);
        assert_eq!(&*log.borrow(), &[(Value::Int(1), Some(Value::Int(0)))]);

        // An equal write delivers nothing.
        source.set(1);
        assert_eq!(log.borrow().len(), 1);

        source.set(2);
        assert_eq!(log.borrow().last(), Some(&(Value::Int(2), Some(Value::Int(1)))));
    }

    #[test]
    fn watch_immediate_fires_with_no_previous() {
        let source = Signal::new(5);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let _handle = watch(&source, recording_callback(&log), WatchOptions::immediate());
        assert_eq!(&*log.borrow(), &[(Value::Int(5), None)]);

        source.set(6);
        assert_eq!(log.borrow().last(), Some(&(Value::Int(6), Some(Value::Int(5)))));
    }

    #[test]
    fn watch_fn_sees_only_net_changes_of_the_getter() {
        let source = Signal::new(2);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let reader = source.clone();
        let _handle = watch_fn(
            move || Value::Int(reader.get().as_int().unwrap_or(0) % 2),
            recording_callback(&log),
            WatchOptions::default(),
        );

        // 2 -> 4 leaves the parity getter at 0.
        source.set(4);
        assert!(log.borrow().is_empty());

        source.set(3);
        assert_eq!(&*log.borrow(), &[(Value::Int(1), Some(Value::Int(0)))]);
    }

    #[test]
    fn watch_fn_combines_sources() {
        let a = Signal::new(1);
        let b = Signal::new(10);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let (ra, rb) = (a.clone(), b.clone());
        let _handle = watch_fn(
            move || {
                Value::Int(ra.get().as_int().unwrap_or(0) + rb.get().as_int().unwrap_or(0))
            },
            recording_callback(&log),
            WatchOptions::default(),
        );

        a.set(2);
        assert_eq!(log.borrow().last(), Some(&(Value::Int(12), Some(Value::Int(11)))));

        b.set(20);
        assert_eq!(log.borrow().last(), Some(&(Value::Int(22), Some(Value::Int(12)))));
    }

    #[test]
    fn watch_follows_a_memo() {
        let source = Signal::new(3);
        let reader = source.clone();
        let squared = Memo::new(move || {
            let n = reader.get().as_int().unwrap_or(0);
            Value::Int(n * n)
        });

        let log: PairLog = Rc::new(RefCell::new(Vec::new()));
        let _handle = watch(&squared, recording_callback(&log), WatchOptions::default());

        source.set(4);
        assert_eq!(&*log.borrow(), &[(Value::Int(16), Some(Value::Int(9)))]);
    }

    #[test]
    fn post_flush_delivers_once_with_the_final_value() {
        let source = Signal::new(0);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let _handle = watch(&source, recording_callback(&log), WatchOptions::post());

        source.set(1);
        source.set(2);
        source.set(3);

        // Nothing delivered yet; one job queued for the whole burst.
        assert!(log.borrow().is_empty());
        assert_eq!(queued_job_count(), 1);

        flush_jobs();
        assert_eq!(&*log.borrow(), &[(Value::Int(3), Some(Value::Int(0)))]);

        // A flush with no new writes delivers nothing further.
        flush_jobs();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn post_flush_skips_writes_that_cancel_out() {
        let source = Signal::new(7);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let _handle = watch(&source, recording_callback(&log), WatchOptions::post());

        source.set(8);
        source.set(7);
        flush_jobs();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn stop_halts_delivery() {
        let source = Signal::new(0);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let handle = watch(&source, recording_callback(&log), WatchOptions::default());
        source.set(1);
        assert_eq!(log.borrow().len(), 1);

        handle.stop();
        assert!(handle.is_stopped());
        source.set(2);
        assert_eq!(log.borrow().len(), 1);

        handle.stop();
    }

    #[test]
    fn stop_voids_already_queued_deliveries() {
        let source = Signal::new(0);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let handle = watch(&source, recording_callback(&log), WatchOptions::post());
        source.set(1);
        assert_eq!(queued_job_count(), 1);

        handle.stop();
        flush_jobs();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn callback_writes_back_without_looping() {
        let source = Signal::new(0);
        let log: PairLog = Rc::new(RefCell::new(Vec::new()));

        let writer = source.clone();
        let log_inner = log.clone();
        let _handle = watch(
            &source,
            move |new, old| {
                log_inner.borrow_mut().push((new.clone(), old));
                // Writing the watched source from its own callback must not
                // re-enter the delivery.
                writer.set(Value::Int(new.as_int().unwrap_or(0) + 1));
            },
            WatchOptions::default(),
        );

        source.set(1);
        assert_eq!(&*log.borrow(), &[(Value::Int(1), Some(Value::Int(0)))]);
        assert_eq!(source.get_untracked(), Value::Int(2));
    }
}
