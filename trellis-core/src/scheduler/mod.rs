//! Job Scheduler
//!
//! The scheduler batches deferred work into a deduplicated queue that a host
//! loop drains at a moment of its choosing. Post-flush watchers put their
//! callbacks here, and a consuming render loop can put its own jobs on the
//! same queue so everything downstream of a burst of writes runs once.
//!
//! # How Flushing Works
//!
//! 1. [`queue_job`] appends a job and arms the pending flag. A job already
//!    in the queue (same [`JobId`]) is not appended again, so enqueueing is
//!    idempotent per flush.
//!
//! 2. [`flush_jobs`] clears the pending flag, snapshots the queue, empties
//!    it, and runs the snapshot in enqueue order. Jobs enqueued while the
//!    flush is running, including by the running jobs themselves, land in
//!    the emptied queue and re-arm the flag for the next flush. One call
//!    never runs a job enqueued after its snapshot.
//!
//! 3. A panicking job is reported and skipped; the rest of the snapshot
//!    still runs.
//!
//! # Driving the Queue
//!
//! Synchronous hosts call [`flush_jobs`] whenever [`flush_pending`] reports
//! work. Async hosts can await [`flush_after_yield`], which yields the
//! current task once so the rest of the turn's synchronous writes finish,
//! then flushes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of a queued job. Dedup in the queue is by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        JobId(JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value, mainly useful for logging.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A unit of deferred work.
///
/// Clones share the same ID, so re-queueing a clone of an already queued
/// job is a no-op. Keep the job value around and queue clones of it to get
/// once-per-flush behavior.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Rc<dyn Fn()>,
}

impl Job {
    /// Create a job with a fresh identity.
    pub fn new(run: impl Fn() + 'static) -> Self {
        Job {
            id: JobId::next(),
            run: Rc::new(run),
        }
    }

    /// The job's identity.
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

thread_local! {
    static QUEUE: RefCell<IndexMap<JobId, Job>> = RefCell::new(IndexMap::new());
    static FLUSH_PENDING: Cell<bool> = Cell::new(false);
}

/// Append a job to the queue and arm the pending flag.
///
/// A job whose ID is already queued is left in its original position.
pub fn queue_job(job: Job) {
    QUEUE.with(|queue| {
        queue.borrow_mut().entry(job.id).or_insert(job);
    });
    FLUSH_PENDING.with(|flag| flag.set(true));
}

/// Whether a flush has been armed since the last [`flush_jobs`].
pub fn flush_pending() -> bool {
    FLUSH_PENDING.with(|flag| flag.get())
}

/// Number of jobs currently queued.
pub fn queued_job_count() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Run every job queued so far, in enqueue order. Returns how many ran.
///
/// The queue is snapshotted and emptied up front: anything enqueued while
/// the snapshot runs waits for the next flush.
pub fn flush_jobs() -> usize {
    FLUSH_PENDING.with(|flag| flag.set(false));
    let jobs: Vec<Job> = QUEUE.with(|queue| {
        queue.borrow_mut().drain(..).map(|(_, job)| job).collect()
    });
    for job in &jobs {
        if catch_unwind(AssertUnwindSafe(|| (job.run)())).is_err() {
            tracing::error!(job = job.id.raw(), "queued job panicked; continuing flush");
        }
    }
    jobs.len()
}

/// Yield the current task once, then flush. Returns how many jobs ran.
///
/// The yield lets the rest of the current turn's synchronous writes land
/// before anything downstream of them runs, which is what makes a burst of
/// writes deliver a single flush.
pub async fn flush_after_yield() -> usize {
    tokio::task::yield_now().await;
    flush_jobs()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
