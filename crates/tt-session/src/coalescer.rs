//! Debounced refresh scheduling
//!
//! [`UpdateCoalescer`] turns a stream of "something changed" signals into at
//! most one refresh per interval. It knows nothing about connections or
//! consoles: the owner supplies a refresh callback and a [`Dispatcher`] that
//! decides where the callback runs (inline on the timer task, or on a UI
//! loop that drains a channel).
//!
//! # Scheduling
//!
//! - `mark_dirty` sets a flag and, if no refresh is in flight, spawns a
//!   timer task that waits one interval and dispatches the refresh.
//! - The refresh clears the dirty flag before running, so anything marked
//!   while it runs schedules exactly one follow-up.
//! - While paused, marks accumulate but nothing is dispatched; resuming
//!   schedules one refresh if anything is dirty.
//! - After [`cancel`](UpdateCoalescer::cancel) or drop, pending timers exit
//!   and already-dispatched jobs become no-ops.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default debounce interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// A refresh handed to a [`Dispatcher`]
pub type RefreshJob = Box<dyn FnOnce() + Send + 'static>;

/// Execution context for refresh callbacks
pub trait Dispatcher: Send + Sync + 'static {
    /// Run `job` on this context. Must not block the caller.
    fn dispatch(&self, job: RefreshJob);
}

/// Runs refreshes directly on the coalescer's timer task
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: RefreshJob) {
        job();
    }
}

/// Sends refreshes to a receiver owned by a UI loop
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<RefreshJob>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiver the UI loop should drain
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RefreshJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, job: RefreshJob) {
        if self.tx.send(job).is_err() {
            tracing::trace!("Refresh receiver gone, dropping refresh");
        }
    }
}

struct Shared {
    interval: Duration,
    dirty: AtomicBool,
    in_flight: AtomicBool,
    paused: AtomicBool,
    cancel: CancellationToken,
    refresh: Box<dyn Fn() + Send + Sync>,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Handle,
}

/// Debounced, at-most-one-in-flight refresh scheduler
pub struct UpdateCoalescer {
    shared: Arc<Shared>,
}

impl UpdateCoalescer {
    /// Create a coalescer.
    ///
    /// Captures the current Tokio runtime for its timer tasks, so it must be
    /// constructed from within one. `mark_dirty` may then be called from any
    /// thread.
    pub fn new<F>(interval: Duration, dispatcher: Arc<dyn Dispatcher>, refresh: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                interval,
                dirty: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                refresh: Box::new(refresh),
                dispatcher,
                runtime: Handle::current(),
            }),
        }
    }

    /// Record that the owner's state changed
    pub fn mark_dirty(&self) {
        self.shared.dirty.store(true, Ordering::Release);
        schedule(&self.shared);
    }

    /// Defer refreshes while paused; resuming refreshes once if dirty
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
        if !paused {
            schedule(&self.shared);
        }
    }

    /// Whether refreshes are currently deferred
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Whether a change is waiting for a refresh
    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire)
    }

    /// Stop scheduling. Pending and dispatched refreshes become no-ops.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// The debounce interval
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}

impl Drop for UpdateCoalescer {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

fn schedule(shared: &Arc<Shared>) {
    if shared.cancel.is_cancelled()
        || shared.paused.load(Ordering::Acquire)
        || !shared.dirty.load(Ordering::Acquire)
    {
        return;
    }

    if shared
        .in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    let task_shared = Arc::clone(shared);
    shared.runtime.spawn(async move {
        tokio::select! {
            _ = task_shared.cancel.cancelled() => return,
            _ = tokio::time::sleep(task_shared.interval) => {}
        }

        let job_shared = Arc::clone(&task_shared);
        task_shared
            .dispatcher
            .dispatch(Box::new(move || run_refresh(&job_shared)));
    });
}

fn run_refresh(shared: &Arc<Shared>) {
    if shared.cancel.is_cancelled() {
        return;
    }

    if shared.paused.load(Ordering::Acquire) {
        shared.in_flight.store(false, Ordering::Release);
        // A resume that raced with this check saw the flag still set
        schedule(shared);
        return;
    }

    shared.dirty.store(false, Ordering::Release);
    if catch_unwind(AssertUnwindSafe(|| (shared.refresh)())).is_err() {
        tracing::error!("Refresh callback panicked");
    }
    shared.in_flight.store(false, Ordering::Release);

    schedule(shared);
}
