//! Discrete-event scheduler and drain loop.
//!
//! `Scheduler` is a cheap, cloneable handle (single-threaded `Rc`) so that
//! callbacks and task computations can capture it and schedule follow-up
//! work. It exclusively owns the [`VirtualClock`] and the [`EventQueue`];
//! everything else reads time through [`Scheduler::now`] or a
//! [`ClockReader`] and submits work through the schedule primitives.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::rc::{Rc, Weak};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::core::clock::{ClockReader, VirtualClock};
use crate::core::event::{Callback, EventHandle, EventId};
use crate::core::event_queue::EventQueue;
use crate::core::task::{TaskId, TaskTable};
use crate::core::trace::{EventOutcome, ExecutionTrace, TraceRecord};
use crate::core::{AppResult, SchedulerError};

/// Counters describing one or more drain passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Events whose callback was invoked (successfully or not).
    pub events_executed: u64,
    /// Cancelled events discarded when popped.
    pub events_cancelled: u64,
    /// Callbacks that returned an error or panicked.
    pub callback_failures: u64,
    /// Virtual time when the pass ended.
    pub final_time: f64,
}

impl RunStats {
    fn absorb(&mut self, other: &Self) {
        self.events_executed += other.events_executed;
        self.events_cancelled += other.events_cancelled;
        self.callback_failures += other.callback_failures;
        self.final_time = other.final_time;
    }
}

/// Context handed to the failure handler when a callback fails.
#[derive(Debug)]
pub struct CallbackFailure {
    /// Event whose callback failed.
    pub event: EventId,
    /// Virtual time of the failure.
    pub time: f64,
    /// Where the event was scheduled.
    pub origin: &'static Location<'static>,
    /// The error returned, or a synthesized one for a panic.
    pub error: anyhow::Error,
}

impl CallbackFailure {
    /// Flatten into the error taxonomy.
    #[must_use]
    pub fn to_error(&self) -> SchedulerError {
        SchedulerError::UncaughtCallbackFailure {
            event: self.event,
            time: self.time,
            message: format!("{:#}", self.error),
        }
    }
}

type FailureHandler = dyn Fn(&CallbackFailure) -> AppResult<()>;

/// Default failure reporter: one `error!` line with the full context.
pub fn log_callback_failure(failure: &CallbackFailure) {
    tracing::error!(
        event = %failure.event,
        time = failure.time,
        origin = %failure.origin,
        "uncaught callback failure: {:#}\n{:?}",
        failure.error,
        failure.error
    );
}

pub(crate) struct Shared {
    clock: VirtualClock,
    queue: RefCell<EventQueue>,
    pub(crate) tasks: RefCell<TaskTable>,
    pub(crate) current_task: Cell<Option<TaskId>>,
    pub(crate) resumption_registered: Cell<bool>,
    running: Cell<bool>,
    totals: Cell<RunStats>,
    trace: RefCell<Option<ExecutionTrace>>,
    failure_handler: RefCell<Option<Rc<FailureHandler>>>,
    rng: RefCell<StdRng>,
}

/// Handle onto a single-threaded discrete-event scheduler.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) shared: Rc<Shared>,
}

/// Non-owning scheduler handle held by internal resumption callbacks.
#[derive(Clone)]
pub(crate) struct WeakScheduler(Weak<Shared>);

impl WeakScheduler {
    pub(crate) fn upgrade(&self) -> Option<Scheduler> {
        self.0.upgrade().map(|shared| Scheduler { shared })
    }
}

struct RunGuard<'a> {
    running: &'a Cell<bool>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.set(false);
    }
}

fn validate_time(t: f64) -> Result<(), SchedulerError> {
    if t.is_finite() {
        Ok(())
    } else {
        Err(SchedulerError::InvalidTime(t))
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn invoke_isolated(callback: Callback) -> AppResult<()> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "callback panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

impl Scheduler {
    /// Create a scheduler with the clock at 0 and the RNG seeded with 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a scheduler whose RNG is seeded with `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            shared: Rc::new(Shared {
                clock: VirtualClock::new(),
                queue: RefCell::new(EventQueue::new()),
                tasks: RefCell::new(TaskTable::default()),
                current_task: Cell::new(None),
                resumption_registered: Cell::new(false),
                running: Cell::new(false),
                totals: Cell::new(RunStats::default()),
                trace: RefCell::new(None),
                failure_handler: RefCell::new(None),
                rng: RefCell::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakScheduler {
        WeakScheduler(Rc::downgrade(&self.shared))
    }

    /// Present virtual time in seconds.
    #[inline]
    #[must_use]
    pub fn now(&self) -> f64 {
        self.shared.clock.current()
    }

    /// Read-only clock view, e.g. for log formatting.
    #[must_use]
    pub fn clock(&self) -> ClockReader {
        self.shared.clock.reader()
    }

    /// Schedule `callback` at absolute virtual time `time`.
    ///
    /// # Errors
    /// [`SchedulerError::PastScheduling`] if `time` is before now,
    /// [`SchedulerError::InvalidTime`] if it is not finite.
    #[track_caller]
    pub fn schedule_at<F>(&self, time: f64, callback: F) -> Result<EventHandle, SchedulerError>
    where
        F: FnOnce() -> AppResult<()> + 'static,
    {
        self.schedule_at_origin(time, Box::new(callback), Location::caller())
    }

    /// Schedule `callback` `delay` seconds from now.
    ///
    /// # Errors
    /// [`SchedulerError::NegativeDelay`] for a negative delay,
    /// [`SchedulerError::InvalidTime`] for a non-finite one.
    #[track_caller]
    pub fn schedule_after<F>(&self, delay: f64, callback: F) -> Result<EventHandle, SchedulerError>
    where
        F: FnOnce() -> AppResult<()> + 'static,
    {
        self.schedule_after_origin(delay, Box::new(callback), Location::caller())
    }

    /// Schedule `callback` at the current instant, behind everything
    /// already queued for it.
    ///
    /// # Errors
    /// Never fails in practice; shares the signature of the other primitives.
    #[track_caller]
    pub fn schedule_now<F>(&self, callback: F) -> Result<EventHandle, SchedulerError>
    where
        F: FnOnce() -> AppResult<()> + 'static,
    {
        self.schedule_after_origin(0.0, Box::new(callback), Location::caller())
    }

    pub(crate) fn schedule_at_origin(
        &self,
        time: f64,
        callback: Callback,
        origin: &'static Location<'static>,
    ) -> Result<EventHandle, SchedulerError> {
        validate_time(time)?;
        let current = self.now();
        if time < current {
            return Err(SchedulerError::PastScheduling {
                requested: time,
                current,
            });
        }
        let handle = self
            .shared
            .queue
            .borrow_mut()
            .add_with_origin(time, callback, origin);
        tracing::trace!(event = %handle.id(), time, %origin, "scheduled event");
        Ok(handle)
    }

    pub(crate) fn schedule_after_origin(
        &self,
        delay: f64,
        callback: Callback,
        origin: &'static Location<'static>,
    ) -> Result<EventHandle, SchedulerError> {
        validate_time(delay)?;
        if delay < 0.0 {
            return Err(SchedulerError::NegativeDelay(delay));
        }
        self.schedule_at_origin(self.now() + delay, callback, origin)
    }

    /// Queue an internal callback at the current instant. Infallible: the
    /// clock value is always a valid, non-past time.
    pub(crate) fn enqueue_now(
        &self,
        callback: Callback,
        origin: &'static Location<'static>,
    ) -> EventHandle {
        let time = self.now();
        let handle = self
            .shared
            .queue
            .borrow_mut()
            .add_with_origin(time, callback, origin);
        tracing::trace!(event = %handle.id(), time, %origin, "queued resumption");
        handle
    }

    /// Cancel a scheduled event. Returns `true` if it was still pending.
    pub fn cancel(&self, handle: &EventHandle) -> bool {
        self.shared.queue.borrow_mut().cancel(handle)
    }

    /// Queued entries, cancelled-but-unpopped ones included.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.shared.queue.borrow().len()
    }

    /// Whether the queue is empty (the simulation is quiescent).
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared.queue.borrow().is_empty()
    }

    /// Eagerly discard cancelled entries. Returns how many were dropped.
    pub fn purge_cancelled(&self) -> usize {
        let removed = self.shared.queue.borrow_mut().purge_cancelled();
        if removed > 0 {
            tracing::debug!(removed, "purged cancelled events");
        }
        removed
    }

    /// Lifetime totals across every drain pass.
    #[must_use]
    pub fn stats(&self) -> RunStats {
        self.shared.totals.get()
    }

    /// Replace the reporter invoked for failing callbacks.
    ///
    /// If the handler itself errors or panics, a minimal line is logged
    /// instead and the run continues.
    pub fn set_failure_handler<F>(&self, handler: F)
    where
        F: Fn(&CallbackFailure) -> AppResult<()> + 'static,
    {
        *self.shared.failure_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Restore the default failure reporter.
    pub fn clear_failure_handler(&self) {
        self.shared.failure_handler.borrow_mut().take();
    }

    /// Start recording fired events, keeping at most `capacity` records.
    pub fn enable_trace(&self, capacity: usize) {
        *self.shared.trace.borrow_mut() = Some(ExecutionTrace::new(capacity));
    }

    /// Snapshot of the execution trace, empty if tracing is disabled.
    #[must_use]
    pub fn trace(&self) -> Vec<TraceRecord> {
        self.shared
            .trace
            .borrow()
            .as_ref()
            .map(ExecutionTrace::records)
            .unwrap_or_default()
    }

    /// Execution trace serialized as JSON.
    ///
    /// # Errors
    /// [`SchedulerError::Serialization`] if encoding fails.
    pub fn trace_json(&self) -> Result<String, SchedulerError> {
        serde_json::to_string(&self.trace())
            .map_err(|e| SchedulerError::Serialization(e.to_string()))
    }

    /// Run `f` with the simulation's seeded RNG.
    ///
    /// # Panics
    /// Panics if called re-entrantly from inside `f`.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.shared.rng.borrow_mut())
    }

    fn enter(&self) -> Result<RunGuard<'_>, SchedulerError> {
        if self.shared.running.replace(true) {
            return Err(SchedulerError::AlreadyRunning);
        }
        Ok(RunGuard {
            running: &self.shared.running,
        })
    }

    /// Drain the queue until it is empty.
    ///
    /// Callback failures are reported and skipped; only a clock regression
    /// aborts the run.
    ///
    /// # Errors
    /// [`SchedulerError::MonotonicityViolation`] on an ordering bug,
    /// [`SchedulerError::AlreadyRunning`] when called from a callback.
    pub fn run(&self) -> Result<RunStats, SchedulerError> {
        let _guard = self.enter()?;
        let mut stats = RunStats::default();
        if !self.is_idle() {
            tracing::info!(pending = self.pending_events(), "simulation run started");
        }
        while self.fire_next(&mut stats)? {}
        let stats = self.finish(stats);
        tracing::info!(
            executed = stats.events_executed,
            cancelled = stats.events_cancelled,
            failures = stats.callback_failures,
            "simulation reached quiescence"
        );
        Ok(stats)
    }

    /// Fire exactly one event, if any. Returns whether an event was popped.
    ///
    /// # Errors
    /// Same as [`Scheduler::run`].
    pub fn step(&self) -> Result<bool, SchedulerError> {
        let _guard = self.enter()?;
        let mut stats = RunStats::default();
        let fired = self.fire_next(&mut stats)?;
        self.finish(stats);
        Ok(fired)
    }

    /// Fire every event scheduled at or before `limit`, then park the clock
    /// at `limit`.
    ///
    /// # Errors
    /// [`SchedulerError::PastScheduling`] if `limit` is before now, plus the
    /// errors of [`Scheduler::run`].
    pub fn run_until(&self, limit: f64) -> Result<RunStats, SchedulerError> {
        validate_time(limit)?;
        let current = self.now();
        if limit < current {
            return Err(SchedulerError::PastScheduling {
                requested: limit,
                current,
            });
        }
        let _guard = self.enter()?;
        let mut stats = RunStats::default();
        loop {
            let next = self.shared.queue.borrow().peek_time();
            match next {
                Some(t) if t <= limit => {
                    self.fire_next(&mut stats)?;
                }
                _ => break,
            }
        }
        self.shared.clock.advance_to(limit)?;
        Ok(self.finish(stats))
    }

    fn finish(&self, mut stats: RunStats) -> RunStats {
        stats.final_time = self.now();
        let mut totals = self.shared.totals.get();
        totals.absorb(&stats);
        self.shared.totals.set(totals);
        stats
    }

    fn fire_next(&self, stats: &mut RunStats) -> Result<bool, SchedulerError> {
        let popped = self.shared.queue.borrow_mut().pop_next();
        let event = match popped {
            Ok(event) => event,
            Err(SchedulerError::EmptyQueue) => return Ok(false),
            Err(e) => return Err(e),
        };
        let (id, time, origin) = (event.id(), event.time(), event.origin());

        if let Err(err) = self.shared.clock.advance_to(time) {
            tracing::error!(event = %id, %origin, "aborting run: {err}");
            return Err(err);
        }

        let Some(callback) = event.into_callback() else {
            stats.events_cancelled += 1;
            tracing::trace!(event = %id, "discarding cancelled event");
            self.record_trace(id, time, origin, EventOutcome::Cancelled);
            return Ok(true);
        };

        tracing::debug!(event = %id, %origin, "executing event");
        stats.events_executed += 1;
        match invoke_isolated(callback) {
            Ok(()) => self.record_trace(id, time, origin, EventOutcome::Executed),
            Err(error) => {
                stats.callback_failures += 1;
                self.record_trace(id, time, origin, EventOutcome::Failed);
                self.report_failure(&CallbackFailure {
                    event: id,
                    time,
                    origin,
                    error,
                });
            }
        }
        Ok(true)
    }

    fn record_trace(
        &self,
        event: EventId,
        time: f64,
        origin: &'static Location<'static>,
        outcome: EventOutcome,
    ) {
        if let Some(trace) = self.shared.trace.borrow_mut().as_mut() {
            trace.record(TraceRecord::new(event, time, origin, outcome));
        }
    }

    fn report_failure(&self, failure: &CallbackFailure) {
        let handler = self.shared.failure_handler.borrow().clone();
        let Some(handler) = handler else {
            log_callback_failure(failure);
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| handler(failure))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(
                "failure handler errored ({err}) while reporting {}: {}",
                failure.event,
                failure.error
            ),
            Err(_) => tracing::error!(
                "failure handler panicked while reporting {}",
                failure.event
            ),
        }
    }

    /// Drop every pending event and abandon suspended tasks.
    ///
    /// Breaks the reference cycles between the scheduler and the callbacks
    /// or task computations that captured it. Returns the number of tasks
    /// abandoned.
    pub fn shutdown(&self) -> usize {
        let events = self.shared.queue.borrow_mut().drain_ordered();
        let abandoned = self.shared.tasks.borrow_mut().abandon_unfinished();
        let count = abandoned.len();
        if count > 0 || !events.is_empty() {
            tracing::warn!(
                events = events.len(),
                tasks = count,
                "shutdown dropped pending work"
            );
        }
        // Dropped outside the borrows: futures may own join handles whose
        // destructors touch the task table.
        drop(events);
        drop(abandoned);
        count
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("pending_events", &self.shared.queue.try_borrow().map(|q| q.len()).ok())
            .field("running", &self.shared.running.get())
            .finish_non_exhaustive()
    }
}
