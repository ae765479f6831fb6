//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::event::EventId;
use crate::core::task::TaskId;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The clock was asked to move backwards. Fatal: aborts the run.
    #[error("monotonicity violation: clock at {current}s, requested {requested}s")]
    MonotonicityViolation {
        /// Clock value when the regression was attempted.
        current: f64,
        /// Time the clock was asked to move to.
        requested: f64,
    },
    /// An event was scheduled strictly before the current virtual time.
    #[error("cannot schedule at {requested}s: current time is {current}s")]
    PastScheduling {
        /// Requested absolute time.
        requested: f64,
        /// Virtual time at the moment of the request.
        current: f64,
    },
    /// A relative delay was negative.
    #[error("negative delay: {0}s")]
    NegativeDelay(f64),
    /// A timestamp or delay was NaN or infinite.
    #[error("invalid virtual time: {0}")]
    InvalidTime(f64),
    /// The event queue holds no more entries.
    #[error("event queue is empty")]
    EmptyQueue,
    /// A task suspended without registering a virtual-time resumption.
    #[error("task {0} suspended on something that is not a virtual-time event")]
    UnsupportedSuspension(TaskId),
    /// A completed or failed task was asked to resume.
    #[error("task {0} has already finished")]
    TaskAlreadyFinished(TaskId),
    /// A task was resumed while it was already running.
    #[error("task {0} is already running")]
    TaskBusy(TaskId),
    /// No task with this id is known to the scheduler.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    /// A task ended in the failed state.
    #[error("task {task} failed: {reason}")]
    TaskFailed {
        /// The failed task.
        task: TaskId,
        /// Rendered failure cause.
        reason: String,
    },
    /// The queue drained while the task was still suspended.
    #[error("task {0} never completed: simulation reached quiescence while it was suspended")]
    TaskStalled(TaskId),
    /// A suspension primitive was polled outside of any task.
    #[error("suspension primitive polled outside of a scheduled task")]
    NoCurrentTask,
    /// A task tried to await its own completion.
    #[error("task {0} cannot await itself")]
    SelfAwait(TaskId),
    /// A `timeout` deadline fired before the guarded computation finished.
    #[error("timed out after {0}s of virtual time")]
    Timeout(f64),
    /// A callback returned an error or panicked during `run()`.
    #[error("uncaught failure in event {event} at {time}s: {message}")]
    UncaughtCallbackFailure {
        /// Event whose callback failed.
        event: EventId,
        /// Virtual time of the failure.
        time: f64,
        /// Rendered error chain.
        message: String,
    },
    /// `run()` was invoked while a drain loop was already active.
    #[error("scheduler is already running")]
    AlreadyRunning,
    /// Configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Trace export failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SchedulerError {
    /// Whether this error must abort the whole run rather than a single event.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MonotonicityViolation { .. })
    }
}

/// Application-facing result used by callbacks and task computations.
pub type AppResult<T> = Result<T, anyhow::Error>;
