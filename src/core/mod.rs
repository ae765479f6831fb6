//! Simulation core: clock, event queue, scheduler and task adapter.

pub mod error;
pub mod clock;
pub mod event;
pub mod event_queue;
pub mod scheduler;
pub mod task;
pub mod trace;
pub mod process;

pub use error::{AppResult, SchedulerError};
pub use clock::{ClockReader, VirtualClock};
pub use event::{Callback, Event, EventHandle, EventId, EventStatus};
pub use event_queue::EventQueue;
pub use scheduler::{log_callback_failure, CallbackFailure, RunStats, Scheduler};
pub use task::{JoinHandle, Sleep, TaskId, TaskState};
pub use trace::{EventOutcome, ExecutionTrace, TraceRecord};
pub use process::Process;
