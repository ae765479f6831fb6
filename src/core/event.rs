//! Scheduled events and their cancellable handles.

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Zero-argument unit of work executed when an event fires.
pub type Callback = Box<dyn FnOnce() -> AppResult<()>>;

/// Insertion sequence number of an event.
///
/// Strictly increasing per scheduler; breaks ties between events scheduled
/// for the same virtual time (first scheduled, first run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw sequence number.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw sequence number.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Lifecycle of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting in the queue.
    Pending,
    /// Cancelled before it was popped; will be discarded.
    Cancelled,
    /// Popped and its callback handed to the scheduler.
    Fired,
}

/// Cancellable reference to a scheduled event.
///
/// Cloning the handle shares the underlying status.
#[derive(Debug, Clone)]
pub struct EventHandle {
    id: EventId,
    time: f64,
    status: Rc<Cell<EventStatus>>,
}

impl EventHandle {
    /// Sequence number of the referenced event.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Virtual time the event is scheduled for.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> EventStatus {
        self.status.get()
    }

    /// Whether the event has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status.get() == EventStatus::Cancelled
    }

    /// Mark the event inert. The entry stays queued until popped.
    ///
    /// Returns `true` if this call cancelled a pending event; `false` if the
    /// event had already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        if self.status.get() == EventStatus::Pending {
            self.status.set(EventStatus::Cancelled);
            true
        } else {
            false
        }
    }
}

/// A timestamped unit of work owned by the event queue.
pub struct Event {
    id: EventId,
    time: f64,
    callback: Callback,
    status: Rc<Cell<EventStatus>>,
    origin: &'static Location<'static>,
}

impl Event {
    pub(crate) fn new(
        id: EventId,
        time: f64,
        callback: Callback,
        origin: &'static Location<'static>,
    ) -> Self {
        Self {
            id,
            time,
            callback,
            status: Rc::new(Cell::new(EventStatus::Pending)),
            origin,
        }
    }

    pub(crate) fn handle(&self) -> EventHandle {
        EventHandle {
            id: self.id,
            time: self.time,
            status: Rc::clone(&self.status),
        }
    }

    /// Insertion sequence number.
    #[must_use]
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Scheduled virtual time.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Source location of the schedule call that created this event.
    #[must_use]
    pub const fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    /// Whether the event was cancelled while queued.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status.get() == EventStatus::Cancelled
    }

    /// Resolve a popped event.
    ///
    /// Returns the callback if the event was still pending, marking it fired
    /// so later cancellations are no-ops. Returns `None` for a cancelled
    /// event, which must then be discarded without running.
    #[must_use]
    pub fn into_callback(self) -> Option<Callback> {
        match self.status.get() {
            EventStatus::Pending => {
                self.status.set(EventStatus::Fired);
                Some(self.callback)
            }
            EventStatus::Cancelled | EventStatus::Fired => None,
        }
    }

    /// Heap key order: earliest time first, then lowest sequence number.
    pub(crate) fn key_cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("time", &self.time)
            .field("status", &self.status.get())
            .field("origin", &format_args!("{}", self.origin))
            .finish_non_exhaustive()
    }
}
