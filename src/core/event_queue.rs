//! Event queue keyed by `(time, insertion sequence)`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::Location;

use crate::core::event::{Callback, Event, EventHandle, EventId};
use crate::core::SchedulerError;

/// Wrapper reversing event order so the max-heap pops the earliest key.
struct QueuedEvent {
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.id() == other.event.id()
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: smallest (time, sequence) is the heap maximum.
        other.event.key_cmp(&self.event)
    }
}

/// Not-yet-popped events, cancelled ones included until they surface.
///
/// Insertion and extraction are O(log n). Cancellation is lazy and O(1):
/// cancelled entries are discarded when popped or by
/// [`EventQueue::purge_cancelled`].
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert a callback at `time` with a fresh insertion sequence.
    ///
    /// No validation against the clock happens here; the scheduler does it.
    #[track_caller]
    pub fn add(&mut self, time: f64, callback: Callback) -> EventHandle {
        self.add_with_origin(time, callback, Location::caller())
    }

    pub(crate) fn add_with_origin(
        &mut self,
        time: f64,
        callback: Callback,
        origin: &'static Location<'static>,
    ) -> EventHandle {
        // `total_cmp` ranks -0.0 below 0.0; fold both onto 0.0.
        let time = time + 0.0;
        let id = EventId::new(self.next_seq);
        self.next_seq += 1;
        let event = Event::new(id, time, callback, origin);
        let handle = event.handle();
        self.heap.push(QueuedEvent { event });
        handle
    }

    /// Mark the referenced event cancelled. See [`EventHandle::cancel`].
    pub fn cancel(&mut self, handle: &EventHandle) -> bool {
        handle.cancel()
    }

    /// Remove and return the entry with minimal `(time, sequence)`.
    ///
    /// # Errors
    /// [`SchedulerError::EmptyQueue`] when nothing is queued.
    pub fn pop_next(&mut self) -> Result<Event, SchedulerError> {
        self.heap
            .pop()
            .map(|queued| queued.event)
            .ok_or(SchedulerError::EmptyQueue)
    }

    /// Time of the next entry, cancelled or not.
    #[must_use]
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|queued| queued.event.time())
    }

    /// Whether no entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued entries, including cancelled ones not yet discarded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Sequence number the next insertion will receive.
    #[must_use]
    pub const fn next_event_id(&self) -> EventId {
        EventId::new(self.next_seq)
    }

    /// Drop cancelled entries eagerly and return how many were removed.
    pub fn purge_cancelled(&mut self) -> usize {
        let before = self.heap.len();
        self.heap.retain(|queued| !queued.event.is_cancelled());
        before - self.heap.len()
    }

    /// Remove every entry, returning them in firing order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.heap.len());
        while let Some(queued) = self.heap.pop() {
            events.push(queued.event);
        }
        events
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.heap.len())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}
