//! Bounded execution trace of fired events.
//!
//! Each popped event leaves one record: its id, virtual time, where it was
//! scheduled, and what happened to it. Two runs of the same deterministic
//! simulation produce identical traces, which makes the JSON export a
//! convenient replay fingerprint.

use std::collections::VecDeque;
use std::panic::Location;

use serde::{Deserialize, Serialize};

use crate::core::event::EventId;

/// What the drain loop did with a popped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// Callback ran and returned `Ok`.
    Executed,
    /// Event had been cancelled; discarded without running.
    Cancelled,
    /// Callback returned an error or panicked.
    Failed,
}

/// One entry of the execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Event sequence number.
    pub event: EventId,
    /// Virtual time the event fired at.
    pub time: f64,
    /// `file:line:column` of the schedule call.
    pub origin: String,
    /// Outcome.
    pub outcome: EventOutcome,
}

impl TraceRecord {
    /// Build a record from drain-loop context.
    #[must_use]
    pub fn new(
        event: EventId,
        time: f64,
        origin: &'static Location<'static>,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            event,
            time,
            origin: origin.to_string(),
            outcome,
        }
    }
}

/// Ring buffer of trace records; the oldest is evicted when full.
#[derive(Debug)]
pub struct ExecutionTrace {
    records: VecDeque<TraceRecord>,
    max_records: usize,
}

impl ExecutionTrace {
    /// Create a trace keeping at most `max_records` entries.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_records.min(1024)),
            max_records,
        }
    }

    /// Append a record, evicting the oldest one if the buffer is full.
    pub fn record(&mut self, record: TraceRecord) {
        if self.max_records == 0 {
            return;
        }
        if self.records.len() >= self.max_records {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Snapshot of stored records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.iter().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
