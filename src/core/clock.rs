//! Virtual clock owned by the scheduler.
//!
//! Time is a floating-point count of seconds. The value lives in an
//! `AtomicU64` holding the `f64` bit pattern so read-only views can be handed
//! to other threads (the log formatter runs wherever `tracing` calls it)
//! while the scheduler stays the single writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::SchedulerError;
use crate::util::format::format_hms;

/// The scheduler's logical clock.
///
/// Not `Clone`: exactly one owner may advance it. Readers obtain a
/// [`ClockReader`] via [`VirtualClock::reader`].
#[derive(Debug)]
pub struct VirtualClock {
    now: Arc<AtomicU64>,
}

impl VirtualClock {
    /// Create a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        }
    }

    /// Present virtual time in seconds.
    #[inline]
    #[must_use]
    pub fn current(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::Acquire))
    }

    /// Move the clock to `t`.
    ///
    /// # Errors
    /// [`SchedulerError::MonotonicityViolation`] if `t` is earlier than the
    /// current value, [`SchedulerError::InvalidTime`] if `t` is not finite.
    pub fn advance_to(&self, t: f64) -> Result<(), SchedulerError> {
        if !t.is_finite() {
            return Err(SchedulerError::InvalidTime(t));
        }
        let current = self.current();
        if t < current {
            return Err(SchedulerError::MonotonicityViolation {
                current,
                requested: t,
            });
        }
        self.now.store(t.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Read-only view sharing this clock's storage.
    #[must_use]
    pub fn reader(&self) -> ClockReader {
        ClockReader {
            now: Arc::clone(&self.now),
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, thread-safe, read-only handle onto a [`VirtualClock`].
#[derive(Debug, Clone)]
pub struct ClockReader {
    now: Arc<AtomicU64>,
}

impl ClockReader {
    /// Present virtual time in seconds.
    #[inline]
    #[must_use]
    pub fn current(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::Acquire))
    }

    /// Present virtual time rendered as `HH:MM:SS.mmm`.
    #[must_use]
    pub fn formatted(&self) -> String {
        format_hms(self.current())
    }
}
