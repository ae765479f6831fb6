//! Telemetry helpers for structured logging and tracing.
//!
//! Log lines produced while a simulation runs are stamped with the virtual
//! time instead of the wall clock, e.g.
//! `00:01:30.000  INFO prometheus_des::core::scheduler: simulation run started`.

use std::fmt;

use tracing::Subscriber;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::core::{ClockReader, SchedulerError};

/// `tracing-subscriber` timer printing the virtual clock as `HH:MM:SS.mmm`.
#[derive(Debug, Clone)]
pub struct VirtualTimer {
    clock: ClockReader,
}

impl VirtualTimer {
    /// Timer reading `clock`.
    #[must_use]
    pub const fn new(clock: ClockReader) -> Self {
        Self { clock }
    }
}

impl FormatTime for VirtualTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", self.clock.formatted())
    }
}

/// Parse a filter directive string such as `"debug"` or
/// `"prometheus_des=trace,warn"`.
///
/// # Errors
/// [`SchedulerError::InvalidConfig`] if the directives do not parse.
pub fn parse_filter(directives: &str) -> Result<EnvFilter, SchedulerError> {
    EnvFilter::try_new(directives)
        .map_err(|e| SchedulerError::InvalidConfig(format!("log filter `{directives}`: {e}")))
}

/// Subscriber writing virtual-time-stamped lines to stdout.
///
/// # Errors
/// [`SchedulerError::InvalidConfig`] for an unparsable filter.
pub fn virtual_time_subscriber(
    clock: ClockReader,
    filter: &str,
) -> Result<impl Subscriber + Send + Sync + 'static, SchedulerError> {
    Ok(tracing_subscriber::fmt()
        .with_env_filter(parse_filter(filter)?)
        .with_timer(VirtualTimer::new(clock))
        .finish())
}

/// Like [`virtual_time_subscriber`], writing to `writer` without ANSI colours.
///
/// # Errors
/// [`SchedulerError::InvalidConfig`] for an unparsable filter.
pub fn virtual_time_subscriber_with_writer<W>(
    clock: ClockReader,
    filter: &str,
    writer: W,
) -> Result<impl Subscriber + Send + Sync + 'static, SchedulerError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    Ok(tracing_subscriber::fmt()
        .with_env_filter(parse_filter(filter)?)
        .with_timer(VirtualTimer::new(clock))
        .with_ansi(false)
        .with_writer(writer)
        .finish())
}
