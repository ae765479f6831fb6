//! # Prometheus DES
//!
//! A deterministic discrete-event simulation core.
//!
//! The scheduler executes timestamped callbacks in strict virtual-time order.
//! Instead of waiting on a real clock it jumps a logical clock straight to
//! the next event, so a simulated day runs in milliseconds and two runs of
//! the same program produce byte-identical traces.
//!
//! ## Key Features
//!
//! - **Virtual clock**: monotonic, advanced only by the drain loop
//! - **Deterministic ordering**: earliest time first, FIFO among equal times
//! - **Lazy cancellation**: O(1) cancel through an [`core::EventHandle`]
//! - **Fault isolation**: a failing or panicking callback is reported and
//!   skipped; the run continues
//! - **Cooperative tasks**: ordinary `async` code that sleeps on virtual
//!   time and awaits other tasks
//! - **Virtual-time logging**: `tracing` lines stamped `HH:MM:SS.mmm`
//!
//! ## Scheduling callbacks
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use prometheus_des::core::Scheduler;
//!
//! let sched = Scheduler::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//! for (t, label) in [(30.0, "c"), (10.0, "a"), (20.0, "b")] {
//!     let log = Rc::clone(&log);
//!     sched.schedule_at(t, move || {
//!         log.borrow_mut().push(label);
//!         Ok(())
//!     })?;
//! }
//! sched.run()?;
//! assert_eq!(*log.borrow(), ["a", "b", "c"]);
//! assert_eq!(sched.now(), 30.0);
//! # Ok::<(), prometheus_des::core::SchedulerError>(())
//! ```
//!
//! ## Cooperative tasks
//!
//! ```rust
//! use prometheus_des::runtime::run_sim;
//!
//! let report = run_sim(|sched| async move {
//!     sched.sleep(1.5).await?;
//!     sched.sleep_until(4.0).await?;
//!     anyhow::Ok(())
//! })?;
//! assert!(report.succeeded());
//! assert_eq!(report.final_time, 4.0);
//! # Ok::<(), prometheus_des::core::SchedulerError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Simulation core: clock, event queue, scheduler and task adapter.
pub mod core;
/// Configuration models for simulation runs.
pub mod config;
/// Builders to construct a scheduler from configuration and drive a run.
pub mod builders;
/// Top-level simulation harness.
pub mod runtime;
/// Shared utilities: time formatting and telemetry.
pub mod util;
