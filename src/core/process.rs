//! Long-running simulated processes.
//!
//! A [`Process`] is a stateful actor driven by the scheduler: customers,
//! servers, generators. Its `run` method is an ordinary suspendable
//! computation that sleeps on virtual time and awaits other tasks.

use std::panic::Location;

use async_trait::async_trait;

use crate::core::scheduler::Scheduler;
use crate::core::task::JoinHandle;
use crate::core::AppResult;

/// Behaviour of a simulated process.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use prometheus_des::core::{Process, Scheduler};
///
/// struct Ticker {
///     ticks: u32,
/// }
///
/// #[async_trait(?Send)]
/// impl Process for Ticker {
///     async fn run(&mut self, sched: &Scheduler) -> anyhow::Result<()> {
///         while self.ticks > 0 {
///             sched.sleep(1.0).await?;
///             self.ticks -= 1;
///         }
///         Ok(())
///     }
/// }
///
/// let sched = Scheduler::new();
/// let handle = sched.spawn_process("ticker", Ticker { ticks: 3 });
/// sched.run().unwrap();
/// assert!(handle.try_output().unwrap().is_some());
/// assert_eq!(sched.now(), 3.0);
/// ```
#[async_trait(?Send)]
pub trait Process: 'static {
    /// Drive the process until it finishes.
    ///
    /// Returning an error marks the task failed; the run continues.
    async fn run(&mut self, sched: &Scheduler) -> AppResult<()>;
}

impl Scheduler {
    /// Spawn `process` as a named task. The join handle yields the process
    /// back once `run` returns, so its final state can be inspected.
    #[track_caller]
    pub fn spawn_process<P>(&self, name: impl Into<String>, mut process: P) -> JoinHandle<P>
    where
        P: Process,
    {
        let sched = self.clone();
        self.spawn_inner(
            Some(name.into()),
            async move {
                process.run(&sched).await?;
                anyhow::Ok(process)
            },
            Location::caller(),
        )
    }
}
