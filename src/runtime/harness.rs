//! One-call entry points for running a whole simulation.

use std::future::Future;

use crate::builders::{SimBuilder, SimReport};
use crate::config::SimConfig;
use crate::core::{AppResult, Scheduler, SchedulerError};

/// Run `entry` in a fresh simulation with default settings: clock at 0,
/// RNG seeded with 0, no log subscriber.
///
/// No log output is produced unless a global subscriber is already set.
/// For `HH:MM:SS.mmm` lines, pass `SimConfig::default().with_subscriber(true)`
/// to [`run_sim_with`], or load the config with [`SimConfig::from_env`]
/// and set `DES_LOG` (e.g. `DES_LOG=debug`).
///
/// ```rust
/// use prometheus_des::runtime::run_sim;
///
/// let report = run_sim(|sched| async move {
///     let s = sched.clone();
///     let worker = sched.spawn(async move {
///         s.sleep(5.0).await?;
///         anyhow::Ok(42)
///     });
///     assert_eq!(worker.await?, 42);
///     anyhow::Ok(())
/// })
/// .unwrap();
/// assert_eq!(report.final_time, 5.0);
/// ```
///
/// # Errors
/// A fatal scheduler error that aborted the run.
pub fn run_sim<E, Fut>(entry: E) -> Result<SimReport, SchedulerError>
where
    E: FnOnce(Scheduler) -> Fut,
    Fut: Future<Output = AppResult<()>> + 'static,
{
    SimBuilder::new().run(entry)
}

/// Run `entry` with `config`, then call `post_processing` once with the
/// report.
///
/// ```rust
/// use prometheus_des::config::SimConfig;
/// use prometheus_des::runtime::run_sim_with;
///
/// let config = SimConfig::default().with_subscriber(true).with_log_filter("info");
/// let report = run_sim_with(
///     config,
///     |sched| async move {
///         sched.sleep(3661.25).await?;
///         tracing::info!("one hour later");
///         anyhow::Ok(())
///     },
///     |report| {
///         assert!(report.succeeded());
///         Ok(())
///     },
/// )
/// .unwrap();
/// assert_eq!(report.final_time, 3661.25);
/// ```
///
/// # Errors
/// Invalid configuration, or a fatal scheduler error that aborted the run.
pub fn run_sim_with<E, Fut, P>(
    config: SimConfig,
    entry: E,
    post_processing: P,
) -> Result<SimReport, SchedulerError>
where
    E: FnOnce(Scheduler) -> Fut,
    Fut: Future<Output = AppResult<()>> + 'static,
    P: FnOnce(&SimReport) -> AppResult<()> + 'static,
{
    SimBuilder::new()
        .config(config)
        .post_processing(post_processing)
        .run(entry)
}
