//! Build a scheduler from [`SimConfig`] and drive one simulation run.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::SimConfig;
use crate::core::{AppResult, RunStats, Scheduler, SchedulerError, TaskState, TraceRecord};
use crate::util::{virtual_time_subscriber, virtual_time_subscriber_with_writer};

type PostProcessing = Box<dyn FnOnce(&SimReport) -> AppResult<()>>;

/// Summary of a finished run, handed to post-processing and returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    /// Seed the simulation RNG was initialised with.
    pub seed: u64,
    /// Virtual time at quiescence.
    pub final_time: f64,
    /// Drain-loop counters.
    pub stats: RunStats,
    /// State the entry task ended in.
    pub entry_state: TaskState,
    /// Rendered failure of the entry task, if it failed.
    pub entry_failure: Option<String>,
    /// Tasks still suspended when the queue drained.
    pub unfinished_tasks: usize,
    /// Execution trace; empty unless a trace capacity was configured.
    pub trace: Vec<TraceRecord>,
}

impl SimReport {
    /// Whether the entry computation completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.entry_state == TaskState::Completed
    }

    /// Execution trace as JSON.
    ///
    /// # Errors
    /// [`SchedulerError::Serialization`] if encoding fails.
    pub fn trace_json(&self) -> Result<String, SchedulerError> {
        serde_json::to_string(&self.trace).map_err(|e| SchedulerError::Serialization(e.to_string()))
    }
}

/// Builder for a single simulation run.
///
/// ```rust
/// use prometheus_des::builders::SimBuilder;
/// use prometheus_des::config::SimConfig;
///
/// let report = SimBuilder::new()
///     .config(SimConfig::default().with_trace_capacity(16))
///     .run(|sched| async move {
///         sched.sleep(90.0).await?;
///         anyhow::Ok(())
///     })
///     .unwrap();
/// assert!(report.succeeded());
/// assert_eq!(report.final_time, 90.0);
/// ```
#[derive(Default)]
pub struct SimBuilder {
    config: SimConfig,
    post_processing: Option<PostProcessing>,
    log_writer: Option<BoxMakeWriter>,
}

impl SimBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for the run.
    #[must_use]
    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Hook invoked once after quiescence, outside virtual time.
    #[must_use]
    pub fn post_processing<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&SimReport) -> AppResult<()> + 'static,
    {
        self.post_processing = Some(Box::new(hook));
        self
    }

    /// Send run-scoped log lines to `writer` instead of stdout. Implies
    /// installing the subscriber.
    #[must_use]
    pub fn log_writer<W>(mut self, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        self.log_writer = Some(BoxMakeWriter::new(writer));
        self.config.install_subscriber = true;
        self
    }

    /// Validate the configuration and build a fresh scheduler: clock at 0,
    /// empty queue, RNG seeded from the config.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidConfig`] if validation fails.
    pub fn build(&self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;
        let sched = Scheduler::with_seed(self.config.seed);
        if self.config.trace_capacity > 0 {
            sched.enable_trace(self.config.trace_capacity);
        }
        Ok(sched)
    }

    fn install_logging(
        &mut self,
        sched: &Scheduler,
    ) -> Result<Option<DefaultGuard>, SchedulerError> {
        if !self.config.install_subscriber {
            return Ok(None);
        }
        let guard = match self.log_writer.take() {
            Some(writer) => tracing::subscriber::set_default(virtual_time_subscriber_with_writer(
                sched.clock(),
                &self.config.log_filter,
                writer,
            )?),
            None => tracing::subscriber::set_default(virtual_time_subscriber(
                sched.clock(),
                &self.config.log_filter,
            )?),
        };
        Ok(Some(guard))
    }

    /// Run `entry` to quiescence and report.
    ///
    /// `entry` receives the run's scheduler and returns the entry
    /// computation, which is spawned as a task at time 0. Entry failures are
    /// reported in [`SimReport`], not returned as errors.
    ///
    /// # Errors
    /// Invalid configuration, or a fatal scheduler error that aborted the run.
    pub fn run<E, Fut>(mut self, entry: E) -> Result<SimReport, SchedulerError>
    where
        E: FnOnce(Scheduler) -> Fut,
        Fut: Future<Output = AppResult<()>> + 'static,
    {
        let sched = self.build()?;
        let _log_guard = self.install_logging(&sched)?;
        tracing::info!(seed = self.config.seed, "starting simulation");

        let handle = sched.spawn_named("entry", entry(sched.clone()));
        let stats = match sched.run() {
            Ok(stats) => stats,
            Err(err) => {
                drop(handle);
                sched.shutdown();
                return Err(err);
            }
        };

        let entry_failure = handle.try_output().err().map(|e| e.to_string());
        let report = SimReport {
            seed: self.config.seed,
            final_time: sched.now(),
            stats,
            entry_state: handle.state().unwrap_or(TaskState::Failed),
            entry_failure,
            unfinished_tasks: sched.unfinished_tasks(),
            trace: sched.trace(),
        };
        drop(handle);

        if let Some(hook) = self.post_processing.take() {
            if let Err(err) = hook(&report) {
                tracing::error!("post-processing failed: {err:#}");
            }
        }
        sched.shutdown();
        Ok(report)
    }
}

impl fmt::Debug for SimBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimBuilder")
            .field("config", &self.config)
            .field("post_processing", &self.post_processing.is_some())
            .field("log_writer", &self.log_writer.is_some())
            .finish()
    }
}
