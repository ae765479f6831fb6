//! Simulation run configuration.

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;
use crate::util::parse_filter;

/// Environment variable overriding [`SimConfig::seed`].
pub const ENV_SEED: &str = "DES_SEED";
/// Environment variable overriding [`SimConfig::log_filter`].
pub const ENV_LOG: &str = "DES_LOG";
/// Environment variable overriding [`SimConfig::trace_capacity`].
pub const ENV_TRACE_CAPACITY: &str = "DES_TRACE_CAPACITY";

const MAX_TRACE_CAPACITY: usize = 1 << 24;

/// Settings for one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed of the simulation RNG.
    pub seed: u64,
    /// `EnvFilter` directives for the virtual-time log subscriber.
    pub log_filter: String,
    /// Install the virtual-time subscriber for the duration of the run.
    /// Off by default so library callers keep control of logging; `DES_LOG`
    /// turns it on in [`SimConfig::from_env`].
    pub install_subscriber: bool,
    /// Execution trace capacity; 0 disables tracing.
    pub trace_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            log_filter: "debug".to_string(),
            install_subscriber: false,
            trace_capacity: 0,
        }
    }
}

impl SimConfig {
    /// Set the RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the log filter directives.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Enable or disable the run-scoped log subscriber.
    #[must_use]
    pub const fn with_subscriber(mut self, install: bool) -> Self {
        self.install_subscriber = install;
        self
    }

    /// Set the execution trace capacity.
    #[must_use]
    pub const fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.log_filter.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "log_filter must not be empty".into(),
            ));
        }
        parse_filter(&self.log_filter)?;
        if self.trace_capacity > MAX_TRACE_CAPACITY {
            return Err(SchedulerError::InvalidConfig(format!(
                "trace_capacity must be at most {MAX_TRACE_CAPACITY}"
            )));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidConfig`] on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| SchedulerError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `DES_*` environment variables, after loading a
    /// `.env` file if one exists.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidConfig`] for unparsable or invalid values.
    pub fn from_env() -> Result<Self, SchedulerError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `DES_*` keys.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidConfig`] for unparsable or invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SchedulerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(ENV_SEED) {
            cfg.seed = raw.trim().parse().map_err(|e| {
                SchedulerError::InvalidConfig(format!("{ENV_SEED}=`{raw}`: {e}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_LOG) {
            cfg.log_filter = raw;
            cfg.install_subscriber = true;
        }
        if let Some(raw) = lookup(ENV_TRACE_CAPACITY) {
            cfg.trace_capacity = raw.trim().parse().map_err(|e| {
                SchedulerError::InvalidConfig(format!("{ENV_TRACE_CAPACITY}=`{raw}`: {e}"))
            })?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
