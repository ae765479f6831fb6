//! Configuration models for simulation runs.

pub mod sim;

pub use sim::{SimConfig, ENV_LOG, ENV_SEED, ENV_TRACE_CAPACITY};
