//! Builders turning configuration into a ready scheduler and a full run.

pub mod sim_builder;

pub use sim_builder::{SimBuilder, SimReport};
