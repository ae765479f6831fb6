//! Top-level simulation harness.

pub mod harness;

pub use harness::{run_sim, run_sim_with};
