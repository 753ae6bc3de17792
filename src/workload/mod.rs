//! Synthetic user-generated-content events used as benchmark input.

mod generator;
mod record;

pub use generator::{WorkloadGenerator, generate};
pub use record::{Measure, Probe, Record, Workload};
