use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::BenchError;

/// Shape of one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Records loaded before any measurement.
    #[serde(default = "RunConfig::default_rows_count")]
    pub rows_count: usize,
    /// Target producer throughput of the stress phase, events per second.
    #[serde(default = "RunConfig::default_wps")]
    pub wps: u32,
    #[serde(default = "RunConfig::default_readers_count")]
    pub readers_count: usize,
    /// Size of the batch whose insert is timed in the static phase.
    #[serde(default = "RunConfig::default_static_batch")]
    pub static_batch: usize,
    #[serde(default = "RunConfig::default_repeats")]
    pub repeats: u32,
    #[serde(with = "humantime_serde", default = "RunConfig::default_stress_duration")]
    pub stress_duration: Duration,
    #[serde(with = "humantime_serde", default = "RunConfig::default_settle_delay")]
    pub settle_delay: Duration,
    #[serde(default = "RunConfig::default_most_viewed_limit")]
    pub most_viewed_limit: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RunConfig {
    fn default_rows_count() -> usize {
        100_000
    }

    fn default_wps() -> u32 {
        10_000
    }

    fn default_readers_count() -> usize {
        5
    }

    fn default_static_batch() -> usize {
        100_000
    }

    fn default_repeats() -> u32 {
        100
    }

    fn default_stress_duration() -> Duration {
        Duration::from_secs(10)
    }

    fn default_settle_delay() -> Duration {
        Duration::from_secs(1)
    }

    fn default_most_viewed_limit() -> usize {
        10
    }

    /// Records generated for the stress producer.
    pub fn stress_records(&self) -> usize {
        (self.stress_duration.as_secs_f64() * f64::from(self.wps)).round() as usize
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        if self.rows_count == 0 {
            return Err(BenchError::ConfigParsingError(
                "run.rows_count must be at least 1".to_string(),
            ));
        }
        if self.wps == 0 {
            return Err(BenchError::ConfigParsingError(
                "run.wps must be at least 1".to_string(),
            ));
        }
        if self.readers_count == 0 {
            return Err(BenchError::ConfigParsingError(
                "run.readers_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rows_count: Self::default_rows_count(),
            wps: Self::default_wps(),
            readers_count: Self::default_readers_count(),
            static_batch: Self::default_static_batch(),
            repeats: Self::default_repeats(),
            stress_duration: Self::default_stress_duration(),
            settle_delay: Self::default_settle_delay(),
            most_viewed_limit: Self::default_most_viewed_limit(),
            seed: None,
        }
    }
}
