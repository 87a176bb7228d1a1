//! Simulator tunables.

use crate::error::{Result, SimError};
use crate::ids::IdFormat;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Probability that a simulated database call fails
    pub db_failure_probability: f64,
    /// Database calls per request
    pub db_ops_per_request: RangeInclusive<u64>,

    /// Per-tick probability of entering a spike
    pub spike_probability: f64,
    /// Spike length in seconds
    pub spike_duration_secs: RangeInclusive<u64>,
    pub spike_check_interval_ms: u64,
    /// Probability that a request during a spike is forced to a 500
    pub spike_server_error_probability: f64,
    /// Request pauses are divided by this while spiking
    pub spike_pace_divisor: u64,

    /// Probability of a noise burst after each request
    pub noise_probability: f64,
    pub noise_burst_size: RangeInclusive<u64>,
    pub noise_delay_ms: RangeInclusive<u64>,

    /// Base inter-request interval, re-drawn every drift period
    pub base_interval_ms: RangeInclusive<u64>,
    /// Extra jitter added to every pause
    pub pause_jitter_ms: RangeInclusive<u64>,
    pub drift_period_secs: RangeInclusive<u64>,
    /// Delay before the first request
    pub warmup_ms: RangeInclusive<u64>,

    pub correlation_id_format: IdFormat,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            db_failure_probability: 0.05,
            db_ops_per_request: 1..=4,
            spike_probability: 0.005,
            spike_duration_secs: 30..=120,
            spike_check_interval_ms: 1_000,
            spike_server_error_probability: 0.8,
            spike_pace_divisor: 4,
            noise_probability: 0.3,
            noise_burst_size: 1..=3,
            noise_delay_ms: 10..=1_000,
            base_interval_ms: 100..=2_000,
            pause_jitter_ms: 50..=200,
            drift_period_secs: 20..=60,
            warmup_ms: 500..=1_500,
            correlation_id_format: IdFormat::Hyphenated,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<()> {
        let probabilities = [
            ("db_failure_probability", self.db_failure_probability),
            ("spike_probability", self.spike_probability),
            ("spike_server_error_probability", self.spike_server_error_probability),
            ("noise_probability", self.noise_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }

        let ranges = [
            ("db_ops_per_request", &self.db_ops_per_request),
            ("spike_duration_secs", &self.spike_duration_secs),
            ("noise_burst_size", &self.noise_burst_size),
            ("noise_delay_ms", &self.noise_delay_ms),
            ("base_interval_ms", &self.base_interval_ms),
            ("pause_jitter_ms", &self.pause_jitter_ms),
            ("drift_period_secs", &self.drift_period_secs),
            ("warmup_ms", &self.warmup_ms),
        ];
        for (name, range) in ranges {
            if range.start() > range.end() {
                return Err(SimError::InvalidConfig(format!(
                    "{} is empty ({}..={})",
                    name,
                    range.start(),
                    range.end()
                )));
            }
        }

        if *self.db_ops_per_request.start() == 0 {
            return Err(SimError::InvalidConfig(
                "db_ops_per_request must start at 1 or more".to_string(),
            ));
        }
        if self.spike_check_interval_ms == 0 {
            return Err(SimError::InvalidConfig(
                "spike_check_interval_ms must be positive".to_string(),
            ));
        }
        if self.spike_pace_divisor == 0 {
            return Err(SimError::InvalidConfig(
                "spike_pace_divisor must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn spike_check_interval(&self) -> Duration {
        Duration::from_millis(self.spike_check_interval_ms)
    }
}
