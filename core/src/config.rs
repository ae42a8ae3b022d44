//! Configuration options.
//!
//! An estimator is configured once at start. Applications typically embed an
//! [`EstimatorConfig`] in their own configuration or load one from a TOML
//! file with [`load_config`].

use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> EstimatorConfig {
    let config_str = fs::read_to_string(path).expect("ERROR: File read failed");
    toml::from_str(&config_str).expect("Invalid config file")
}

/// Returns the default configuration: one-second aggregation, a report every
/// five seconds, and all three metrics enabled.
pub fn default_config() -> EstimatorConfig {
    EstimatorConfig::default()
}

/// Estimator runtime options.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EstimatorConfig {
    /// Period, in seconds, at which the aggregator hands accumulated data
    /// over the fence to the reporter. Fractional values are fine; accuracy
    /// degrades below the scheduler timer resolution.
    #[serde(default = "default_aggregation_interval")]
    pub aggregation_interval: f64,

    /// Reporting schedule: semicolon-separated items, each
    /// `outlets,interval_s[,offset_s]`. `c` (callback) is the only outlet.
    /// `"c,5,0;c,5,2.5"` reports every 2.5 seconds, each report covering 5.
    #[serde(default = "default_reporter_schedule")]
    pub reporter_schedule: String,

    /// The reporter processes a completed period only once this many are
    /// pending. Larger values let it see further into the future when
    /// reconciling packets that straddle period boundaries.
    #[serde(default = "default_reporter_min_batches")]
    pub reporter_min_batches: usize,

    /// Measure loss?
    #[serde(default = "default_true")]
    pub measure_loss: bool,

    /// Measure reorder extent?
    #[serde(default = "default_true")]
    pub measure_reorder_extent: bool,

    /// Measure reorder density?
    #[serde(default = "default_true")]
    pub measure_reorder_density: bool,
}

impl EstimatorConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.aggregation_interval.is_finite() || self.aggregation_interval < 0.0 {
            bail!(
                "aggregation interval must be non-negative, got {}",
                self.aggregation_interval
            );
        }
        if self.reporter_min_batches == 0 {
            bail!("reporter_min_batches must be at least 1");
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            aggregation_interval: default_aggregation_interval(),
            reporter_schedule: default_reporter_schedule(),
            reporter_min_batches: default_reporter_min_batches(),
            measure_loss: true,
            measure_reorder_extent: true,
            measure_reorder_density: true,
        }
    }
}

fn default_aggregation_interval() -> f64 {
    1.0
}

fn default_reporter_schedule() -> String {
    "c,5,0".to_owned()
}

fn default_reporter_min_batches() -> usize {
    1
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_defaults_validate() {
        assert!(default_config().validate().is_ok());
    }

    #[test]
    fn core_rejects_negative_interval() {
        let config = EstimatorConfig {
            aggregation_interval: -0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn core_rejects_zero_batches() {
        let config = EstimatorConfig {
            reporter_min_batches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn core_toml_roundtrip_with_defaults() {
        let config: EstimatorConfig = toml::from_str(
            r#"
            aggregation_interval = 0.5
            reporter_schedule = "c,5,0;c,5,2.5"
            "#,
        )
        .unwrap();
        assert_eq!(config.aggregation_interval, 0.5);
        assert_eq!(config.reporter_schedule, "c,5,0;c,5,2.5");
        assert_eq!(config.reporter_min_batches, 1);
        assert!(config.measure_loss);
    }
}
