//! Tracking configuration.

use serde::{Deserialize, Serialize};

use stormcell_core::{CoreError, CoreResult};

/// Parameters of one tracking run.
///
/// The defaults reproduce the values proven out on radar composite data:
/// equal term weights, a maximum time step of 930 seconds (three 5-minute
/// scans plus slack), a speed limit of 100 m/s and a size deviation limit
/// of 2.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Weight of the displacement term in the match likelihood.
    pub range_weight: f64,
    /// Weight of the size term in the match likelihood.
    pub size_weight: f64,
    /// Weight of the histogram correlation term in the match likelihood.
    pub correlation_weight: f64,
    /// Maximum allowed time difference between the two lists, seconds.
    pub max_delta_t_secs: i64,
    /// Maximum plausible cluster velocity, metres per second.
    pub max_velocity_ms: f64,
    /// Maximum relative size deviation `(max - min) / min` for a pair to
    /// remain matchable.
    pub max_size_deviation: f64,
    /// Require spatial overlap for pairs whose previous cluster is large
    /// enough that it could not have fully cleared its own footprint.
    pub use_overlap_constraint: bool,
    /// Minimum coverage ratio for a cluster to count as a merge or split
    /// contributor.
    pub merge_split_threshold: f64,
    /// Number of bins for the tracking-variable histograms.
    pub histogram_bins: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            range_weight: 1.0,
            size_weight: 1.0,
            correlation_weight: 1.0,
            max_delta_t_secs: 930,
            max_velocity_ms: 100.0,
            max_size_deviation: 2.5,
            use_overlap_constraint: true,
            merge_split_threshold: 0.33,
            histogram_bins: 25,
        }
    }
}

impl TrackingConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> TrackingConfigBuilder {
        TrackingConfigBuilder::default()
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> CoreResult<()> {
        if self.range_weight < 0.0 || self.size_weight < 0.0 || self.correlation_weight < 0.0 {
            return Err(CoreError::configuration(
                "likelihood term weights must be non-negative",
            ));
        }
        if self.max_delta_t_secs <= 0 {
            return Err(CoreError::configuration(
                "max_delta_t_secs must be positive",
            ));
        }
        if self.max_velocity_ms <= 0.0 || !self.max_velocity_ms.is_finite() {
            return Err(CoreError::configuration(
                "max_velocity_ms must be finite and positive",
            ));
        }
        if self.max_size_deviation <= 0.0 {
            return Err(CoreError::configuration(
                "max_size_deviation must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.merge_split_threshold) {
            return Err(CoreError::configuration(
                "merge_split_threshold must lie in [0, 1]",
            ));
        }
        if self.histogram_bins == 0 {
            return Err(CoreError::configuration(
                "histogram_bins must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Builder for [`TrackingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrackingConfigBuilder {
    config: TrackingConfig,
}

impl TrackingConfigBuilder {
    /// Set the three likelihood term weights at once.
    #[must_use]
    pub fn weights(mut self, range: f64, size: f64, correlation: f64) -> Self {
        self.config.range_weight = range;
        self.config.size_weight = size;
        self.config.correlation_weight = correlation;
        self
    }

    /// Set the maximum time step in seconds.
    #[must_use]
    pub fn max_delta_t_secs(mut self, secs: i64) -> Self {
        self.config.max_delta_t_secs = secs;
        self
    }

    /// Set the speed limit in metres per second.
    #[must_use]
    pub fn max_velocity_ms(mut self, velocity: f64) -> Self {
        self.config.max_velocity_ms = velocity;
        self
    }

    /// Set the maximum relative size deviation.
    #[must_use]
    pub fn max_size_deviation(mut self, deviation: f64) -> Self {
        self.config.max_size_deviation = deviation;
        self
    }

    /// Enable or disable the overlap constraint for large clusters.
    #[must_use]
    pub fn use_overlap_constraint(mut self, enabled: bool) -> Self {
        self.config.use_overlap_constraint = enabled;
        self
    }

    /// Set the merge/split coverage threshold.
    #[must_use]
    pub fn merge_split_threshold(mut self, threshold: f64) -> Self {
        self.config.merge_split_threshold = threshold;
        self
    }

    /// Set the histogram bin count.
    #[must_use]
    pub fn histogram_bins(mut self, bins: usize) -> Self {
        self.config.histogram_bins = bins;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> CoreResult<TrackingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_delta_t_secs, 930);
        assert_eq!(config.histogram_bins, 25);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(TrackingConfig::builder()
            .weights(-1.0, 1.0, 1.0)
            .build()
            .is_err());
        assert!(TrackingConfig::builder().max_velocity_ms(0.0).build().is_err());
        assert!(TrackingConfig::builder()
            .merge_split_threshold(1.5)
            .build()
            .is_err());
        assert!(TrackingConfig::builder().histogram_bins(0).build().is_err());
    }

    #[test]
    fn test_builder_applies_overrides() {
        let config = TrackingConfig::builder()
            .max_delta_t_secs(600)
            .use_overlap_constraint(false)
            .build()
            .expect("valid");
        assert_eq!(config.max_delta_t_secs, 600);
        assert!(!config.use_overlap_constraint);
        // untouched fields keep their defaults
        assert_eq!(config.max_size_deviation, 2.5);
    }
}
