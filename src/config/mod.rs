//! Simulation configuration.
//!
//! Type-safe configuration with schema validation: serde for shape,
//! `validator` for ranges, plus semantic checks that cross field
//! boundaries. Loadable from YAML files for headless runs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::error::{SimError, SimResult};

/// Run parameters of a [`Simulation`].
///
/// All fields have sensible defaults; construct with
/// [`SimulationConfig::default`], the builder, or [`SimulationConfig::load`].
///
/// [`Simulation`]: crate::simulation::Simulation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Tick frequency of the periodic driver, in Hz.
    #[validate(range(min = 1e-6))]
    #[serde(default = "default_update_frequency")]
    pub update_frequency: f64,

    /// Multiplier applied to measured wall-clock deltas when advancing
    /// simulated time.
    #[validate(range(min = 1e-9))]
    #[serde(default = "default_time_multiplier")]
    pub time_multiplier: f64,

    /// Fixed integration delta. When set, it overrides the measured
    /// wall-clock delta for the integration step.
    #[serde(default)]
    pub delta_time: Option<f64>,

    /// Simulated-time limit. When reached the simulation stops, or wraps
    /// around if `looped` is set.
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// Wrap simulated time modulo `time_limit` instead of stopping.
    #[serde(default)]
    pub looped: bool,
}

fn default_update_frequency() -> f64 {
    30.0
}

fn default_time_multiplier() -> f64 {
    1.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_frequency: default_update_frequency(),
            time_multiplier: default_time_multiplier(),
            delta_time: None,
            time_limit: None,
            looped: false,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, YAML parsing fails, or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Create a builder for configuration.
    #[must_use]
    pub fn builder() -> SimulationConfigBuilder {
        SimulationConfigBuilder::default()
    }

    /// Run schema validation plus the semantic checks.
    ///
    /// # Errors
    ///
    /// Returns a validation or configuration error naming the offending
    /// field.
    pub fn validate_all(&self) -> SimResult<()> {
        self.validate()?;
        self.validate_semantic()
    }

    /// Validate constraints the schema cannot express.
    fn validate_semantic(&self) -> SimResult<()> {
        if !self.update_frequency.is_finite() {
            return Err(SimError::config("update_frequency must be finite"));
        }
        if !self.time_multiplier.is_finite() {
            return Err(SimError::config("time_multiplier must be finite"));
        }
        if let Some(dt) = self.delta_time {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(SimError::config(format!(
                    "delta_time must be a positive real, got {dt}"
                )));
            }
        }
        if let Some(limit) = self.time_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(SimError::config(format!(
                    "time_limit must be a positive real, got {limit}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct SimulationConfigBuilder {
    update_frequency: Option<f64>,
    time_multiplier: Option<f64>,
    delta_time: Option<f64>,
    time_limit: Option<f64>,
    looped: Option<bool>,
}

impl SimulationConfigBuilder {
    /// Set the tick frequency in Hz.
    #[must_use]
    pub const fn update_frequency(mut self, hz: f64) -> Self {
        self.update_frequency = Some(hz);
        self
    }

    /// Set the simulated-time multiplier.
    #[must_use]
    pub const fn time_multiplier(mut self, multiplier: f64) -> Self {
        self.time_multiplier = Some(multiplier);
        self
    }

    /// Set a fixed integration delta.
    #[must_use]
    pub const fn delta_time(mut self, delta_t: f64) -> Self {
        self.delta_time = Some(delta_t);
        self
    }

    /// Set the simulated-time limit.
    #[must_use]
    pub const fn time_limit(mut self, limit: f64) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Enable or disable looping at the time limit.
    #[must_use]
    pub const fn looped(mut self, looped: bool) -> Self {
        self.looped = Some(looped);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation or configuration error for out-of-range values.
    pub fn build(self) -> SimResult<SimulationConfig> {
        let mut config = SimulationConfig::default();
        if let Some(hz) = self.update_frequency {
            config.update_frequency = hz;
        }
        if let Some(multiplier) = self.time_multiplier {
            config.time_multiplier = multiplier;
        }
        config.delta_time = self.delta_time.or(config.delta_time);
        config.time_limit = self.time_limit.or(config.time_limit);
        if let Some(looped) = self.looped {
            config.looped = looped;
        }
        config.validate_all()?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulationConfig::default();
        config.validate_all().unwrap();
        assert!((config.update_frequency - 30.0).abs() < f64::EPSILON);
        assert!((config.time_multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.delta_time, None);
        assert_eq!(config.time_limit, None);
        assert!(!config.looped);
    }

    #[test]
    fn test_builder() {
        let config = SimulationConfig::builder()
            .update_frequency(60.0)
            .time_multiplier(0.5)
            .delta_time(0.01)
            .time_limit(2.0)
            .looped(true)
            .build()
            .unwrap();

        assert!((config.update_frequency - 60.0).abs() < f64::EPSILON);
        assert!((config.time_multiplier - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.delta_time, Some(0.01));
        assert_eq!(config.time_limit, Some(2.0));
        assert!(config.looped);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(SimulationConfig::builder()
            .update_frequency(0.0)
            .build()
            .is_err());
        assert!(SimulationConfig::builder()
            .delta_time(-0.01)
            .build()
            .is_err());
        assert!(SimulationConfig::builder().time_limit(0.0).build().is_err());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r"
update_frequency: 50.0
delta_time: 0.02
time_limit: 1.5
looped: true
";
        let config = SimulationConfig::from_yaml(yaml).unwrap();
        assert!((config.update_frequency - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.delta_time, Some(0.02));
        assert_eq!(config.time_limit, Some(1.5));
        assert!(config.looped);
        // Unset fields fall back to defaults.
        assert!((config.time_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_yaml_rejects_unknown_fields() {
        let yaml = "update_frequencyy: 50.0";
        assert!(SimulationConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_yaml_rejects_out_of_range() {
        assert!(SimulationConfig::from_yaml("update_frequency: -1.0").is_err());
        assert!(SimulationConfig::from_yaml("delta_time: 0.0").is_err());
        assert!(SimulationConfig::from_yaml("time_multiplier: 0.0").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = SimulationConfig::builder()
            .update_frequency(25.0)
            .time_limit(3.0)
            .build()
            .unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back = SimulationConfig::from_yaml(&yaml).unwrap();
        assert!((back.update_frequency - 25.0).abs() < f64::EPSILON);
        assert_eq!(back.time_limit, Some(3.0));
    }
}
