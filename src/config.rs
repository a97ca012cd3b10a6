//! # Trajectory Motion Configuration
//!
//! Session scoped configuration of the trajectory motion core. A configuration update is only
//! applied when a new communication session starts, never in the middle of one.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! spline_method = "linear"
//! condition_tolerance = 0.005
//! ramp_down_duration = 1.0
//!
//! [duration_estimation]
//! joint_speed = 20.0
//! linear_speed = 100.0
//! minimum_duration = 0.5
//! ```
//!
//! Missing keys fall back to their defaults.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Spline method requested from the interpolation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplineMethod {
    #[default]
    Linear,
    Square,
    Cubic,
    Quintic,
}

/// Nominal speeds used to estimate goal durations when operators leave them out.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DurationEstimationConfig {
    /// Joint speed [deg/s].
    #[serde(default = "default_joint_speed")]
    pub joint_speed: f64,
    /// Linear speed [mm/s].
    #[serde(default = "default_linear_speed")]
    pub linear_speed: f64,
    /// Angular speed [deg/s].
    #[serde(default = "default_angular_speed")]
    pub angular_speed: f64,
    /// Lower bound for every estimated duration [s].
    #[serde(default = "default_minimum_duration")]
    pub minimum_duration: f64,
}

impl Default for DurationEstimationConfig {
    fn default() -> Self {
        Self {
            joint_speed: default_joint_speed(),
            linear_speed: default_linear_speed(),
            angular_speed: default_angular_speed(),
            minimum_duration: default_minimum_duration(),
        }
    }
}

/// Configuration of the trajectory motion core.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrajectoryConfig {
    #[serde(default)]
    pub spline_method: SplineMethod,
    #[serde(default)]
    pub duration_estimation: DurationEstimationConfig,
    /// Tolerance [deg or mm] for when a point counts as reached.
    #[serde(default = "default_condition_tolerance")]
    pub condition_tolerance: f64,
    /// Duration [s] for ramping velocity references down to zero.
    #[serde(default = "default_ramp_down_duration")]
    pub ramp_down_duration: f64,
    /// Ramp in duration [s] for static goals.
    #[serde(default = "default_static_goal_duration")]
    pub static_goal_duration: f64,
    /// Ramp in duration [s] for static goals with a fast transition.
    #[serde(default = "default_static_goal_short_duration")]
    pub static_goal_short_duration: f64,
    /// Proportional gain [1/s] correcting tracking drift during velocity transitions.
    #[serde(default = "default_correction_gain")]
    pub correction_gain: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            spline_method: SplineMethod::default(),
            duration_estimation: DurationEstimationConfig::default(),
            condition_tolerance: default_condition_tolerance(),
            ramp_down_duration: default_ramp_down_duration(),
            static_goal_duration: default_static_goal_duration(),
            static_goal_short_duration: default_static_goal_short_duration(),
            correction_gain: default_correction_gain(),
        }
    }
}

impl TrajectoryConfig {
    /// Validate durations, speeds, tolerance and gain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("duration_estimation.joint_speed", self.duration_estimation.joint_speed),
            ("duration_estimation.linear_speed", self.duration_estimation.linear_speed),
            ("duration_estimation.angular_speed", self.duration_estimation.angular_speed),
            ("duration_estimation.minimum_duration", self.duration_estimation.minimum_duration),
            ("condition_tolerance", self.condition_tolerance),
            ("ramp_down_duration", self.ramp_down_duration),
            ("static_goal_duration", self.static_goal_duration),
            ("static_goal_short_duration", self.static_goal_short_duration),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0, got {}", name, value)));
            }
        }
        if !self.correction_gain.is_finite() || self.correction_gain < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "correction_gain must be >= 0, got {}",
                self.correction_gain
            )));
        }
        Ok(())
    }
}

// Default value functions
fn default_joint_speed() -> f64 { 20.0 }
fn default_linear_speed() -> f64 { 100.0 }
fn default_angular_speed() -> f64 { 20.0 }
fn default_minimum_duration() -> f64 { 0.5 }
fn default_condition_tolerance() -> f64 { 0.005 }
fn default_ramp_down_duration() -> f64 { 1.0 }
fn default_static_goal_duration() -> f64 { 5.0 }
fn default_static_goal_short_duration() -> f64 { 0.1 }
fn default_correction_gain() -> f64 { 1.0 }

/// Load and validate a configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<TrajectoryConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: TrajectoryConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

/// Active configuration plus an update waiting for the next session.
#[derive(Debug)]
pub struct ConfigurationContainer {
    active: Arc<TrajectoryConfig>,
    pending: Option<Arc<TrajectoryConfig>>,
}

impl ConfigurationContainer {
    pub fn new(initial: TrajectoryConfig) -> Self {
        Self {
            active: Arc::new(initial),
            pending: None,
        }
    }

    pub fn active(&self) -> Arc<TrajectoryConfig> {
        Arc::clone(&self.active)
    }

    #[cfg(test)]
    pub(crate) fn has_pending_update(&self) -> bool {
        self.pending.is_some()
    }

    /// Stage an update; a later update replaces an earlier one that was not applied yet.
    pub fn set_pending(&mut self, update: TrajectoryConfig) {
        self.pending = Some(Arc::new(update));
    }

    /// Swap in the pending update, returning the new active configuration if there was one.
    pub fn apply_pending(&mut self) -> Option<Arc<TrajectoryConfig>> {
        let update = self.pending.take()?;
        self.active = Arc::clone(&update);
        Some(update)
    }
}
