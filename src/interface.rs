// src/interface.rs - Top level handle wiring configuration and trajectory motion together
use std::sync::{Arc, Mutex};

use crate::config::{ConfigurationContainer, TrajectoryConfig};
use crate::goal::{StaticGoal, StaticPositionGoal, StaticVelocityGoal};
use crate::interpolation::Interpolator;
use crate::lock;
use crate::motion::state::ExecutionProgress;
use crate::motion::step::DurationEstimator;
use crate::motion::{MotionError, TrajectoryMotion};
use crate::trajectory::Trajectory;
use crate::types::{Command, CycleInput};

/// Entry point for the transport (per-cycle callback) and for operators.
#[derive(Debug)]
pub struct TrajectoryInterface {
    configuration: Mutex<ConfigurationContainer>,
    motion: TrajectoryMotion,
}

impl TrajectoryInterface {
    pub fn new(config: TrajectoryConfig) -> Result<Self, MotionError> {
        config.validate()?;
        let container = ConfigurationContainer::new(config);
        let motion = TrajectoryMotion::new(container.active());
        Ok(Self {
            configuration: Mutex::new(container),
            motion,
        })
    }

    pub fn with_services(
        config: TrajectoryConfig,
        interpolator: Box<dyn Interpolator>,
        estimator: Box<dyn DurationEstimator>,
    ) -> Result<Self, MotionError> {
        config.validate()?;
        let container = ConfigurationContainer::new(config);
        let motion = TrajectoryMotion::with_services(container.active(), interpolator, estimator);
        Ok(Self {
            configuration: Mutex::new(container),
            motion,
        })
    }

    /// Process one controller sample. A pending configuration becomes active when a session starts.
    pub fn callback(&self, input: &CycleInput) -> Result<Command, MotionError> {
        if input.first_message {
            let applied = lock(&self.configuration).apply_pending();
            if let Some(config) = applied {
                tracing::info!("Applying configuration update for the new session");
                self.motion.update_configuration(config);
            }
        }
        self.motion.generate_outputs(input)
    }

    /// Configuration active in the current session.
    pub fn configuration(&self) -> TrajectoryConfig {
        lock(&self.configuration).active().as_ref().clone()
    }

    /// Stage a configuration for the next session. Invalid configurations are ignored.
    pub fn set_configuration(&self, config: TrajectoryConfig) {
        if let Err(e) = config.validate() {
            tracing::warn!("Ignoring configuration update: {}", e);
            return;
        }
        lock(&self.configuration).set_pending(config);
    }

    pub fn add_trajectory(&self, trajectory: Trajectory, override_pending: bool) {
        self.motion.add_trajectory(trajectory, override_pending);
    }

    pub fn stop(&self, discard: bool) {
        self.motion.stop(discard);
    }

    pub fn resume(&self) {
        self.motion.resume();
    }

    pub fn update_duration_factor(&self, factor: f64) {
        self.motion.update_duration_factor(factor);
    }

    pub fn start_static_goal(&self, discard: bool) {
        self.motion.start_static_goal(discard);
    }

    pub fn set_static_position_goal(&self, goal: StaticPositionGoal, fast_transition: bool) {
        self.motion.set_static_goal(StaticGoal::Position(goal), fast_transition);
    }

    pub fn set_static_velocity_goal(&self, goal: StaticVelocityGoal, fast_transition: bool) {
        self.motion.set_static_goal(StaticGoal::Velocity(goal), fast_transition);
    }

    pub fn finish_static_goal(&self, resume: bool) {
        self.motion.finish_static_goal(resume);
    }

    pub fn retrieve_execution_progress(&self) -> ExecutionProgress {
        self.motion.retrieve_execution_progress()
    }
}
