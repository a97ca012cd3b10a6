// src/motion/mod.rs - Trajectory motion: per-cycle processing and the operator API
//
// The real-time cycle owns the state machine, the motion step and the output controller behind a
// single lock that operators never take. Operators only touch the trajectory queue, the event
// mailbox and the progress snapshot, each guarded on its own.
pub mod controller;
pub mod state;
pub mod step;

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::{ConfigError, TrajectoryConfig};
use crate::goal::StaticGoal;
use crate::interpolation::Interpolator;
use crate::lock;
use crate::trajectory::{Trajectory, TrajectoryQueue};
use crate::types::{Command, CycleInput};
use controller::OutputController;
use state::{map_current_state, DecisionData, ExecutionProgress, ExecutionState, Mailbox, State, SubState};
use step::{DurationEstimator, MotionStep};

pub const MIN_DURATION_FACTOR: f64 = 1.0;
pub const MAX_DURATION_FACTOR: f64 = 5.0;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Interpolation rejected the goal: {0}")]
    Interpolation(String),
    #[error("Execution state machine reached an undefined state ({state:?}, {sub_state:?})")]
    UndefinedState { state: State, sub_state: SubState },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
}

#[derive(Debug)]
struct Realtime {
    machine: DecisionData,
    step: MotionStep,
    controller: OutputController,
    session_active: bool,
}

#[derive(Debug)]
pub struct TrajectoryMotion {
    mailbox: Mailbox,
    queue: TrajectoryQueue,
    progress: Mutex<ExecutionProgress>,
    realtime: Mutex<Realtime>,
}

impl TrajectoryMotion {
    pub fn new(config: Arc<TrajectoryConfig>) -> Self {
        Self::from_step(MotionStep::new(config))
    }

    /// Use custom interpolation and duration estimation services.
    pub fn with_services(
        config: Arc<TrajectoryConfig>,
        interpolator: Box<dyn Interpolator>,
        estimator: Box<dyn DurationEstimator>,
    ) -> Self {
        Self::from_step(MotionStep::with_services(config, interpolator, estimator))
    }

    fn from_step(step: MotionStep) -> Self {
        Self {
            mailbox: Mailbox::default(),
            queue: TrajectoryQueue::new(),
            progress: Mutex::new(ExecutionProgress {
                duration_factor: MIN_DURATION_FACTOR,
                ..Default::default()
            }),
            realtime: Mutex::new(Realtime {
                machine: DecisionData::new(),
                step,
                controller: OutputController::new(),
                session_active: false,
            }),
        }
    }

    /// Per-cycle entry point: turn the latest feedback into the command to send back.
    pub fn generate_outputs(&self, input: &CycleInput) -> Result<Command, MotionError> {
        let mut guard = lock(&self.realtime);
        let realtime = &mut *guard;
        let events = self.mailbox.drain();

        let mode_changed = realtime.session_active && input.feedback.mode != realtime.step.mode();
        let session_start = input.first_message || !realtime.session_active || mode_changed;
        realtime.step.prepare(&input.feedback, session_start);
        if session_start {
            tracing::info!("Starting motion session in {:?} mode", input.feedback.mode);
            realtime.machine.reset_session(&self.queue, &mut realtime.step);
            realtime.session_active = true;
        }

        realtime.machine.reconcile(events, &self.queue, &mut realtime.step);
        let machine = &realtime.machine;
        let state = map_current_state(machine.state, machine.sub_state);
        if state == ExecutionState::Undefined {
            tracing::error!("Undefined execution state ({:?}, {:?})", machine.state, machine.sub_state);
            return Err(MotionError::UndefinedState {
                state: machine.state,
                sub_state: machine.sub_state,
            });
        }

        if machine.has_new_goal {
            realtime.step.update_interpolator().map_err(|e| {
                tracing::error!("Failed to update interpolation: {}", e);
                e
            })?;
            let config = realtime.step.config();
            realtime.controller.update(machine.state, &realtime.step, &config);
        }

        let command = if machine.has_active_goal {
            realtime.step.evaluate_interpolator();
            realtime.controller.calculate(&realtime.step)
        } else {
            realtime.step.hold();
            realtime.controller.hold(&realtime.step)
        };

        let pending_points = self.queue.pending_points();
        let data = realtime.step.data();
        let mut progress = lock(&self.progress);
        progress.state = state;
        progress.goal_active = machine.has_active_goal;
        progress.active_point = realtime.step.external_goal().copied();
        progress.time_passed = data.time_passed;
        progress.duration_factor = data.duration_factor;
        progress.pending_points = pending_points;
        progress.command = command;
        progress.updated = true;

        Ok(command)
    }

    /// Swap in a new configuration. Only called between sessions.
    pub fn update_configuration(&self, config: Arc<TrajectoryConfig>) {
        let mut realtime = lock(&self.realtime);
        realtime.step.update_configuration(config);
        realtime.session_active = false;
    }

    pub fn add_trajectory(&self, trajectory: Trajectory, override_pending: bool) {
        tracing::debug!(
            "Adding trajectory with {} points (override: {})",
            trajectory.len(),
            override_pending
        );
        self.queue.append(trajectory, override_pending);
    }

    /// Ramp down and hold until resumed.
    pub fn stop(&self, discard: bool) {
        self.mailbox.post(|events| {
            events.do_stop = true;
            events.do_ramp_down = true;
            events.do_resume = false;
            events.do_discard |= discard;
        });
    }

    pub fn resume(&self) {
        self.mailbox.post(|events| events.do_resume = true);
    }

    /// Request a new duration factor, clamped to [1.0, 5.0].
    pub fn update_duration_factor(&self, factor: f64) {
        if !factor.is_finite() {
            tracing::warn!("Ignoring non-finite duration factor {}", factor);
            return;
        }
        let clamped = factor.clamp(MIN_DURATION_FACTOR, MAX_DURATION_FACTOR);
        if clamped != factor {
            tracing::debug!("Duration factor {} clamped to {}", factor, clamped);
        }
        self.mailbox.post(|events| events.duration_factor = Some(clamped));
    }

    /// Ramp down the current motion and wait for static goals.
    pub fn start_static_goal(&self, discard: bool) {
        self.mailbox.post(|events| {
            events.do_static_goal_start = true;
            events.do_static_goal_finish = false;
            events.do_ramp_down = true;
            events.do_discard |= discard;
        });
    }

    pub fn set_static_goal(&self, goal: StaticGoal, fast_transition: bool) {
        self.mailbox.post(|events| {
            events.static_goal = Some(goal);
            events.do_static_goal_fast_update = fast_transition;
        });
    }

    /// Leave static goal execution, resuming the trajectories afterwards if `resume` is set.
    pub fn finish_static_goal(&self, resume: bool) {
        self.mailbox.post(|events| {
            events.do_static_goal_finish = true;
            events.do_ramp_down = true;
            events.do_resume = resume;
        });
    }

    /// Latest progress snapshot; reading it clears the `updated` flag.
    pub fn retrieve_execution_progress(&self) -> ExecutionProgress {
        let mut snapshot = {
            let mut progress = lock(&self.progress);
            let snapshot = progress.clone();
            progress.updated = false;
            snapshot
        };
        let (active, pending) = self.queue.export();
        snapshot.pending_points = active.len() + pending.iter().map(Trajectory::len).sum::<usize>();
        snapshot.active_trajectory = active;
        snapshot.pending_trajectories = pending;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::PointGoal;
    use crate::types::{Feedback, Joints};

    fn input(time: f64, first_message: bool) -> CycleInput {
        CycleInput {
            feedback: Feedback {
                time,
                ..Default::default()
            },
            first_message,
        }
    }

    #[test]
    fn test_idle_cycle_holds_feedback() {
        let motion = TrajectoryMotion::new(Arc::new(TrajectoryConfig::default()));
        let command = motion.generate_outputs(&input(0.0, true)).unwrap();
        assert_eq!(command.references.joints.position, Joints::zero());
        let progress = motion.retrieve_execution_progress();
        assert_eq!(progress.state, ExecutionState::Normal);
        assert!(!progress.goal_active);
        assert!(progress.updated);
        assert!(!motion.retrieve_execution_progress().updated);
    }

    #[test]
    fn test_duration_factor_clamped_before_posting() {
        let motion = TrajectoryMotion::new(Arc::new(TrajectoryConfig::default()));
        motion.update_duration_factor(10.0);
        motion.generate_outputs(&input(0.0, true)).unwrap();
        assert_eq!(motion.retrieve_execution_progress().duration_factor, 5.0);

        motion.update_duration_factor(0.5);
        motion.update_duration_factor(f64::NAN);
        motion.generate_outputs(&input(0.004, false)).unwrap();
        assert_eq!(motion.retrieve_execution_progress().duration_factor, 1.0);
    }

    #[test]
    fn test_progress_exports_queue() {
        let motion = TrajectoryMotion::new(Arc::new(TrajectoryConfig::default()));
        let points = vec![
            PointGoal::joints(Joints([1.0; 6])),
            PointGoal::joints(Joints([2.0; 6])),
        ];
        motion.add_trajectory(Trajectory::from(points.clone()), false);
        motion.generate_outputs(&input(0.0, true)).unwrap();

        let progress = motion.retrieve_execution_progress();
        assert!(progress.goal_active);
        assert_eq!(progress.active_point, Some(points[0]));
        assert_eq!(progress.active_trajectory, vec![points[1]]);
        assert_eq!(progress.pending_points, 1);
    }
}
