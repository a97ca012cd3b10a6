// src/motion/controller.rs - Output controller turning references and feedback into commands
use std::f64::consts::PI;

use crate::config::{SplineMethod, TrajectoryConfig};
use crate::motion::state::State;
use crate::motion::step::MotionStep;
use crate::types::{Cartesian, CartesianMotion, Command, Euler, JointMotion, MotionMode, Quaternion, RobotPoint};

/// Complementary raised cosine weights over the motion step: `a` decays 1 -> 0, `b` rises 0 -> 1.
fn ramp_weights(x: f64) -> (f64, f64) {
    let x = x.clamp(0.0, 1.0);
    let a = 0.5 * (PI * x).cos() + 0.5;
    let b = 0.5 * (PI * x + PI).cos() + 0.5;
    (a, b)
}

#[derive(Debug, Clone, Default)]
pub struct OutputController {
    mode: MotionMode,
    /// References when the motion step started.
    initial_references: RobotPoint,
    /// Shape velocity transitions for the active motion step.
    do_velocity_transition: bool,
    correction_gain: f64,
}

impl OutputController {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn is_transition_active(&self) -> bool {
        self.do_velocity_transition
    }

    /// Capture the start of a new motion step.
    pub fn update(&mut self, state: State, step: &MotionStep, config: &TrajectoryConfig) {
        self.mode = step.mode();
        self.initial_references = *step.interpolation();
        let linear = config.spline_method == SplineMethod::Linear;
        self.do_velocity_transition = state == State::Normal && (linear || step.internal_goal().reach);
        self.correction_gain = config.correction_gain;
        tracing::debug!(
            "Motion step started in {:?} mode (velocity transition: {})",
            self.mode,
            self.do_velocity_transition
        );
    }

    /// Final command for the current cycle.
    pub fn calculate(&self, step: &MotionStep) -> Command {
        let mut references = *step.interpolation();
        references.clear_accelerations();
        let feedback = &step.data().feedback;

        let x = step.data().time_passed / step.internal_goal().duration;
        let (a, b) = if self.do_velocity_transition { ramp_weights(x) } else { (0.0, 1.0) };

        match self.mode {
            MotionMode::Joint => self.calculate_joints(&mut references.joints, &feedback.joints, a, b),
            MotionMode::Pose => {
                self.calculate_linear(&mut references.cartesian, &feedback.cartesian, a, b);
                self.calculate_euler(&mut references.cartesian, &feedback.cartesian, a, b);
                self.calculate_quaternion(&mut references.cartesian, &feedback.cartesian);
            }
        }

        Command {
            mode: self.mode,
            references,
        }
    }

    /// Command holding the current reference positions.
    pub fn hold(&self, step: &MotionStep) -> Command {
        Command {
            mode: step.mode(),
            references: step.interpolation().at_rest(),
        }
    }

    fn calculate_joints(&self, references: &mut JointMotion, feedback: &JointMotion, a: f64, b: f64) {
        if !self.do_velocity_transition {
            return;
        }
        let k = self.correction_gain;
        let initial = &self.initial_references.joints.velocity;
        let blended = initial.zip_map(&references.velocity, |i, r| a * i + b * r);
        let correction = references.position.zip_map(&feedback.position, |r, f| k * (r - f));
        references.velocity = blended.zip_map(&correction, |v, c| v + c);
    }

    fn calculate_linear(&self, references: &mut CartesianMotion, feedback: &CartesianMotion, a: f64, b: f64) {
        if !self.do_velocity_transition {
            return;
        }
        let initial = self.initial_references.cartesian.linear_velocity.to_vector();
        let error = references.pose.position.to_vector() - feedback.pose.position.to_vector();
        let velocity = initial * a + references.linear_velocity.to_vector() * b + error * self.correction_gain;
        references.linear_velocity = Cartesian::from_vector(&velocity);
    }

    fn calculate_euler(&self, references: &mut CartesianMotion, feedback: &CartesianMotion, a: f64, b: f64) {
        if !self.do_velocity_transition {
            return;
        }
        // Orientation error as a rotation vector, not as Euler angle differences
        let error = (references.pose.quaternion.to_unit() * feedback.pose.quaternion.to_unit().inverse())
            .scaled_axis()
            .map(f64::to_degrees);
        let initial = self.initial_references.cartesian.angular_velocity.to_vector();
        let velocity = initial * a + references.angular_velocity.to_vector() * b + error * self.correction_gain;
        references.angular_velocity = Euler::from_vector(&velocity);
    }

    /// Normalize the reference and keep it in the same hemisphere as the feedback.
    fn calculate_quaternion(&self, references: &mut CartesianMotion, feedback: &CartesianMotion) {
        let mut quaternion = Quaternion::from_unit(&references.pose.quaternion.to_unit());
        if quaternion.dot(&feedback.pose.quaternion) < 0.0 {
            quaternion = Quaternion::new(-quaternion.u0, -quaternion.u1, -quaternion.u2, -quaternion.u3);
        }
        references.pose.quaternion = quaternion;
        references.pose.euler = quaternion.to_euler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::PointGoal;
    use crate::types::{Feedback, Joints, Pose};
    use std::sync::Arc;

    #[test]
    fn test_ramp_weights_are_complementary() {
        for i in 0..=10 {
            let (a, b) = ramp_weights(i as f64 / 10.0);
            assert!((a + b - 1.0).abs() < 1e-12);
        }
        assert_eq!(ramp_weights(0.0), (1.0, 0.0));
        let (a, b) = ramp_weights(2.0);
        assert!(a.abs() < 1e-12 && (b - 1.0).abs() < 1e-12);
    }

    fn joint_step(config: &Arc<TrajectoryConfig>, feedback_position: f64) -> MotionStep {
        let mut step = MotionStep::new(Arc::clone(config));
        let mut feedback = Feedback::default();
        feedback.robot.joints.position = Joints([feedback_position; 6]);
        step.prepare(&feedback, true);
        step.reset_session(false);
        step
    }

    #[test]
    fn test_transition_blends_from_initial_velocity() {
        let config = Arc::new(TrajectoryConfig {
            correction_gain: 0.0,
            ..Default::default()
        });
        let mut step = joint_step(&config, 0.0);
        step.prepare_normal_goal(PointGoal::joints(Joints([10.0; 6])).with_duration(1.0), false);
        step.update_interpolator().unwrap();

        let mut controller = OutputController::new();
        controller.update(State::Normal, &step, &config);
        assert!(controller.is_transition_active());

        // Starts from the initial (zero) velocity and rises towards the reference velocity
        step.evaluate_interpolator();
        let first = controller.calculate(&step);
        assert!(first.references.joints.velocity.0[0] < 0.01);
        for _ in 0..124 {
            step.evaluate_interpolator();
        }
        let half = controller.calculate(&step);
        assert!((half.references.joints.velocity.0[0] - 5.0).abs() < 1e-6);
        assert!((half.references.joints.position.0[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_correction_pulls_towards_reference() {
        let config = Arc::new(TrajectoryConfig::default());
        let mut step = joint_step(&config, 0.0);
        step.prepare_normal_goal(PointGoal::joints(Joints([0.0; 6])), true);
        step.update_interpolator().unwrap();
        let mut controller = OutputController::new();
        controller.update(State::Normal, &step, &config);

        let mut feedback = Feedback::default();
        feedback.robot.joints.position = Joints([-0.5; 6]);
        step.prepare(&feedback, false);
        step.evaluate_interpolator();
        let command = controller.calculate(&step);
        assert!((command.references.joints.velocity.0[3] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_transition_outside_normal_state() {
        let config = Arc::new(TrajectoryConfig::default());
        let mut step = joint_step(&config, 0.0);
        step.prepare_ramp_down_goal(true);
        step.update_interpolator().unwrap();
        let mut controller = OutputController::new();
        controller.update(State::RampDown, &step, &config);
        assert!(!controller.is_transition_active());
        step.evaluate_interpolator();
        assert_eq!(controller.calculate(&step).references, *step.interpolation());
    }

    #[test]
    fn test_quaternion_follows_feedback_hemisphere() {
        let config = Arc::new(TrajectoryConfig::default());
        let mut step = MotionStep::new(Arc::clone(&config));
        let mut feedback = Feedback {
            mode: MotionMode::Pose,
            ..Default::default()
        };
        let pose = Pose::from_euler(Cartesian::new(100.0, 0.0, 0.0), Euler::new(0.0, 0.0, 20.0));
        let q = pose.quaternion;
        feedback.robot.cartesian.pose = pose;
        feedback.robot.cartesian.pose.quaternion = Quaternion::new(-q.u0, -q.u1, -q.u2, -q.u3);
        step.prepare(&feedback, true);
        step.reset_session(false);
        step.prepare_normal_goal(PointGoal::cartesian(Cartesian::new(100.0, 0.0, 0.0), None), true);
        step.update_interpolator().unwrap();

        let mut controller = OutputController::new();
        controller.update(State::Normal, &step, &config);
        step.evaluate_interpolator();
        let command = controller.calculate(&step);
        let reference = command.references.cartesian.pose.quaternion;
        assert!(reference.dot(&feedback.robot.cartesian.pose.quaternion) > 0.0);
        assert!((command.references.cartesian.pose.euler.z - 20.0).abs() < 1e-6);
        assert!(command.references.cartesian.angular_velocity.z.abs() < 1e-6);
    }
}
