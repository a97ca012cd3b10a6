// src/interpolation.rs - Interpolation service seam
//
// The interpolation service turns a goal and its timing conditions into references at each
// sample instant. Curve fitting is left to the service; `LinearInterpolator` is the bundled
// reference service, blending positions linearly and integrating velocity ramps.
use std::f64::consts::PI;

use nalgebra::UnitQuaternion;

use crate::config::SplineMethod;
use crate::motion::MotionError;
use crate::types::{Cartesian, Euler, MotionMode, Quaternion, RobotPoint};

/// What kind of motion the interpolation should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    /// Move the positions to the goal within the duration, then hold them.
    #[default]
    Normal,
    /// Decay the start velocities to zero over the duration; positions follow the velocities.
    RampDown,
    /// Like `Normal`, for a static position goal.
    StaticPosition,
    /// Ramp the start velocities to the goal velocities, then keep moving with them.
    StaticVelocity,
}

/// Timing conditions for one motion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatorConditions {
    /// Duration [s] of the motion step.
    pub duration: f64,
    pub mode: MotionMode,
    pub spline_method: SplineMethod,
    pub operation: Operation,
}

impl Default for InterpolatorConditions {
    fn default() -> Self {
        Self {
            duration: crate::types::LOWEST_SAMPLE_TIME,
            mode: MotionMode::Joint,
            spline_method: SplineMethod::Linear,
            operation: Operation::Normal,
        }
    }
}

/// Interpolation service consumed by the motion step.
pub trait Interpolator: Send {
    /// Prepare a new motion step from `start` towards `goal`.
    fn update(
        &mut self,
        start: &RobotPoint,
        goal: &RobotPoint,
        conditions: &InterpolatorConditions,
    ) -> Result<(), MotionError>;

    /// Write the references at `time` [s] since the update into `output`.
    fn evaluate(&mut self, output: &mut RobotPoint, sample_time: f64, time: f64);
}

/// Raised cosine weight going from 1 to 0 as `x` goes from 0 to 1.
pub(crate) fn decay_weight(x: f64) -> f64 {
    0.5 * (PI * x.clamp(0.0, 1.0)).cos() + 0.5
}

/// Reference interpolation service: linear position blending and raised cosine velocity ramps.
///
/// The requested spline method is accepted but every method is blended linearly.
#[derive(Debug, Clone, Default)]
pub struct LinearInterpolator {
    start: RobotPoint,
    goal: RobotPoint,
    current: RobotPoint,
    conditions: InterpolatorConditions,
}

impl LinearInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    fn blend(&mut self, s: f64, moving: bool) {
        let duration = self.conditions.duration;
        match self.conditions.mode {
            MotionMode::Joint => {
                let start = &self.start.joints;
                let goal = &self.goal.joints;
                self.current.joints.position = start.position.zip_map(&goal.position, |a, b| a + s * (b - a));
                self.current.joints.velocity = if moving {
                    start.position.zip_map(&goal.position, |a, b| (b - a) / duration)
                } else {
                    goal.velocity
                };
            }
            MotionMode::Pose => {
                let start = &self.start.cartesian;
                let goal = &self.goal.cartesian;
                let p0 = start.pose.position.to_vector();
                let p1 = goal.pose.position.to_vector();
                let q0 = start.pose.quaternion.to_unit();
                let q1 = goal.pose.quaternion.to_unit();
                let q = q0.try_slerp(&q1, s, 1e-9).unwrap_or(q1);

                let cartesian = &mut self.current.cartesian;
                cartesian.pose.position = Cartesian::from_vector(&(p0 + (p1 - p0) * s));
                cartesian.pose.quaternion = Quaternion::from_unit(&q);
                cartesian.pose.euler = cartesian.pose.quaternion.to_euler();
                if moving {
                    let rotation = (q1 * q0.inverse()).scaled_axis().map(f64::to_degrees);
                    cartesian.linear_velocity = Cartesian::from_vector(&((p1 - p0) / duration));
                    cartesian.angular_velocity = Euler::from_vector(&(rotation / duration));
                } else {
                    cartesian.linear_velocity = goal.linear_velocity;
                    cartesian.angular_velocity = goal.angular_velocity;
                }
            }
        }
    }

    fn integrate(&mut self, s: f64, sample_time: f64) {
        let w = decay_weight(s);
        match self.conditions.mode {
            MotionMode::Joint => {
                let start = &self.start.joints;
                let goal = &self.goal.joints;
                let velocity = goal.velocity.zip_map(&start.velocity, |target, initial| target + (initial - target) * w);
                let joints = &mut self.current.joints;
                joints.position = joints.position.zip_map(&velocity, |p, v| p + v * sample_time);
                joints.velocity = velocity;
            }
            MotionMode::Pose => {
                let start = &self.start.cartesian;
                let goal = &self.goal.cartesian;
                let linear = goal.linear_velocity.to_vector()
                    + (start.linear_velocity.to_vector() - goal.linear_velocity.to_vector()) * w;
                let angular = goal.angular_velocity.to_vector()
                    + (start.angular_velocity.to_vector() - goal.angular_velocity.to_vector()) * w;

                let cartesian = &mut self.current.cartesian;
                let position = cartesian.pose.position.to_vector() + linear * sample_time;
                let step = UnitQuaternion::from_scaled_axis(angular.map(f64::to_radians) * sample_time);
                let q = step * cartesian.pose.quaternion.to_unit();
                cartesian.pose.position = Cartesian::from_vector(&position);
                cartesian.pose.quaternion = Quaternion::from_unit(&q);
                cartesian.pose.euler = cartesian.pose.quaternion.to_euler();
                cartesian.linear_velocity = Cartesian::from_vector(&linear);
                cartesian.angular_velocity = Euler::from_vector(&angular);
            }
        }
    }
}

impl Interpolator for LinearInterpolator {
    fn update(
        &mut self,
        start: &RobotPoint,
        goal: &RobotPoint,
        conditions: &InterpolatorConditions,
    ) -> Result<(), MotionError> {
        if !conditions.duration.is_finite() || conditions.duration <= 0.0 {
            return Err(MotionError::Interpolation(format!(
                "duration must be > 0, got {}",
                conditions.duration
            )));
        }
        if !start.is_finite() || !goal.is_finite() {
            return Err(MotionError::Interpolation("non-finite start or goal values".to_string()));
        }
        self.start = *start;
        self.goal = *goal;
        self.current = *start;
        self.conditions = *conditions;
        Ok(())
    }

    fn evaluate(&mut self, output: &mut RobotPoint, sample_time: f64, time: f64) {
        let s = (time / self.conditions.duration).clamp(0.0, 1.0);
        match self.conditions.operation {
            Operation::Normal | Operation::StaticPosition => self.blend(s, time < self.conditions.duration),
            Operation::RampDown | Operation::StaticVelocity => self.integrate(s, sample_time),
        }
        self.current.clear_accelerations();
        *output = self.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Joints, Pose};

    fn conditions(duration: f64, mode: MotionMode, operation: Operation) -> InterpolatorConditions {
        InterpolatorConditions {
            duration,
            mode,
            spline_method: SplineMethod::Linear,
            operation,
        }
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let mut interpolator = LinearInterpolator::new();
        let point = RobotPoint::default();
        let result = interpolator.update(&point, &point, &conditions(0.0, MotionMode::Joint, Operation::Normal));
        assert!(matches!(result, Err(MotionError::Interpolation(_))));
    }

    #[test]
    fn test_joint_blend_reaches_goal_and_holds() {
        let mut interpolator = LinearInterpolator::new();
        let start = RobotPoint::default();
        let mut goal = RobotPoint::default();
        goal.joints.position = Joints([10.0, 0.0, 0.0, 0.0, 0.0, -10.0]);
        interpolator.update(&start, &goal, &conditions(1.0, MotionMode::Joint, Operation::Normal)).unwrap();

        let mut out = RobotPoint::default();
        interpolator.evaluate(&mut out, 0.004, 0.5);
        assert!((out.joints.position.0[0] - 5.0).abs() < 1e-9);
        assert!((out.joints.velocity.0[0] - 10.0).abs() < 1e-9);
        assert!((out.joints.velocity.0[5] + 10.0).abs() < 1e-9);

        interpolator.evaluate(&mut out, 0.004, 1.5);
        assert_eq!(out.joints.position, goal.joints.position);
        assert_eq!(out.joints.velocity, Joints::zero());
    }

    #[test]
    fn test_ramp_down_decays_monotonically_to_zero() {
        let mut interpolator = LinearInterpolator::new();
        let mut start = RobotPoint::default();
        start.joints.velocity = Joints([10.0; 6]);
        let goal = start.at_rest();
        interpolator.update(&start, &goal, &conditions(1.0, MotionMode::Joint, Operation::RampDown)).unwrap();

        let mut out = RobotPoint::default();
        let mut previous = f64::INFINITY;
        let mut time = 0.0;
        for _ in 0..300 {
            time += 0.004;
            interpolator.evaluate(&mut out, 0.004, time);
            let v = out.joints.velocity.0[0];
            assert!(v <= previous);
            assert!(v >= 0.0);
            previous = v;
        }
        assert_eq!(out.joints.velocity, Joints::zero());
        assert!(out.joints.position.0[0] > 0.0);
    }

    #[test]
    fn test_static_velocity_keeps_moving_after_ramp() {
        let mut interpolator = LinearInterpolator::new();
        let start = RobotPoint::default();
        let mut goal = RobotPoint::default();
        goal.cartesian.linear_velocity = Cartesian::new(50.0, 0.0, 0.0);
        interpolator.update(&start, &goal, &conditions(0.1, MotionMode::Pose, Operation::StaticVelocity)).unwrap();

        let mut out = RobotPoint::default();
        let mut time = 0.0;
        for _ in 0..100 {
            time += 0.004;
            interpolator.evaluate(&mut out, 0.004, time);
        }
        assert!((out.cartesian.linear_velocity.x - 50.0).abs() < 1e-9);
        let x = out.cartesian.pose.position.x;
        interpolator.evaluate(&mut out, 0.004, time + 0.004);
        assert!((out.cartesian.pose.position.x - x - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_pose_blend_slerps_orientation() {
        let mut interpolator = LinearInterpolator::new();
        let mut start = RobotPoint::default();
        start.cartesian.pose = Pose::from_euler(Cartesian::default(), Euler::default());
        let mut goal = RobotPoint::default();
        goal.cartesian.pose = Pose::from_euler(Cartesian::new(100.0, 0.0, 0.0), Euler::new(0.0, 0.0, 90.0));
        interpolator.update(&start, &goal, &conditions(2.0, MotionMode::Pose, Operation::Normal)).unwrap();

        let mut out = RobotPoint::default();
        interpolator.evaluate(&mut out, 0.004, 1.0);
        assert!((out.cartesian.pose.position.x - 50.0).abs() < 1e-9);
        assert!((out.cartesian.pose.euler.z - 45.0).abs() < 1e-6);
        assert!((out.cartesian.angular_velocity.z - 45.0).abs() < 1e-6);
        assert!((out.cartesian.linear_velocity.x - 50.0).abs() < 1e-9);
    }
}
