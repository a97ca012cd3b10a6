// src/motion/step.rs - Goal conditioning for the active motion step
//
// A motion step is one activation of a goal (normal point, ramp down or static goal) together
// with its interpolation until it is superseded. The step keeps the external goal as submitted,
// the internal goal with every default filled in, and the current interpolated references.
use std::sync::Arc;

use crate::config::{DurationEstimationConfig, TrajectoryConfig};
use crate::goal::{CartesianGoal, JointGoal, Orientation, PointGoal, StaticGoal};
use crate::interpolation::{Interpolator, InterpolatorConditions, LinearInterpolator, Operation};
use crate::motion::MotionError;
use crate::types::{Cartesian, Euler, Feedback, Joints, MotionMode, Pose, RobotPoint, LOWEST_SAMPLE_TIME};

/// Strategy for estimating how long a point should take when the operator gave no duration.
pub trait DurationEstimator: Send {
    fn estimate(
        &self,
        mode: MotionMode,
        start: &RobotPoint,
        goal: &RobotPoint,
        config: &DurationEstimationConfig,
    ) -> f64;
}

/// Estimates the duration from the largest per-axis distance and the configured nominal speeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedLimitEstimator;

impl DurationEstimator for SpeedLimitEstimator {
    fn estimate(
        &self,
        mode: MotionMode,
        start: &RobotPoint,
        goal: &RobotPoint,
        config: &DurationEstimationConfig,
    ) -> f64 {
        let raw = match mode {
            MotionMode::Joint => {
                start.joints.position.max_abs_diff(&goal.joints.position) / config.joint_speed
            }
            MotionMode::Pose => {
                let from = &start.cartesian.pose;
                let to = &goal.cartesian.pose;
                let linear = from.position.max_abs_diff(&to.position) / config.linear_speed;
                let angular = from.quaternion.angle_to(&to.quaternion) / config.angular_speed;
                linear.max(angular)
            }
        };
        if raw.is_finite() {
            raw.max(config.minimum_duration)
        } else {
            config.minimum_duration
        }
    }
}

/// External goal with every default derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalGoal {
    pub point: RobotPoint,
    /// Duration [s], including the duration factor for normal goals.
    pub duration: f64,
    /// The goal must be reached within `tolerance` before the next point may start.
    pub reach: bool,
    pub tolerance: f64,
    pub operation: Operation,
    /// A ramp down goal that holds the robot until a resume arrives.
    pub hold_on_finish: bool,
}

impl InternalGoal {
    fn hold(point: RobotPoint, tolerance: f64, hold_on_finish: bool) -> Self {
        Self {
            point: point.at_rest(),
            duration: LOWEST_SAMPLE_TIME,
            reach: false,
            tolerance,
            operation: Operation::Normal,
            hold_on_finish,
        }
    }
}

/// Per-cycle process data of the motion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessData {
    pub mode: MotionMode,
    /// Time [s] passed in the active motion step.
    pub time_passed: f64,
    pub estimated_sample_time: f64,
    pub duration_factor: f64,
    pub feedback: RobotPoint,
    last_feedback_time: Option<f64>,
}

impl Default for ProcessData {
    fn default() -> Self {
        Self {
            mode: MotionMode::default(),
            time_passed: 0.0,
            estimated_sample_time: LOWEST_SAMPLE_TIME,
            duration_factor: 1.0,
            feedback: RobotPoint::default(),
            last_feedback_time: None,
        }
    }
}

impl ProcessData {
    /// Round the timestamp difference to a multiple of the lowest controller sample time.
    fn estimate_sample_time(&mut self, time: f64, session_start: bool) {
        self.estimated_sample_time = match self.last_feedback_time {
            Some(last) if !session_start && time.is_finite() && time > last => {
                ((time - last) / LOWEST_SAMPLE_TIME).round().max(1.0) * LOWEST_SAMPLE_TIME
            }
            _ => LOWEST_SAMPLE_TIME,
        };
        self.last_feedback_time = time.is_finite().then_some(time);
    }
}

pub struct MotionStep {
    data: ProcessData,
    external_goal: Option<PointGoal>,
    internal_goal: InternalGoal,
    interpolation: RobotPoint,
    interpolator: Box<dyn Interpolator>,
    estimator: Box<dyn DurationEstimator>,
    config: Arc<TrajectoryConfig>,
}

impl std::fmt::Debug for MotionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionStep")
            .field("data", &self.data)
            .field("external_goal", &self.external_goal)
            .field("internal_goal", &self.internal_goal)
            .field("interpolation", &self.interpolation)
            .finish_non_exhaustive()
    }
}

impl MotionStep {
    pub fn new(config: Arc<TrajectoryConfig>) -> Self {
        Self::with_services(config, Box::new(LinearInterpolator::new()), Box::new(SpeedLimitEstimator))
    }

    pub fn with_services(
        config: Arc<TrajectoryConfig>,
        interpolator: Box<dyn Interpolator>,
        estimator: Box<dyn DurationEstimator>,
    ) -> Self {
        let interpolation = RobotPoint::default();
        Self {
            data: ProcessData::default(),
            external_goal: None,
            internal_goal: InternalGoal::hold(interpolation, config.condition_tolerance, false),
            interpolation,
            interpolator,
            estimator,
            config,
        }
    }

    pub fn data(&self) -> &ProcessData {
        &self.data
    }

    pub fn mode(&self) -> MotionMode {
        self.data.mode
    }

    pub fn internal_goal(&self) -> &InternalGoal {
        &self.internal_goal
    }

    pub fn external_goal(&self) -> Option<&PointGoal> {
        self.external_goal.as_ref()
    }

    pub fn interpolation(&self) -> &RobotPoint {
        &self.interpolation
    }

    pub fn config(&self) -> Arc<TrajectoryConfig> {
        Arc::clone(&self.config)
    }

    /// Take in the feedback of a new cycle.
    pub fn prepare(&mut self, feedback: &Feedback, session_start: bool) {
        self.data.estimate_sample_time(feedback.time, session_start);
        self.data.mode = feedback.mode;
        self.data.feedback = feedback.robot;
    }

    /// Configuration changes only arrive between sessions.
    pub fn update_configuration(&mut self, config: Arc<TrajectoryConfig>) {
        self.config = config;
    }

    /// Reseed the references from feedback, at rest, and drop the active goal.
    pub fn reset_session(&mut self, hold_on_finish: bool) {
        self.interpolation = self.data.feedback.at_rest();
        self.external_goal = None;
        self.internal_goal = InternalGoal::hold(self.interpolation, self.config.condition_tolerance, hold_on_finish);
        self.reset_motion_step();
    }

    pub fn reset_motion_step(&mut self) {
        self.data.time_passed = 0.0;
        self.interpolation.clear_accelerations();
    }

    /// Detach the normal point being executed, if any.
    pub fn take_external_goal(&mut self) -> Option<PointGoal> {
        self.external_goal.take()
    }

    /// Transfer a dequeued point into the internal goal, deriving its missing values.
    pub fn prepare_normal_goal(&mut self, point: PointGoal, last_point: bool) {
        let start = self.interpolation;
        let mut goal = start.at_rest();
        if let Some(joints) = point.joints.as_ref() {
            transfer_joints(&mut goal, joints);
        }
        if let Some(cartesian) = point.cartesian.as_ref() {
            transfer_cartesian(&mut goal, cartesian);
        }

        let nominal = match point.duration {
            Some(duration) if duration.is_finite() && duration > 0.0 => duration,
            _ => self
                .estimator
                .estimate(self.data.mode, &start, &goal, &self.config.duration_estimation),
        };
        let tolerance = self.config.condition_tolerance;
        let (reach, tolerance) = match point.reach_radius {
            _ if last_point => (true, tolerance),
            Some(radius) if radius.is_finite() => (true, radius.max(tolerance)),
            _ => (false, tolerance),
        };

        self.external_goal = Some(point);
        self.internal_goal = InternalGoal {
            point: goal,
            duration: nominal * self.data.duration_factor,
            reach,
            tolerance,
            operation: Operation::Normal,
            hold_on_finish: false,
        };
        self.reset_motion_step();
    }

    /// Decay the current reference velocities to zero over the ramp down duration.
    pub fn prepare_ramp_down_goal(&mut self, do_stop: bool) {
        self.external_goal = None;
        self.internal_goal = InternalGoal {
            point: self.interpolation.at_rest(),
            duration: self.config.ramp_down_duration,
            reach: false,
            tolerance: self.config.condition_tolerance,
            operation: Operation::RampDown,
            hold_on_finish: do_stop,
        };
        self.reset_motion_step();
    }

    pub fn prepare_static_goal(&mut self, target: &StaticGoal, fast_transition: bool) {
        let duration = if fast_transition {
            self.config.static_goal_short_duration
        } else {
            self.config.static_goal_duration
        };
        let (point, operation) = match target {
            StaticGoal::Position(goal) => {
                let mut point = self.interpolation.at_rest();
                if let Some(joints) = goal.joints.filter(Joints::is_finite) {
                    point.joints.position = joints;
                }
                if let Some(position) = goal.position.filter(Cartesian::is_finite) {
                    point.cartesian.pose.position = position;
                }
                if let Some(orientation) = goal.orientation {
                    transfer_orientation(&mut point.cartesian.pose, &orientation);
                }
                (point, Operation::StaticPosition)
            }
            StaticGoal::Velocity(goal) => {
                let mut point = self.interpolation.at_rest();
                point.joints.velocity = goal.joints.filter(Joints::is_finite).unwrap_or_default();
                point.cartesian.linear_velocity = goal.linear.filter(Cartesian::is_finite).unwrap_or_default();
                point.cartesian.angular_velocity = goal.angular.filter(Euler::is_finite).unwrap_or_default();
                (point, Operation::StaticVelocity)
            }
        };

        self.external_goal = None;
        self.internal_goal = InternalGoal {
            point,
            duration,
            reach: false,
            tolerance: self.config.condition_tolerance,
            operation,
            hold_on_finish: false,
        };
        self.reset_motion_step();
    }

    /// Whether the feedback is within tolerance of the internal goal on every controlled axis.
    pub fn condition_met(&self) -> bool {
        let goal = &self.internal_goal.point;
        let feedback = &self.data.feedback;
        let tolerance = self.internal_goal.tolerance;
        match self.data.mode {
            MotionMode::Joint => feedback.joints.position.max_abs_diff(&goal.joints.position) < tolerance,
            MotionMode::Pose => {
                let reached = &feedback.cartesian.pose;
                let target = &goal.cartesian.pose;
                reached.position.max_abs_diff(&target.position) < tolerance
                    && reached.quaternion.angle_to(&target.quaternion) < tolerance
            }
        }
    }

    /// True once the remaining duration is below half a sample period.
    pub fn interpolation_duration_reached(&self) -> bool {
        self.internal_goal.duration - self.data.time_passed < 0.5 * self.data.estimated_sample_time
    }

    pub fn update_interpolator(&mut self) -> Result<(), MotionError> {
        let conditions = InterpolatorConditions {
            duration: self.internal_goal.duration,
            mode: self.data.mode,
            spline_method: self.config.spline_method,
            operation: self.internal_goal.operation,
        };
        self.interpolator
            .update(&self.interpolation, &self.internal_goal.point, &conditions)
    }

    pub fn evaluate_interpolator(&mut self) {
        let sample_time = self.data.estimated_sample_time;
        self.data.time_passed += sample_time;
        self.interpolator
            .evaluate(&mut self.interpolation, sample_time, self.data.time_passed);
    }

    /// Keep the reference positions and stop moving.
    pub fn hold(&mut self) {
        self.interpolation = self.interpolation.at_rest();
    }

    /// Store a new duration factor. Returns true when the in-flight normal goal was rescaled and
    /// its interpolation has to be restarted.
    pub fn apply_duration_factor(&mut self, factor: f64) -> bool {
        let previous = self.data.duration_factor;
        if (factor - previous).abs() < f64::EPSILON {
            return false;
        }
        self.data.duration_factor = factor;
        if self.external_goal.is_none() || self.internal_goal.operation != Operation::Normal {
            return false;
        }
        let remaining = self.internal_goal.duration - self.data.time_passed;
        if remaining < 0.5 * self.data.estimated_sample_time {
            return false;
        }
        self.internal_goal.duration = remaining * factor / previous;
        self.reset_motion_step();
        true
    }

    /// Allow a ramp down to be turned into a holding one.
    pub fn set_hold_on_finish(&mut self, hold: bool) {
        self.internal_goal.hold_on_finish = hold;
    }
}

fn transfer_joints(goal: &mut RobotPoint, joints: &JointGoal) {
    if !joints.position.is_finite() {
        tracing::warn!("Ignoring non-finite joint goal");
        return;
    }
    goal.joints.position = joints.position;
    goal.joints.velocity = joints.velocity.filter(Joints::is_finite).unwrap_or_default();
    goal.joints.acceleration = joints.acceleration.filter(Joints::is_finite).unwrap_or_default();
}

fn transfer_cartesian(goal: &mut RobotPoint, cartesian: &CartesianGoal) {
    if !cartesian.position.is_finite() {
        tracing::warn!("Ignoring non-finite Cartesian goal");
        return;
    }
    goal.cartesian.pose.position = cartesian.position;
    if let Some(orientation) = cartesian.orientation.as_ref() {
        transfer_orientation(&mut goal.cartesian.pose, orientation);
    }
    goal.cartesian.linear_velocity = cartesian.linear_velocity.filter(Cartesian::is_finite).unwrap_or_default();
    goal.cartesian.angular_velocity = cartesian.angular_velocity.filter(Euler::is_finite).unwrap_or_default();
}

fn transfer_orientation(pose: &mut Pose, orientation: &Orientation) {
    match orientation {
        Orientation::Euler(euler) if euler.is_finite() => transfer_euler(pose, euler),
        Orientation::Quaternion(quaternion) if quaternion.is_finite() => {
            *pose = Pose::from_quaternion(pose.position, *quaternion);
        }
        _ => tracing::warn!("Ignoring non-finite orientation goal"),
    }
}

fn transfer_euler(pose: &mut Pose, euler: &Euler) {
    *pose = Pose::from_euler(pose.position, *euler);
}
