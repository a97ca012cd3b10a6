//! Simulated robot: first-order tracking of the commanded positions plus measurement noise.

use trajectory_motion::{Command, Feedback, MotionMode, RobotPoint};

#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    state: RobotPoint,
    /// Tracking time constant [s]; zero tracks the references exactly.
    time_constant: f64,
    /// Peak-to-peak measurement noise [deg or mm].
    noise: f64,
}

impl SimulatedRobot {
    pub fn new(initial: RobotPoint, time_constant: f64, noise: f64) -> Self {
        Self {
            state: initial.at_rest(),
            time_constant,
            noise,
        }
    }

    pub fn state(&self) -> &RobotPoint {
        &self.state
    }

    fn noise(&self) -> f64 {
        if self.noise > 0.0 {
            self.noise * (rand::random::<f64>() - 0.5)
        } else {
            0.0
        }
    }

    /// Measured state as reported by the controller.
    pub fn feedback(&self, time: f64, mode: MotionMode) -> Feedback {
        let mut robot = self.state;
        robot.joints.position = robot.joints.position.map(|p| p + self.noise());
        let position = &mut robot.cartesian.pose.position;
        position.x += self.noise();
        position.y += self.noise();
        position.z += self.noise();
        Feedback { time, mode, robot }
    }

    /// Move towards the commanded references for one sample.
    pub fn track(&mut self, command: &Command, dt: f64) {
        let alpha = if self.time_constant > 0.0 {
            1.0 - (-dt / self.time_constant).exp()
        } else {
            1.0
        };
        let references = &command.references;
        let previous = self.state;

        let joints = &mut self.state.joints;
        joints.position = previous
            .joints
            .position
            .zip_map(&references.joints.position, |p, r| p + alpha * (r - p));
        joints.velocity = joints
            .position
            .zip_map(&previous.joints.position, |p, q| (p - q) / dt);

        let cartesian = &mut self.state.cartesian;
        let from = previous.cartesian.pose.position.to_vector();
        let to = from + (references.cartesian.pose.position.to_vector() - from) * alpha;
        cartesian.pose = references.cartesian.pose;
        cartesian.pose.position = trajectory_motion::Cartesian::from_vector(&to);
        cartesian.linear_velocity = trajectory_motion::Cartesian::from_vector(&((to - from) / dt));
        cartesian.angular_velocity = references.cartesian.angular_velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trajectory_motion::Joints;

    #[test]
    fn test_converges_to_references() {
        let mut robot = SimulatedRobot::new(RobotPoint::default(), 0.02, 0.0);
        let mut command = Command::default();
        command.references.joints.position = Joints([10.0; 6]);
        for _ in 0..500 {
            robot.track(&command, 0.004);
        }
        assert!(robot.state().joints.position.max_abs_diff(&Joints([10.0; 6])) < 1e-6);
        assert!(robot.state().joints.velocity.0[0].abs() < 1e-3);
    }

    #[test]
    fn test_exact_tracking_without_time_constant() {
        let mut robot = SimulatedRobot::new(RobotPoint::default(), 0.0, 0.0);
        let mut command = Command::default();
        command.references.joints.position = Joints([1.0; 6]);
        robot.track(&command, 0.004);
        assert_eq!(robot.feedback(0.0, MotionMode::Joint).robot.joints.position, Joints([1.0; 6]));
    }
}
