// src/types.rs - Geometry and per-cycle records exchanged with the robot controller
//
// Units follow the robot controller: joint angles and Euler angles in degrees, positions in
// millimetres, time in seconds. Euler angles use the ZYX convention (x = roll, y = pitch, z = yaw).
use nalgebra::{Quaternion as RawQuaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Number of robot joints handled by the interface.
pub const JOINT_COUNT: usize = 6;

/// Lowest sample time the robot controller communicates with [s].
pub const LOWEST_SAMPLE_TIME: f64 = 0.004;

/// Motion mode the robot controller is currently running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    /// Joint space references.
    #[default]
    Joint,
    /// Cartesian pose references (position + orientation).
    Pose,
}

/// Joint values (positions, velocities or accelerations) for all robot joints.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Joints(pub [f64; JOINT_COUNT]);

impl Joints {
    pub fn zero() -> Self {
        Self([0.0; JOINT_COUNT])
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self(self.0.map(f))
    }

    pub fn zip_map(&self, other: &Joints, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut values = [0.0; JOINT_COUNT];
        for (i, value) in values.iter_mut().enumerate() {
            *value = f(self.0[i], other.0[i]);
        }
        Self(values)
    }

    /// Largest absolute per-axis difference to `other`.
    pub fn max_abs_diff(&self, other: &Joints) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Cartesian vector [mm] or [mm/s].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cartesian {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Cartesian {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    /// Largest absolute per-axis difference to `other`.
    pub fn max_abs_diff(&self, other: &Cartesian) -> f64 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Euler angles [deg] or angular velocities [deg/s] around the base frame axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Euler {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Euler {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    /// Interpret the angles as ZYX Euler angles and convert them to a quaternion.
    pub fn to_quaternion(&self) -> Quaternion {
        Quaternion::from_unit(&UnitQuaternion::from_euler_angles(
            self.x.to_radians(),
            self.y.to_radians(),
            self.z.to_radians(),
        ))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Orientation quaternion, `u0` being the scalar part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub u0: f64,
    pub u1: f64,
    pub u2: f64,
    pub u3: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn new(u0: f64, u1: f64, u2: f64, u3: f64) -> Self {
        Self { u0, u1, u2, u3 }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn from_unit(q: &UnitQuaternion<f64>) -> Self {
        Self::new(q.w, q.i, q.j, q.k)
    }

    /// Normalized rotation; degenerate (zero or non-finite) quaternions fall back to identity.
    pub fn to_unit(&self) -> UnitQuaternion<f64> {
        let raw = RawQuaternion::new(self.u0, self.u1, self.u2, self.u3);
        if !self.is_finite() {
            return UnitQuaternion::identity();
        }
        UnitQuaternion::try_new(raw, 1e-9).unwrap_or_else(UnitQuaternion::identity)
    }

    pub fn to_euler(&self) -> Euler {
        let (roll, pitch, yaw) = self.to_unit().euler_angles();
        Euler::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
    }

    /// Rotation angle [deg] between two orientations, in [0, 180].
    pub fn angle_to(&self, other: &Quaternion) -> f64 {
        self.to_unit().angle_to(&other.to_unit()).to_degrees()
    }

    pub fn dot(&self, other: &Quaternion) -> f64 {
        self.u0 * other.u0 + self.u1 * other.u1 + self.u2 * other.u2 + self.u3 * other.u3
    }

    pub fn is_finite(&self) -> bool {
        self.u0.is_finite() && self.u1.is_finite() && self.u2.is_finite() && self.u3.is_finite()
    }
}

/// Cartesian pose. Both orientation representations are kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Cartesian,
    pub euler: Euler,
    pub quaternion: Quaternion,
}

impl Pose {
    pub fn from_euler(position: Cartesian, euler: Euler) -> Self {
        Self {
            position,
            euler,
            quaternion: euler.to_quaternion(),
        }
    }

    pub fn from_quaternion(position: Cartesian, quaternion: Quaternion) -> Self {
        let quaternion = Quaternion::from_unit(&quaternion.to_unit());
        Self {
            position,
            euler: quaternion.to_euler(),
            quaternion,
        }
    }
}

/// Joint space motion state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointMotion {
    pub position: Joints,
    pub velocity: Joints,
    pub acceleration: Joints,
}

/// Cartesian motion state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CartesianMotion {
    pub pose: Pose,
    pub linear_velocity: Cartesian,
    pub angular_velocity: Euler,
    pub linear_acceleration: Cartesian,
    pub angular_acceleration: Euler,
}

/// Complete robot motion state, used for goals, references, feedback and commands.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotPoint {
    pub joints: JointMotion,
    pub cartesian: CartesianMotion,
}

impl RobotPoint {
    /// Same positions, with velocities and accelerations cleared.
    pub fn at_rest(&self) -> Self {
        Self {
            joints: JointMotion {
                position: self.joints.position,
                ..Default::default()
            },
            cartesian: CartesianMotion {
                pose: self.cartesian.pose,
                ..Default::default()
            },
        }
    }

    pub fn clear_accelerations(&mut self) {
        self.joints.acceleration = Joints::zero();
        self.cartesian.linear_acceleration = Cartesian::default();
        self.cartesian.angular_acceleration = Euler::default();
    }

    pub fn is_finite(&self) -> bool {
        let joints = &self.joints;
        let cartesian = &self.cartesian;
        joints.position.is_finite()
            && joints.velocity.is_finite()
            && joints.acceleration.is_finite()
            && cartesian.pose.position.is_finite()
            && cartesian.pose.euler.is_finite()
            && cartesian.pose.quaternion.is_finite()
            && cartesian.linear_velocity.is_finite()
            && cartesian.angular_velocity.is_finite()
    }
}

/// Feedback received from the robot controller in one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Feedback {
    /// Controller timestamp [s].
    pub time: f64,
    pub mode: MotionMode,
    pub robot: RobotPoint,
}

/// Everything the transport hands over for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleInput {
    pub feedback: Feedback,
    /// First message of a new communication session.
    pub first_message: bool,
}

/// References to send back to the robot controller for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    pub mode: MotionMode,
    pub references: RobotPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euler_quaternion_conversion() {
        let euler = Euler::new(10.0, -20.0, 30.0);
        let back = euler.to_quaternion().to_euler();
        assert!((back.x - 10.0).abs() < 1e-9);
        assert!((back.y + 20.0).abs() < 1e-9);
        assert!((back.z - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_quaternion_falls_back_to_identity() {
        let q = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(Quaternion::from_unit(&q.to_unit()), Quaternion::identity());
        let q = Quaternion::new(f64::NAN, 0.0, 0.0, 0.0);
        assert_eq!(Quaternion::from_unit(&q.to_unit()), Quaternion::identity());
    }

    #[test]
    fn test_quaternion_angle_ignores_sign() {
        let q = Euler::new(0.0, 0.0, 90.0).to_quaternion();
        let negated = Quaternion::new(-q.u0, -q.u1, -q.u2, -q.u3);
        assert!(q.angle_to(&negated).abs() < 1e-6);
        assert!((Quaternion::identity().angle_to(&q) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_joints_max_abs_diff() {
        let a = Joints([0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = Joints([0.0, 1.5, 2.0, 1.0, 4.0, 5.0]);
        assert_eq!(a.max_abs_diff(&b), 2.0);
    }

    #[test]
    fn test_at_rest_keeps_positions() {
        let mut point = RobotPoint::default();
        point.joints.position = Joints([1.0; JOINT_COUNT]);
        point.joints.velocity = Joints([2.0; JOINT_COUNT]);
        point.cartesian.linear_velocity = Cartesian::new(1.0, 2.0, 3.0);
        let rest = point.at_rest();
        assert_eq!(rest.joints.position, point.joints.position);
        assert_eq!(rest.joints.velocity, Joints::zero());
        assert_eq!(rest.cartesian.linear_velocity, Cartesian::default());
    }
}
