// src/goal.rs - Goals submitted by operators
//
// Everything except the target position is optional. Missing values are defaulted when the goal
// is activated, never rejected.
use serde::{Deserialize, Serialize};

use crate::types::{Cartesian, Euler, Joints, Quaternion};

/// Orientation of a Cartesian goal, in either representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Euler(Euler),
    Quaternion(Quaternion),
}

/// Joint space part of a point goal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointGoal {
    pub position: Joints,
    #[serde(default)]
    pub velocity: Option<Joints>,
    #[serde(default)]
    pub acceleration: Option<Joints>,
}

/// Cartesian part of a point goal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CartesianGoal {
    pub position: Cartesian,
    #[serde(default)]
    pub orientation: Option<Orientation>,
    #[serde(default)]
    pub linear_velocity: Option<Cartesian>,
    #[serde(default)]
    pub angular_velocity: Option<Euler>,
}

/// One point of a trajectory.
///
/// The part matching the controller's active motion mode is followed; a point without that part
/// holds the current references for its duration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointGoal {
    #[serde(default)]
    pub joints: Option<JointGoal>,
    #[serde(default)]
    pub cartesian: Option<CartesianGoal>,
    /// Time to reach the point [s]; estimated from the distance when missing.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Radius [deg or mm] the point must be reached within before the next point starts.
    #[serde(default)]
    pub reach_radius: Option<f64>,
}

impl PointGoal {
    pub fn joints(position: Joints) -> Self {
        Self {
            joints: Some(JointGoal {
                position,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn cartesian(position: Cartesian, orientation: Option<Orientation>) -> Self {
        Self {
            cartesian: Some(CartesianGoal {
                position,
                orientation,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_reach_radius(mut self, radius: f64) -> Self {
        self.reach_radius = Some(radius);
        self
    }
}

/// Static position goal, followed until the static goal execution is finished.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StaticPositionGoal {
    #[serde(default)]
    pub joints: Option<Joints>,
    #[serde(default)]
    pub position: Option<Cartesian>,
    #[serde(default)]
    pub orientation: Option<Orientation>,
}

/// Static velocity goal, followed until the static goal execution is finished.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StaticVelocityGoal {
    #[serde(default)]
    pub joints: Option<Joints>,
    #[serde(default)]
    pub linear: Option<Cartesian>,
    #[serde(default)]
    pub angular: Option<Euler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaticGoal {
    Position(StaticPositionGoal),
    Velocity(StaticVelocityGoal),
}
