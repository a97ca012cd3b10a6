// trajectory_motion: trajectory-following motion core for a real-time robot control interface
//
// The transport calls `TrajectoryInterface::callback` once per controller sample; operators
// queue trajectories and steer execution through the same handle from any thread.

pub mod config;
pub mod goal;
pub mod interface;
pub mod interpolation;
pub mod motion;
pub mod trajectory;
pub mod types;

pub use config::{load_config, ConfigError, DurationEstimationConfig, SplineMethod, TrajectoryConfig};
pub use goal::{CartesianGoal, JointGoal, Orientation, PointGoal, StaticGoal, StaticPositionGoal, StaticVelocityGoal};
pub use interface::TrajectoryInterface;
pub use interpolation::{Interpolator, InterpolatorConditions, LinearInterpolator, Operation};
pub use motion::state::{ExecutionProgress, ExecutionState};
pub use motion::step::{DurationEstimator, SpeedLimitEstimator};
pub use motion::{MotionError, TrajectoryMotion};
pub use trajectory::{Trajectory, TrajectoryQueue};
pub use types::{Cartesian, Command, CycleInput, Euler, Feedback, Joints, MotionMode, Pose, Quaternion, RobotPoint};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a guarded region, recovering the data if another thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
