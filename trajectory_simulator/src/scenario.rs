//! Built-in operator scripts played against the cycle loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::Sender;
use trajectory_motion::{
    Cartesian, Euler, Joints, MotionMode, Orientation, PointGoal, StaticPositionGoal, StaticVelocityGoal,
    Trajectory, TrajectoryConfig, TrajectoryInterface,
};

use crate::output::SimEvent;

pub const SCENARIOS: [(&str, &str); 6] = [
    ("baseline", "Two joint trajectories executed back to back"),
    ("stop_resume", "Stop in the middle of a trajectory, resume later"),
    ("override", "Replace the pending trajectories while executing"),
    ("static_goal", "Follow a static velocity goal, then resume the trajectories"),
    ("pose", "Cartesian trajectory with Euler and quaternion orientations"),
    ("session_restart", "Reconfigure and restart the session mid-trajectory"),
];

/// State shared between the cycle loop and the operator.
#[derive(Debug, Default)]
pub struct SessionControl {
    pub cycle: AtomicUsize,
    pub restart: AtomicBool,
    pub finished: AtomicBool,
}

#[derive(Debug, Clone)]
pub enum Action {
    AddTrajectory { trajectory: Trajectory, override_pending: bool },
    Stop { discard: bool },
    Resume,
    DurationFactor(f64),
    StartStaticGoal { discard: bool },
    StaticPosition { goal: StaticPositionGoal, fast: bool },
    StaticVelocity { goal: StaticVelocityGoal, fast: bool },
    FinishStaticGoal { resume: bool },
    SetConfiguration(Box<TrajectoryConfig>),
    RestartSession,
}

impl Action {
    pub fn apply(&self, interface: &TrajectoryInterface, control: &SessionControl) {
        match self {
            Action::AddTrajectory { trajectory, override_pending } => {
                interface.add_trajectory(trajectory.clone(), *override_pending)
            }
            Action::Stop { discard } => interface.stop(*discard),
            Action::Resume => interface.resume(),
            Action::DurationFactor(factor) => interface.update_duration_factor(*factor),
            Action::StartStaticGoal { discard } => interface.start_static_goal(*discard),
            Action::StaticPosition { goal, fast } => interface.set_static_position_goal(*goal, *fast),
            Action::StaticVelocity { goal, fast } => interface.set_static_velocity_goal(*goal, *fast),
            Action::FinishStaticGoal { resume } => interface.finish_static_goal(*resume),
            Action::SetConfiguration(config) => interface.set_configuration(config.as_ref().clone()),
            Action::RestartSession => control.restart.store(true, Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub mode: MotionMode,
    /// Actions keyed by simulated time [s], in order.
    pub actions: Vec<(f64, Action)>,
}

fn joint_trajectory(targets: &[f64]) -> Trajectory {
    targets
        .iter()
        .map(|&t| PointGoal::joints(Joints([t, -t / 2.0, t / 3.0, 0.0, t / 4.0, -t])))
        .collect()
}

fn add(trajectory: Trajectory) -> Action {
    Action::AddTrajectory {
        trajectory,
        override_pending: false,
    }
}

impl Scenario {
    pub fn builtin(name: &str, base: &TrajectoryConfig) -> Option<Self> {
        let first = joint_trajectory(&[10.0, 20.0, 5.0, 30.0]);
        let second = joint_trajectory(&[-10.0, 0.0]);
        let (mode, actions) = match name {
            "baseline" => (MotionMode::Joint, vec![(0.0, add(first)), (0.5, add(second))]),
            "stop_resume" => (
                MotionMode::Joint,
                vec![
                    (0.0, add(first)),
                    (1.0, Action::Stop { discard: false }),
                    (3.0, Action::Resume),
                    (3.5, Action::DurationFactor(2.0)),
                ],
            ),
            "override" => (
                MotionMode::Joint,
                vec![
                    (0.0, add(first)),
                    (0.0, add(second)),
                    (
                        1.0,
                        Action::AddTrajectory {
                            trajectory: joint_trajectory(&[40.0, 0.0]),
                            override_pending: true,
                        },
                    ),
                ],
            ),
            "static_goal" => (
                MotionMode::Joint,
                vec![
                    (0.0, add(first)),
                    (1.0, Action::StartStaticGoal { discard: false }),
                    (
                        1.2,
                        Action::StaticVelocity {
                            goal: StaticVelocityGoal {
                                joints: Some(Joints([5.0, 0.0, 0.0, 0.0, 0.0, -5.0])),
                                ..Default::default()
                            },
                            fast: false,
                        },
                    ),
                    (
                        4.0,
                        Action::StaticPosition {
                            goal: StaticPositionGoal {
                                joints: Some(Joints([0.0; 6])),
                                ..Default::default()
                            },
                            fast: false,
                        },
                    ),
                    (6.5, Action::FinishStaticGoal { resume: true }),
                ],
            ),
            "pose" => {
                let trajectory: Trajectory = vec![
                    PointGoal::cartesian(
                        Cartesian::new(500.0, 100.0, 400.0),
                        Some(Orientation::Euler(Euler::new(0.0, 90.0, 0.0))),
                    ),
                    PointGoal::cartesian(
                        Cartesian::new(500.0, -100.0, 400.0),
                        Some(Orientation::Euler(Euler::new(0.0, 90.0, 30.0))),
                    )
                    .with_reach_radius(5.0),
                    PointGoal::cartesian(Cartesian::new(450.0, 0.0, 500.0), None).with_duration(1.5),
                ]
                .into();
                (MotionMode::Pose, vec![(0.0, add(trajectory))])
            }
            "session_restart" => {
                let update = TrajectoryConfig {
                    ramp_down_duration: base.ramp_down_duration * 2.0,
                    ..base.clone()
                };
                (
                    MotionMode::Joint,
                    vec![
                        (0.0, add(first)),
                        (0.5, Action::SetConfiguration(Box::new(update))),
                        (1.5, Action::RestartSession),
                        (2.0, Action::Stop { discard: false }),
                        (4.5, Action::Resume),
                    ],
                )
            }
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            mode,
            actions,
        })
    }

    /// Play the actions as the simulated time passes.
    pub async fn run(
        &self,
        interface: &TrajectoryInterface,
        control: &SessionControl,
        sample_time: f64,
        events: &Sender<SimEvent>,
    ) {
        for (at, action) in &self.actions {
            let due = (at / sample_time).round() as usize;
            while control.cycle.load(Ordering::SeqCst) < due {
                if control.finished.load(Ordering::SeqCst) {
                    tracing::warn!("Simulation ended before all operator actions were applied");
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            action.apply(interface, control);
            events
                .send(SimEvent::Operator {
                    time: *at,
                    action: format!("{:?}", action),
                })
                .ok();
        }
    }
}
