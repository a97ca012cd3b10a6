// Benchmark for the per-cycle entry point
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use trajectory_motion::{
    Cartesian, CycleInput, Euler, Feedback, Joints, MotionMode, Orientation, PointGoal, Trajectory,
    TrajectoryConfig, TrajectoryInterface,
};

fn run_cycles(interface: &TrajectoryInterface, mode: MotionMode, cycles: usize) {
    let mut input = CycleInput {
        feedback: Feedback {
            mode,
            ..Default::default()
        },
        first_message: true,
    };
    for _ in 0..cycles {
        let command = interface.callback(&input).unwrap();
        input.feedback.robot = command.references;
        input.feedback.time += 0.004;
        input.first_message = false;
    }
}

fn bench_joint_cycles(c: &mut Criterion) {
    let trajectory: Trajectory = (0..1_000)
        .map(|i| PointGoal::joints(Joints([(i % 90) as f64; 6])).with_duration(0.02))
        .collect();
    c.bench_function("1000 joint cycles", |b| {
        b.iter(|| {
            let interface = TrajectoryInterface::new(TrajectoryConfig::default()).unwrap();
            interface.add_trajectory(trajectory.clone(), false);
            run_cycles(&interface, MotionMode::Joint, 1_000);
        });
    });
}

fn bench_pose_cycles(c: &mut Criterion) {
    let trajectory: Trajectory = (0..1_000)
        .map(|i| {
            let x = (i % 100) as f64;
            PointGoal::cartesian(Cartesian::new(x, 0.0, 500.0), Some(Orientation::Euler(Euler::new(0.0, 90.0, x))))
                .with_duration(0.02)
        })
        .collect();
    c.bench_function("1000 pose cycles", |b| {
        b.iter(|| {
            let interface = TrajectoryInterface::new(TrajectoryConfig::default()).unwrap();
            interface.add_trajectory(trajectory.clone(), false);
            run_cycles(&interface, MotionMode::Pose, 1_000);
        });
    });
}

criterion_group!(benches, bench_joint_cycles, bench_pose_cycles);
criterion_main!(benches);
