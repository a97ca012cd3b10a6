//! Simulation harness: plays the controller transport against a simulated robot while a scripted
//! operator steers the trajectory motion from a separate task.

mod output;
mod robot;
mod scenario;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Sender};
use serde::Deserialize;
use thiserror::Error;
use trajectory_motion::{
    Cartesian, CycleInput, Euler, ExecutionState, MotionError, MotionMode, Pose, RobotPoint, TrajectoryConfig,
    TrajectoryInterface,
};

use output::{CycleRecord, SimEvent};
use robot::SimulatedRobot;
use scenario::{Scenario, SessionControl, SCENARIOS};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),
    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("Invalid simulation settings: {0}")]
    Invalid(String),
    #[error("Task failed: {0}")]
    Task(String),
}

/// Trajectory motion simulation harness
#[derive(Parser, Debug)]
#[command(name = "trajectory-sim", about = "Drive the trajectory motion core against a simulated robot.")]
struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for CSV/JSONL results
    #[arg(short, long, default_value = "./sim_output")]
    output: PathBuf,

    /// Scenario to run
    #[arg(long, default_value = "baseline")]
    scenario: String,

    /// Number of cycles (overrides the config file)
    #[arg(long)]
    cycles: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available built-in scenarios
    ListScenarios,
    /// Run a single scenario (default)
    Run,
}

#[derive(Debug, Clone, Deserialize)]
struct SimulationSettings {
    #[serde(default = "default_cycles")]
    cycles: usize,
    /// Controller sample time [s].
    #[serde(default = "default_sample_time")]
    sample_time: f64,
    /// Simulated seconds per wall clock second.
    #[serde(default = "default_speedup")]
    speedup: f64,
    #[serde(default = "default_time_constant")]
    time_constant: f64,
    #[serde(default)]
    noise: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            sample_time: default_sample_time(),
            speedup: default_speedup(),
            time_constant: default_time_constant(),
            noise: 0.0,
        }
    }
}

impl SimulationSettings {
    fn validate(&self) -> Result<(), SimError> {
        if !(self.sample_time.is_finite() && self.sample_time > 0.0) {
            return Err(SimError::Invalid(format!("sample_time must be > 0, got {}", self.sample_time)));
        }
        if !(self.speedup.is_finite() && self.speedup > 0.0) {
            return Err(SimError::Invalid(format!("speedup must be > 0, got {}", self.speedup)));
        }
        if !(self.time_constant.is_finite() && self.time_constant >= 0.0) {
            return Err(SimError::Invalid(format!("time_constant must be >= 0, got {}", self.time_constant)));
        }
        Ok(())
    }
}

fn default_cycles() -> usize { 2500 }
fn default_sample_time() -> f64 { 0.004 }
fn default_speedup() -> f64 { 1.0 }
fn default_time_constant() -> f64 { 0.02 }

#[derive(Debug, Clone, Default, Deserialize)]
struct SimConfig {
    #[serde(default)]
    simulation: SimulationSettings,
    #[serde(default)]
    trajectory: TrajectoryConfig,
}

fn load_sim_config(path: &Path) -> Result<SimConfig, SimError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        SimError::Io(e)
    })?;
    let config: SimConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        SimError::Toml(e)
    })?;
    config.simulation.validate()?;
    Ok(config)
}

fn initial_state(mode: MotionMode) -> RobotPoint {
    let mut initial = RobotPoint::default();
    if mode == MotionMode::Pose {
        initial.cartesian.pose = Pose::from_euler(
            Cartesian::new(450.0, 0.0, 500.0),
            Euler::new(0.0, 90.0, 0.0),
        );
    }
    initial
}

/// Transport side: one callback per controller sample.
fn run_cycles(
    interface: Arc<TrajectoryInterface>,
    mut robot: SimulatedRobot,
    mode: MotionMode,
    settings: SimulationSettings,
    control: Arc<SessionControl>,
    events: Sender<SimEvent>,
) -> Result<usize, SimError> {
    let pace = Duration::from_secs_f64(settings.sample_time / settings.speedup);
    let mut time = 0.0;
    let mut first_message = true;
    let mut last_state = ExecutionState::Undefined;

    for cycle in 0..settings.cycles {
        if control.restart.swap(false, Ordering::SeqCst) {
            first_message = true;
        }
        if first_message {
            events.send(SimEvent::SessionStarted { cycle }).ok();
        }
        let input = CycleInput {
            feedback: robot.feedback(time, mode),
            first_message,
        };
        first_message = false;

        let command = match interface.callback(&input) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("Cycle {} failed: {}", cycle, e);
                control.finished.store(true, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        robot.track(&command, settings.sample_time);

        let progress = interface.retrieve_execution_progress();
        if progress.state != last_state {
            events
                .send(SimEvent::StateChanged {
                    cycle,
                    from: last_state,
                    to: progress.state,
                })
                .ok();
            last_state = progress.state;
        }
        events
            .send(SimEvent::Cycle(Box::new(CycleRecord::new(cycle, time, &progress, &command))))
            .ok();

        control.cycle.store(cycle + 1, Ordering::SeqCst);
        time += settings.sample_time;
        std::thread::sleep(pace);
    }

    control.finished.store(true, Ordering::SeqCst);
    Ok(settings.cycles)
}

#[tokio::main]
async fn main() -> Result<(), SimError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    if let Some(Commands::ListScenarios) = cli.command {
        for (name, description) in SCENARIOS {
            println!("{:<16} {}", name, description);
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_sim_config(path)?,
        None => SimConfig::default(),
    };
    if let Some(cycles) = cli.cycles {
        config.simulation.cycles = cycles;
    }
    let scenario = Scenario::builtin(&cli.scenario, &config.trajectory)
        .ok_or_else(|| SimError::UnknownScenario(cli.scenario.clone()))?;
    tracing::info!("Running scenario '{}' for {} cycles", scenario.name, config.simulation.cycles);

    std::fs::create_dir_all(&cli.output).map_err(|e| {
        tracing::error!("Failed to create output directory {}: {}", cli.output.display(), e);
        SimError::Io(e)
    })?;

    let interface = Arc::new(TrajectoryInterface::new(config.trajectory.clone())?);
    let control = Arc::new(SessionControl::default());
    let (event_tx, event_rx) = unbounded::<SimEvent>();
    let writer = output::spawn_writer(event_rx, &cli.output)?;

    let robot = SimulatedRobot::new(
        initial_state(scenario.mode),
        config.simulation.time_constant,
        config.simulation.noise,
    );
    let cycle_loop = {
        let interface = Arc::clone(&interface);
        let control = Arc::clone(&control);
        let events = event_tx.clone();
        let settings = config.simulation.clone();
        let mode = scenario.mode;
        tokio::task::spawn_blocking(move || run_cycles(interface, robot, mode, settings, control, events))
    };

    scenario
        .run(&interface, &control, config.simulation.sample_time, &event_tx)
        .await;
    drop(event_tx);

    let cycles = cycle_loop.await.map_err(|e| SimError::Task(e.to_string()))??;
    let written = tokio::task::spawn_blocking(move || writer.join())
        .await
        .map_err(|e| SimError::Task(e.to_string()))?
        .map_err(|_| SimError::Task("output writer panicked".to_string()))??;

    let progress = interface.retrieve_execution_progress();
    tracing::info!(
        "Finished {} cycles ({} records) in state {:?}, {} points pending",
        cycles,
        written,
        progress.state,
        progress.pending_points
    );
    tracing::info!("Results written to {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_sim_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[simulation]\ncycles = 100\nspeedup = 50.0\n[trajectory]\nramp_down_duration = 0.5").unwrap();
        let config = load_sim_config(&path).unwrap();
        assert_eq!(config.simulation.cycles, 100);
        assert_eq!(config.simulation.sample_time, 0.004);
        assert_eq!(config.trajectory.ramp_down_duration, 0.5);
        assert_eq!(config.trajectory.condition_tolerance, 0.005);
    }

    #[test]
    fn test_rejects_zero_speedup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        std::fs::write(&path, "[simulation]\nspeedup = 0.0\n").unwrap();
        assert!(matches!(load_sim_config(&path), Err(SimError::Invalid(_))));
    }

    #[test]
    fn test_cycle_loop_executes_scenario() {
        let interface = Arc::new(TrajectoryInterface::new(TrajectoryConfig::default()).unwrap());
        let scenario = Scenario::builtin("baseline", &TrajectoryConfig::default()).unwrap();
        for (_, action) in &scenario.actions {
            action.apply(&interface, &SessionControl::default());
        }
        let settings = SimulationSettings {
            cycles: 2000,
            speedup: 1000.0,
            time_constant: 0.0,
            ..Default::default()
        };
        let (tx, rx) = unbounded();
        let robot = SimulatedRobot::new(RobotPoint::default(), 0.0, 0.0);
        let control = Arc::new(SessionControl::default());
        let cycles = run_cycles(Arc::clone(&interface), robot, MotionMode::Joint, settings, control, tx).unwrap();
        assert_eq!(cycles, 2000);

        let records: Vec<SimEvent> = rx.try_iter().collect();
        assert!(records.iter().any(|e| matches!(e, SimEvent::StateChanged { to: ExecutionState::Normal, .. })));
        let progress = interface.retrieve_execution_progress();
        assert_eq!(progress.pending_points, 0);
        assert!(!progress.goal_active);
    }
}
