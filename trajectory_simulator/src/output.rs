//! Event bus consumer writing per-cycle records as CSV and JSONL.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use csv::Writer;
use serde::Serialize;
use trajectory_motion::{Command, ExecutionProgress, ExecutionState};

use crate::SimError;

#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub cycle: usize,
    pub time: f64,
    pub state: ExecutionState,
    pub goal_active: bool,
    pub pending_points: usize,
    pub duration_factor: f64,
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub q4: f64,
    pub q5: f64,
    pub q6: f64,
    pub qd1: f64,
    pub qd2: f64,
    pub qd3: f64,
    pub qd4: f64,
    pub qd5: f64,
    pub qd6: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

impl CycleRecord {
    pub fn new(cycle: usize, time: f64, progress: &ExecutionProgress, command: &Command) -> Self {
        let joints = &command.references.joints;
        let [q1, q2, q3, q4, q5, q6] = joints.position.0;
        let [qd1, qd2, qd3, qd4, qd5, qd6] = joints.velocity.0;
        let cartesian = &command.references.cartesian;
        let position = cartesian.pose.position;
        let euler = cartesian.pose.euler;
        let velocity = cartesian.linear_velocity;
        Self {
            cycle,
            time,
            state: progress.state,
            goal_active: progress.goal_active,
            pending_points: progress.pending_points,
            duration_factor: progress.duration_factor,
            q1,
            q2,
            q3,
            q4,
            q5,
            q6,
            qd1,
            qd2,
            qd3,
            qd4,
            qd5,
            qd6,
            x: position.x,
            y: position.y,
            z: position.z,
            rx: euler.x,
            ry: euler.y,
            rz: euler.z,
            vx: velocity.x,
            vy: velocity.y,
            vz: velocity.z,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SimEvent {
    Cycle(Box<CycleRecord>),
    SessionStarted { cycle: usize },
    StateChanged { cycle: usize, from: ExecutionState, to: ExecutionState },
    Operator { time: f64, action: String },
}

/// Consume events until every sender is dropped. Returns the number of cycle records written.
pub fn spawn_writer(events: Receiver<SimEvent>, output_dir: &Path) -> Result<JoinHandle<Result<usize, SimError>>, SimError> {
    let mut csv = Writer::from_path(output_dir.join("results.csv"))?;
    let mut jsonl = BufWriter::new(File::create(output_dir.join("results.jsonl"))?);
    Ok(std::thread::spawn(move || {
        let mut written = 0;
        while let Ok(event) = events.recv() {
            match event {
                SimEvent::Cycle(record) => {
                    csv.serialize(record.as_ref())?;
                    writeln!(jsonl, "{}", serde_json::to_string(record.as_ref())?)?;
                    written += 1;
                }
                SimEvent::SessionStarted { cycle } => {
                    tracing::info!("[EVENT] Session started at cycle {}", cycle)
                }
                SimEvent::StateChanged { cycle, from, to } => {
                    tracing::info!("[EVENT] Cycle {}: {:?} -> {:?}", cycle, from, to)
                }
                SimEvent::Operator { time, action } => {
                    tracing::info!("[EVENT] Operator at {:.3}s: {}", time, action)
                }
            }
        }
        csv.flush()?;
        jsonl.flush()?;
        Ok(written)
    }))
}
