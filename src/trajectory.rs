// src/trajectory.rs - Trajectories and the shared trajectory queue
use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::goal::PointGoal;
use crate::lock;

/// Ordered sequence of points the robot should pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    points: VecDeque<PointGoal>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-insert a point in front of the remaining ones (e.g. an interrupted point).
    pub fn push_front(&mut self, point: PointGoal) {
        self.points.push_front(point);
    }

    pub fn push_back(&mut self, point: PointGoal) {
        self.points.push_back(point);
    }

    pub fn pop_front(&mut self) -> Option<PointGoal> {
        self.points.pop_front()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Copy of the remaining points, in order.
    pub fn to_vec(&self) -> Vec<PointGoal> {
        self.points.iter().copied().collect()
    }
}

impl From<Vec<PointGoal>> for Trajectory {
    fn from(points: Vec<PointGoal>) -> Self {
        Self {
            points: points.into(),
        }
    }
}

impl FromIterator<PointGoal> for Trajectory {
    fn from_iter<I: IntoIterator<Item = PointGoal>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// A point taken from the queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DequeuedPoint {
    pub point: PointGoal,
    /// The point was the final one of its trajectory.
    pub last_in_trajectory: bool,
}

#[derive(Debug, Default)]
struct QueueContent {
    primary: VecDeque<Trajectory>,
    /// Replacement for the primary queue and the active trajectory, staged by an override.
    temporary: VecDeque<Trajectory>,
    override_staged: bool,
    current: Option<Trajectory>,
}

impl QueueContent {
    fn apply_staged_override(&mut self) {
        if self.override_staged {
            self.primary = std::mem::take(&mut self.temporary);
            self.current = None;
            self.override_staged = false;
        }
    }
}

/// Thread safe queue of trajectories plus the currently active one.
///
/// Overrides are staged and only replace the queued content when the next point is dequeued, so a
/// point that is already being interpolated is never cut short by the queue itself.
#[derive(Debug, Default)]
pub struct TrajectoryQueue {
    content: Mutex<QueueContent>,
}

impl TrajectoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trajectory. With `override_pending`, everything not yet executed is replaced by it.
    pub fn append(&self, trajectory: Trajectory, override_pending: bool) {
        let mut content = lock(&self.content);
        if override_pending {
            content.temporary.clear();
            content.temporary.push_back(trajectory);
            content.override_staged = true;
        } else if content.override_staged {
            content.temporary.push_back(trajectory);
        } else {
            content.primary.push_back(trajectory);
        }
    }

    /// Next point to execute, promoting queued trajectories as the active one runs out.
    pub fn dequeue_next_point(&self) -> Option<DequeuedPoint> {
        let mut content = lock(&self.content);
        content.apply_staged_override();
        loop {
            if let Some(current) = content.current.as_mut() {
                if let Some(point) = current.pop_front() {
                    return Some(DequeuedPoint {
                        point,
                        last_in_trajectory: current.is_empty(),
                    });
                }
            }
            match content.primary.pop_front() {
                Some(next) => content.current = Some(next),
                None => {
                    content.current = None;
                    return None;
                }
            }
        }
    }

    /// Put an interrupted point back in front of the active trajectory.
    pub fn store_front(&self, point: PointGoal) {
        let mut content = lock(&self.content);
        match content.current.as_mut() {
            Some(current) => current.push_front(point),
            None => content.current = Some(Trajectory::from(vec![point])),
        }
    }

    /// Drop every queued trajectory, staged overrides and the rest of the active one.
    pub fn discard(&self) {
        let mut content = lock(&self.content);
        content.primary.clear();
        content.temporary.clear();
        content.override_staged = false;
        content.current = None;
    }

    /// Number of points still to be executed.
    pub fn pending_points(&self) -> usize {
        let content = lock(&self.content);
        if content.override_staged {
            content.temporary.iter().map(Trajectory::len).sum()
        } else {
            content.current.as_ref().map_or(0, Trajectory::len)
                + content.primary.iter().map(Trajectory::len).sum::<usize>()
        }
    }

    /// Copy of the active trajectory's remaining points and of the queued trajectories.
    pub fn export(&self) -> (Vec<PointGoal>, Vec<Trajectory>) {
        let content = lock(&self.content);
        if content.override_staged {
            (Vec::new(), content.temporary.iter().cloned().collect())
        } else {
            (
                content.current.as_ref().map_or_else(Vec::new, Trajectory::to_vec),
                content.primary.iter().cloned().collect(),
            )
        }
    }
}
