// src/motion/state.rs - Execution state machine, pending operator events and progress reporting
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::goal::{PointGoal, StaticGoal};
use crate::lock;
use crate::motion::step::MotionStep;
use crate::trajectory::{Trajectory, TrajectoryQueue};
use crate::types::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Normal,
    RampDown,
    StaticGoal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubState {
    #[default]
    None,
    Running,
    Finished,
}

/// Execution state as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Undefined,
    Normal,
    RampDown,
    StaticGoal,
}

pub fn map_current_state(state: State, sub_state: SubState) -> ExecutionState {
    match (state, sub_state) {
        (State::Normal, SubState::None) => ExecutionState::Normal,
        (State::Normal, _) => ExecutionState::Undefined,
        (State::RampDown, _) => ExecutionState::RampDown,
        (State::StaticGoal, _) => ExecutionState::StaticGoal,
    }
}

/// Operator intents waiting for the next cycle. Flags coalesce; the latest values win.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingEvents {
    pub do_stop: bool,
    pub do_resume: bool,
    pub do_discard: bool,
    pub do_ramp_down: bool,
    pub do_static_goal_start: bool,
    pub do_static_goal_fast_update: bool,
    pub static_goal: Option<StaticGoal>,
    pub do_static_goal_finish: bool,
    pub duration_factor: Option<f64>,
}

impl PendingEvents {
    /// Fold in events posted after `self`.
    fn absorb(&mut self, newer: PendingEvents) {
        if newer.do_stop {
            self.do_resume = false;
        }
        self.do_stop |= newer.do_stop;
        self.do_resume |= newer.do_resume;
        self.do_discard |= newer.do_discard;
        self.do_ramp_down |= newer.do_ramp_down;
        self.do_static_goal_start |= newer.do_static_goal_start;
        self.do_static_goal_finish |= newer.do_static_goal_finish;
        if newer.static_goal.is_some() {
            self.static_goal = newer.static_goal;
            self.do_static_goal_fast_update = newer.do_static_goal_fast_update;
        }
        if newer.duration_factor.is_some() {
            self.duration_factor = newer.duration_factor;
        }
    }
}

/// Mailbox shared between operators and the real-time cycle.
#[derive(Debug, Default)]
pub struct Mailbox {
    events: Mutex<PendingEvents>,
}

impl Mailbox {
    pub fn post(&self, update: impl FnOnce(&mut PendingEvents)) {
        update(&mut lock(&self.events));
    }

    pub fn drain(&self) -> PendingEvents {
        std::mem::take(&mut *lock(&self.events))
    }
}

/// Execution progress snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub state: ExecutionState,
    pub goal_active: bool,
    /// Normal point being executed.
    pub active_point: Option<PointGoal>,
    /// Time [s] passed in the active motion step.
    pub time_passed: f64,
    pub duration_factor: f64,
    pub pending_points: usize,
    pub command: Command,
    pub active_trajectory: Vec<PointGoal>,
    pub pending_trajectories: Vec<Trajectory>,
    /// At least one cycle completed since the previous read.
    pub updated: bool,
}

/// Authoritative execution state plus the decisions taken in the current cycle.
#[derive(Debug, Clone, Default)]
pub struct DecisionData {
    pub state: State,
    pub sub_state: SubState,
    /// A new internal goal was prepared this cycle.
    pub has_new_goal: bool,
    pub has_active_goal: bool,
    resume_latched: bool,
    static_entered_from_stop: bool,
    deferred: PendingEvents,
}

impl DecisionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart execution for a new session. A stopped execution stays stopped.
    pub fn reset_session(&mut self, queue: &TrajectoryQueue, step: &mut MotionStep) {
        let stopped = match self.state {
            State::Normal => false,
            State::RampDown => step.internal_goal().hold_on_finish && !self.resume_latched,
            State::StaticGoal => true,
        };
        if self.state == State::Normal {
            if let Some(point) = step.take_external_goal() {
                tracing::info!("Re-queueing the point interrupted by the session end");
                queue.store_front(point);
            }
        }

        step.reset_session(stopped);
        self.has_new_goal = false;
        self.has_active_goal = false;
        self.resume_latched = false;
        self.static_entered_from_stop = false;
        if stopped {
            self.state = State::RampDown;
            self.sub_state = SubState::Finished;
            tracing::info!("Session started with execution stopped, waiting for resume");
        } else {
            self.state = State::Normal;
            self.sub_state = SubState::None;
        }
    }

    /// Apply the drained operator events and take this cycle's state decision.
    pub fn reconcile(&mut self, drained: PendingEvents, queue: &TrajectoryQueue, step: &mut MotionStep) {
        let mut events = std::mem::take(&mut self.deferred);
        events.absorb(drained);
        self.has_new_goal = false;

        if events.do_discard {
            tracing::info!("Discarding queued trajectories");
            queue.discard();
        }
        if let Some(factor) = events.duration_factor {
            if step.apply_duration_factor(factor) && self.has_active_goal {
                self.has_new_goal = true;
            }
        }

        match self.state {
            State::Normal => self.process_normal(&events, queue, step),
            State::RampDown => self.process_ramp_down(&events, queue, step),
            State::StaticGoal => self.process_static_goal(&events, step),
        }
    }

    fn activate(&mut self, state: State, sub_state: SubState) {
        if state != self.state {
            tracing::info!("Execution state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.sub_state = sub_state;
        self.has_new_goal = true;
        self.has_active_goal = true;
    }

    fn process_normal(&mut self, events: &PendingEvents, queue: &TrajectoryQueue, step: &mut MotionStep) {
        if events.do_ramp_down && events.do_stop {
            self.store_normal_goal(events.do_discard, queue, step);
            step.prepare_ramp_down_goal(true);
            self.activate(State::RampDown, SubState::Running);
            self.resume_latched = events.do_resume;
            if events.do_static_goal_start {
                // Static goal start and its target are handled once ramping down
                self.deferred.do_static_goal_start = true;
                self.deferred.do_ramp_down = true;
                self.deferred.static_goal = events.static_goal;
                self.deferred.do_static_goal_fast_update = events.do_static_goal_fast_update;
                self.defer_static_finish(events);
            }
            return;
        }
        if events.do_ramp_down && events.do_static_goal_start {
            self.store_normal_goal(events.do_discard, queue, step);
            step.prepare_ramp_down_goal(false);
            self.activate(State::StaticGoal, SubState::None);
            self.static_entered_from_stop = false;
            self.start_static_goal(events, step);
            self.defer_static_finish(events);
            return;
        }
        if events.static_goal.is_some() || events.do_static_goal_finish {
            tracing::debug!("Ignoring static goal event outside static goal execution");
        }
        if events.do_resume {
            tracing::debug!("Ignoring resume, execution is not stopped");
        }

        let advance = !self.has_active_goal
            || (step.interpolation_duration_reached()
                && (!step.internal_goal().reach || step.condition_met()));
        if advance {
            self.update_normal_goal(queue, step);
        }
    }

    fn process_ramp_down(&mut self, events: &PendingEvents, queue: &TrajectoryQueue, step: &mut MotionStep) {
        if events.do_static_goal_start {
            self.static_entered_from_stop = step.internal_goal().hold_on_finish;
            tracing::info!("Execution state {:?} -> {:?}", self.state, State::StaticGoal);
            self.state = State::StaticGoal;
            self.sub_state = SubState::None;
            self.resume_latched = false;
            self.start_static_goal(events, step);
            self.defer_static_finish(events);
            return;
        }
        if events.do_stop {
            step.set_hold_on_finish(true);
            self.resume_latched = false;
        }

        match self.sub_state {
            SubState::None | SubState::Running => {
                if events.do_resume {
                    self.resume_latched = true;
                }
                if step.interpolation_duration_reached() {
                    tracing::info!("Ramp down finished");
                    self.sub_state = SubState::Finished;
                    self.has_active_goal = false;
                }
            }
            SubState::Finished => {
                let resume = events.do_resume || self.resume_latched || !step.internal_goal().hold_on_finish;
                if resume {
                    tracing::info!("Execution state {:?} -> {:?}", self.state, State::Normal);
                    self.resume_latched = false;
                    self.static_entered_from_stop = false;
                    self.state = State::Normal;
                    self.sub_state = SubState::None;
                    self.update_normal_goal(queue, step);
                }
            }
        }
    }

    fn process_static_goal(&mut self, events: &PendingEvents, step: &mut MotionStep) {
        if events.do_ramp_down && (events.do_static_goal_finish || events.do_stop) {
            let resume = events.do_static_goal_finish
                && !events.do_stop
                && events.do_resume
                && !self.static_entered_from_stop;
            step.prepare_ramp_down_goal(!resume);
            self.activate(State::RampDown, SubState::Running);
            self.resume_latched = false;
            return;
        }
        if self.start_static_goal(events, step) {
            return;
        }
        if self.sub_state == SubState::Running && step.interpolation_duration_reached() {
            tracing::info!("Static goal transition finished");
            self.sub_state = SubState::Finished;
        }
    }

    /// Prepare a requested static goal. Returns true if there was one.
    fn start_static_goal(&mut self, events: &PendingEvents, step: &mut MotionStep) -> bool {
        let Some(goal) = events.static_goal else {
            return false;
        };
        step.prepare_static_goal(&goal, events.do_static_goal_fast_update);
        self.activate(State::StaticGoal, SubState::Running);
        true
    }

    fn defer_static_finish(&mut self, events: &PendingEvents) {
        if events.do_static_goal_finish {
            self.deferred.do_static_goal_finish = true;
            self.deferred.do_ramp_down = true;
            self.deferred.do_resume = events.do_resume;
        }
    }

    /// Activate the next queued point, or hold when the queue is exhausted.
    pub fn update_normal_goal(&mut self, queue: &TrajectoryQueue, step: &mut MotionStep) {
        match queue.dequeue_next_point() {
            Some(next) => {
                step.prepare_normal_goal(next.point, next.last_in_trajectory);
                self.has_new_goal = true;
                self.has_active_goal = true;
            }
            None => {
                if self.has_active_goal {
                    tracing::info!("Trajectory queue exhausted, holding position");
                }
                step.take_external_goal();
                self.has_active_goal = false;
            }
        }
    }

    /// Hand the interrupted normal point back to the queue, unless it is being discarded.
    pub fn store_normal_goal(&mut self, discard: bool, queue: &TrajectoryQueue, step: &mut MotionStep) {
        if let Some(point) = step.take_external_goal() {
            if discard {
                tracing::debug!("Dropping the interrupted point");
            } else {
                queue.store_front(point);
            }
        }
    }
}
