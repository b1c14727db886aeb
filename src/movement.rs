//! Move-to / turn-to state machine and sticky following.
//!
//! One [`MoveToManager`] per physics object holds at most one active
//! [`MovementRequest`]. A request is planned into an ordered queue of
//! [`SubAction`]s consumed head-first; each sub-action drives the
//! [`MotionInterpreter`] until its heading or distance goal is met. Every
//! request ends in exactly one [`MoveCompleteReason`].

use crate::geometry::{heading_diff, heading_toward, heading_vector, normalize_heading};
use crate::motion::{MotionCommand, MotionInterpreter};
use crate::position::Position;
use crate::types::{ObjectId, PhysicsConfig};
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveCompleteReason {
    Success,
    Cancelled,
    ObjectGone,
    NoObject,
    TooFar,
    NoProgress,
    GeneralFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementParameters {
    /// Arrival distance for move-to requests (surface to surface for objects).
    pub distance_to_object: f32,
    /// Move-away requests succeed once at least this far.
    pub min_distance: f32,
    /// Fail with `TooFar` beyond this distance.
    pub fail_distance: f32,
    /// Speed multiplier applied to walk/run/turn rates.
    pub speed: f32,
    /// Run instead of walk when further than this.
    pub walk_run_threshold: f32,
    /// Goal for turn-to-heading and for the final turn of a move.
    pub desired_heading: f32,
    pub can_run: bool,
    pub move_towards: bool,
    pub use_final_heading: bool,
    /// Keep following the target after arriving.
    pub stick_to_object: bool,
    pub allow_sliding: bool,
}

impl Default for MovementParameters {
    fn default() -> Self {
        Self {
            distance_to_object: 0.6,
            min_distance: 0.0,
            fail_distance: f32::MAX,
            speed: 1.0,
            walk_run_threshold: 15.0,
            desired_heading: 0.0,
            can_run: true,
            move_towards: true,
            use_final_heading: false,
            stick_to_object: false,
            allow_sliding: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementRequest {
    MoveToPosition {
        target: Position,
        #[serde(default)]
        params: MovementParameters,
    },
    MoveToObject {
        target: ObjectId,
        #[serde(default)]
        params: MovementParameters,
    },
    /// Goal is `params.desired_heading`.
    TurnToHeading {
        #[serde(default)]
        params: MovementParameters,
    },
    TurnToObject {
        target: ObjectId,
        #[serde(default)]
        params: MovementParameters,
    },
    Stop,
}

impl MovementRequest {
    pub fn turn_to_heading(heading: f32) -> Self {
        MovementRequest::TurnToHeading {
            params: MovementParameters {
                desired_heading: heading,
                ..MovementParameters::default()
            },
        }
    }

    /// Object this request tracks, if any.
    pub fn target_object(&self) -> Option<ObjectId> {
        match self {
            MovementRequest::MoveToObject { target, .. } | MovementRequest::TurnToObject { target, .. } => {
                Some(*target)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementType {
    Invalid,
    MoveToObject,
    MoveToPosition,
    TurnToObject,
    TurnToHeading,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubAction {
    TurnToHeading(f32),
    MoveToPosition,
}

// ---------------------------------------------------------------------------
// Target tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Ok,
    Teleported,
    ExitWorld,
}

/// Heartbeat describing a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub object_id: ObjectId,
    pub position: Position,
    pub radius: f32,
    pub height: f32,
    pub velocity: Vec3,
    pub status: TargetStatus,
}

impl TargetInfo {
    pub fn exit_world(object_id: ObjectId, last: Position) -> Self {
        Self {
            object_id,
            position: last,
            radius: 0.0,
            height: 0.0,
            velocity: Vec3::ZERO,
            status: TargetStatus::ExitWorld,
        }
    }
}

/// What the manager needs to know about its own object.
#[derive(Debug, Clone, Copy)]
pub struct MoverView {
    pub position: Position,
    pub radius: f32,
    pub on_walkable: bool,
}

impl MoverView {
    pub fn heading(&self) -> f32 {
        self.position.heading()
    }
}

// ---------------------------------------------------------------------------
// Move-to manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MoveToManager {
    kind: MovementType,
    params: MovementParameters,
    target_id: Option<ObjectId>,
    target: Option<Position>,
    target_radius: f32,
    planned: bool,
    actions: VecDeque<SubAction>,
    sample_time: f64,
    sample_distance: f32,
    sample_heading: f32,
    last_success: f64,
    last_failure: Option<MoveCompleteReason>,
    completions: Vec<MoveCompleteReason>,
    sticky_handoff: Option<(ObjectId, f32)>,
}

impl Default for MoveToManager {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl MoveToManager {
    pub fn new(now: f64) -> Self {
        Self {
            kind: MovementType::Invalid,
            params: MovementParameters::default(),
            target_id: None,
            target: None,
            target_radius: 0.0,
            planned: false,
            actions: VecDeque::new(),
            sample_time: now,
            sample_distance: 0.0,
            sample_heading: 0.0,
            last_success: now,
            last_failure: None,
            completions: Vec::new(),
            sticky_handoff: None,
        }
    }

    pub fn kind(&self) -> MovementType {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.kind != MovementType::Invalid
    }

    pub fn params(&self) -> &MovementParameters {
        &self.params
    }

    pub fn actions(&self) -> impl Iterator<Item = &SubAction> {
        self.actions.iter()
    }

    pub fn target_object(&self) -> Option<ObjectId> {
        if self.is_active() {
            self.target_id
        } else {
            None
        }
    }

    /// Last known target position and radius.
    pub fn target(&self) -> Option<(Position, f32)> {
        self.target.map(|p| (p, self.target_radius))
    }

    pub fn last_failure(&self) -> Option<MoveCompleteReason> {
        self.last_failure
    }

    /// True once no sub-action has succeeded for `stuck_threshold` seconds
    /// while a request is running or after one failed for lack of progress.
    pub fn is_stuck(&self, now: f64, config: &PhysicsConfig) -> bool {
        let stalled = now - self.last_success > config.stuck_threshold;
        stalled && (self.is_active() || self.last_failure == Some(MoveCompleteReason::NoProgress))
    }

    /// Completions produced since the last call.
    pub fn take_completions(&mut self) -> Vec<MoveCompleteReason> {
        std::mem::take(&mut self.completions)
    }

    /// Target to follow after a successful stick-to-object move, with its
    /// radius and last known position.
    pub fn take_sticky_handoff(&mut self) -> Option<(ObjectId, f32, Option<Position>)> {
        self.sticky_handoff
            .take()
            .map(|(id, radius)| (id, radius, self.target))
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Start `request`, cancelling any request in flight. Object requests
    /// need the target's current info; `None` completes with `NoObject`.
    pub fn perform(
        &mut self,
        request: MovementRequest,
        target: Option<TargetInfo>,
        motion: &mut MotionInterpreter,
        now: f64,
    ) {
        if self.is_active() {
            self.finish(MoveCompleteReason::Cancelled, motion, now);
        }
        self.target_id = None;
        self.target = None;
        self.target_radius = 0.0;
        self.planned = false;
        self.actions.clear();
        self.sample_time = now;
        self.last_success = now;
        self.last_failure = None;

        let (kind, params) = match request {
            MovementRequest::Stop => {
                motion.stop();
                return;
            }
            MovementRequest::MoveToPosition { target, params } => {
                self.target = Some(target);
                (MovementType::MoveToPosition, params)
            }
            MovementRequest::MoveToObject { target, params } => {
                self.target_id = Some(target);
                (MovementType::MoveToObject, params)
            }
            MovementRequest::TurnToHeading { params } => (MovementType::TurnToHeading, params),
            MovementRequest::TurnToObject { target, params } => {
                self.target_id = Some(target);
                (MovementType::TurnToObject, params)
            }
        };
        self.kind = kind;
        self.params = params;

        if let Some(id) = self.target_id {
            match target.filter(|t| t.object_id == id && t.status != TargetStatus::ExitWorld) {
                Some(info) => {
                    self.target = Some(info.position);
                    self.target_radius = info.radius;
                }
                None => self.finish(MoveCompleteReason::NoObject, motion, now),
            }
        }
    }

    pub fn cancel(&mut self, motion: &mut MotionInterpreter, now: f64) {
        if self.is_active() {
            self.finish(MoveCompleteReason::Cancelled, motion, now);
        }
    }

    pub fn receive_target_update(&mut self, info: &TargetInfo, motion: &mut MotionInterpreter, now: f64) {
        if !self.is_active() || self.target_id != Some(info.object_id) {
            return;
        }
        if info.status == TargetStatus::ExitWorld {
            self.finish(MoveCompleteReason::ObjectGone, motion, now);
            return;
        }
        self.target = Some(info.position);
        self.target_radius = info.radius;
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    pub fn update(
        &mut self,
        now: f64,
        dt: f32,
        mover: &MoverView,
        motion: &mut MotionInterpreter,
        config: &PhysicsConfig,
    ) {
        if !self.is_active() {
            return;
        }
        if !mover.on_walkable {
            // Airborne: hold the progress clock.
            self.reset_sample(now, mover);
            return;
        }
        // A fixed heading has no target; distances are measured from the mover.
        let target = match (self.target, self.kind) {
            (Some(target), _) => target,
            (None, MovementType::TurnToHeading) => mover.position,
            (None, _) => return,
        };
        if !self.planned {
            self.plan(mover, &target);
            self.reset_sample(now, mover);
        }

        let Some(action) = self.actions.front().copied() else {
            self.finish(MoveCompleteReason::Success, motion, now);
            return;
        };
        match action {
            SubAction::TurnToHeading(goal) => self.turn_step(goal, now, mover, &target, motion, config),
            SubAction::MoveToPosition => self.move_step(now, dt, mover, &target, motion, config),
        }
    }

    fn plan(&mut self, mover: &MoverView, target: &Position) {
        self.actions.clear();
        match self.kind {
            MovementType::MoveToPosition | MovementType::MoveToObject => {
                if !self.arrived(self.distance(mover, target)) {
                    self.actions
                        .push_back(SubAction::TurnToHeading(self.travel_heading(mover, target)));
                    self.actions.push_back(SubAction::MoveToPosition);
                }
                if self.params.use_final_heading {
                    self.actions
                        .push_back(SubAction::TurnToHeading(self.params.desired_heading));
                }
            }
            MovementType::TurnToObject => {
                self.actions
                    .push_back(SubAction::TurnToHeading(self.face_heading(mover, target)));
            }
            MovementType::TurnToHeading => {
                self.actions
                    .push_back(SubAction::TurnToHeading(self.params.desired_heading));
            }
            MovementType::Invalid => {}
        }
        self.planned = true;
    }

    fn turn_step(
        &mut self,
        goal: f32,
        now: f64,
        mover: &MoverView,
        target: &Position,
        motion: &mut MotionInterpreter,
        config: &PhysicsConfig,
    ) {
        let goal = if self.kind == MovementType::TurnToObject {
            self.face_heading(mover, target)
        } else {
            goal
        };
        let diff = heading_diff(goal, mover.heading());
        if diff.abs() <= config.heading_tolerance_deg {
            motion.stop_turn();
            motion.set_pending_heading(Some(goal));
            self.actions.pop_front();
            self.succeed(now, mover, target);
            return;
        }

        let command = if diff > 0.0 {
            MotionCommand::TurnRight
        } else {
            MotionCommand::TurnLeft
        };
        motion.do_motion(command, self.params.speed);
        motion.set_pending_heading(Some(goal));

        let elapsed = now - self.sample_time;
        if elapsed >= config.progress_interval {
            let turned = heading_diff(mover.heading(), self.sample_heading).abs();
            if turned / (elapsed as f32) < config.min_turn_rate_deg {
                debug!("turn toward {:.1} stalled at {:.1}", goal, mover.heading());
                self.finish(MoveCompleteReason::NoProgress, motion, now);
                return;
            }
            self.reset_sample(now, mover);
        }
    }

    fn move_step(
        &mut self,
        now: f64,
        dt: f32,
        mover: &MoverView,
        target: &Position,
        motion: &mut MotionInterpreter,
        config: &PhysicsConfig,
    ) {
        let dist = self.distance(mover, target);
        if dist > self.params.fail_distance {
            self.finish(MoveCompleteReason::TooFar, motion, now);
            return;
        }

        let to_target = heading_toward(mover.position.origin(), target.offset_from(mover.position.cell_id));
        let behind = heading_diff(to_target, mover.heading()).abs() > 90.0;
        let step = config.run_speed * self.params.speed * dt.max(0.0);
        let passed = self.params.move_towards && behind && dist <= step;
        if self.arrived(dist) || passed {
            motion.stop_forward();
            motion.stop_turn();
            self.actions.pop_front();
            self.succeed(now, mover, target);
            return;
        }

        // Drift correction: small errors snap, large ones turn while moving.
        let desired = self.travel_heading(mover, target);
        let diff = heading_diff(desired, mover.heading());
        if diff.abs() > config.aux_turn_threshold_deg {
            let command = if diff > 0.0 {
                MotionCommand::TurnRight
            } else {
                MotionCommand::TurnLeft
            };
            motion.do_motion(command, self.params.speed);
        } else {
            motion.stop_turn();
        }
        motion.set_pending_heading(Some(desired));

        let run = self.params.can_run && dist > self.params.walk_run_threshold;
        let (command, base) = if run {
            (MotionCommand::RunForward, config.run_speed)
        } else {
            (MotionCommand::WalkForward, config.walk_speed)
        };
        let mut speed = self.params.speed;
        if self.params.move_towards && dt > 0.0 && base > 0.0 {
            // Do not overshoot: finish half-way inside the arrival radius.
            let needed = (dist - self.params.distance_to_object * 0.5).max(0.0);
            speed = speed.min(needed / (base * dt)).max(0.05);
        }
        motion.do_motion(command, speed);

        let elapsed = now - self.sample_time;
        if elapsed >= config.progress_interval {
            let progressed = if self.params.move_towards {
                self.sample_distance - dist
            } else {
                dist - self.sample_distance
            };
            if progressed / (elapsed as f32) < config.min_progress_rate {
                debug!(
                    "move stalled: {:.2} units in {:.2}s, {:.2} to go",
                    progressed, elapsed, dist
                );
                self.finish(MoveCompleteReason::NoProgress, motion, now);
                return;
            }
            self.reset_sample(now, mover);
        }
    }

    fn succeed(&mut self, now: f64, mover: &MoverView, target: &Position) {
        self.last_success = now;
        self.sample_time = now;
        self.sample_distance = self.distance(mover, target);
        self.sample_heading = mover.heading();
    }

    fn finish(&mut self, reason: MoveCompleteReason, motion: &mut MotionInterpreter, now: f64) {
        motion.stop();
        self.actions.clear();
        if reason == MoveCompleteReason::Success {
            self.last_success = now;
            self.last_failure = None;
            if self.params.stick_to_object {
                if let Some(id) = self.target_id {
                    self.sticky_handoff = Some((id, self.target_radius));
                }
            }
        } else {
            self.last_failure = Some(reason);
        }
        debug!("movement {:?} complete: {:?}", self.kind, reason);
        self.kind = MovementType::Invalid;
        self.planned = false;
        self.completions.push(reason);
    }

    fn reset_sample(&mut self, now: f64, mover: &MoverView) {
        self.sample_time = now;
        self.sample_heading = mover.heading();
        if let Some(target) = self.target {
            self.sample_distance = self.distance(mover, &target);
        }
    }

    // -----------------------------------------------------------------------
    // Geometry helpers
    // -----------------------------------------------------------------------

    /// Horizontal distance; surface to surface for object targets.
    fn distance(&self, mover: &MoverView, target: &Position) -> f32 {
        let center = mover.position.horizontal_distance(target);
        if self.target_id.is_some() {
            (center - self.target_radius - mover.radius).max(0.0)
        } else {
            center
        }
    }

    fn arrived(&self, dist: f32) -> bool {
        if self.params.move_towards {
            dist <= self.params.distance_to_object
        } else {
            dist >= self.params.min_distance
        }
    }

    fn face_heading(&self, mover: &MoverView, target: &Position) -> f32 {
        heading_toward(mover.position.origin(), target.offset_from(mover.position.cell_id))
    }

    fn travel_heading(&self, mover: &MoverView, target: &Position) -> f32 {
        let toward = self.face_heading(mover, target);
        if self.params.move_towards {
            toward
        } else {
            normalize_heading(toward + 180.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Sticky manager
// ---------------------------------------------------------------------------

/// Keeps an object glued to a (possibly moving) target's surface.
#[derive(Debug, Clone, Default)]
pub struct StickyManager {
    target: Option<ObjectId>,
    target_radius: f32,
    target_position: Option<Position>,
}

impl StickyManager {
    pub fn stick_to(&mut self, target: ObjectId, radius: f32, position: Option<Position>) {
        self.target = Some(target);
        self.target_radius = radius;
        self.target_position = position;
    }

    pub fn unstick(&mut self) {
        self.target = None;
        self.target_position = None;
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn receive_target_update(&mut self, info: &TargetInfo) {
        if self.target != Some(info.object_id) {
            return;
        }
        if info.status == TargetStatus::ExitWorld {
            self.unstick();
            return;
        }
        self.target_radius = info.radius;
        self.target_position = Some(info.position);
    }

    /// Offset to apply this step and the heading that faces the target.
    pub fn adjust(&self, mover: &MoverView, dt: f32, config: &PhysicsConfig) -> Option<(Vec3, f32)> {
        let target = self.target_position?;
        if target.variant != mover.position.variant {
            return None;
        }
        let origin = mover.position.origin();
        let goal = target.offset_from(mover.position.cell_id);
        let heading = heading_toward(origin, goal);
        let dist = (goal - origin).truncate().length();
        let desired = self.target_radius + mover.radius + config.sticky_gap;
        let gap = dist - desired;
        let limit = config.sticky_speed * dt;
        let travel = gap.clamp(-limit, limit);
        Some((heading_vector(heading) * travel, heading))
    }
}
