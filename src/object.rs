//! Physics objects: per-entity state, integration and collision records.
//!
//! A [`PhysicsObj`] is owned by the [`crate::WorldService`]. During a tick it
//! is mutated by exactly one worker (the one processing its landblock group)
//! through [`PhysicsObj::update_object`], which reads shared state only
//! through a [`TransitionContext`]. Everything that touches another object
//! (collision callbacks, membership tables) happens afterwards in the
//! service's sequential phase.

use crate::geometry::{quat_from_heading, Plane, EPSILON};
use crate::landblock::Landblock;
use crate::motion::MotionInterpreter;
use crate::movement::{
    MoveCompleteReason, MoveToManager, MovementRequest, MoverView, StickyManager, TargetInfo,
    TargetStatus,
};
use crate::position::{CellKey, LandblockId, Position};
use crate::shape::ShapeSet;
use crate::store::LandblockStore;
use crate::transition::{ObjectHit, ObjectSnapshot, TransitionContext, TransitionRequest};
use crate::types::{ObjectId, PhysicsConfig};
use bitflags::bitflags;
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Friction multiplier while sledding.
const SLED_FRICTION_FACTOR: f32 = 0.2;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

bitflags! {
    /// Persistent behaviour flags.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PhysicsState: u32 {
        /// Never moves; never the moving side of a transition.
        const STATIC = 1 << 0;
        /// Passes through solid objects and walls, still stands on floors.
        const ETHEREAL = 1 << 1;
        /// Receives collision callbacks.
        const REPORT_COLLISIONS = 1 << 2;
        /// Invisible to and blind to other objects.
        const IGNORE_COLLISIONS = 1 << 3;
        /// Never stepped down onto ground.
        const MISSILE = 1 << 4;
        const GRAVITY = 1 << 5;
        const HAS_PHYSICS_BSP = 1 << 6;
        /// Blocking hits zero velocity instead of bouncing.
        const INELASTIC = 1 << 7;
        /// Movers hitting this report an environment collision.
        const REPORT_COLLISIONS_AS_ENVIRONMENT = 1 << 8;
        const SLEDDING = 1 << 9;
        /// Integration is suspended.
        const FROZEN = 1 << 10;
    }
}

bitflags! {
    /// Per-tick contact state.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TransientState: u32 {
        const CONTACT = 1 << 0;
        const ON_WALKABLE = 1 << 1;
        const SLIDING = 1 << 2;
        /// Ticked by the service.
        const ACTIVE = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SetPositionFlags: u32 {
        /// Resolve penetration at the target with a zero-length transition.
        const PLACEMENT = 1 << 0;
        /// Clear velocity and contact, cancel movement.
        const TELEPORT = 1 << 1;
        /// Allow pushing out of blockers during placement.
        const SLIDE = 1 << 2;
        /// Retry at random nearby offsets if placement fails.
        const SCATTER = 1 << 3;
    }
}

// ---------------------------------------------------------------------------
// Collisions and callbacks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionRecord {
    pub touched_time: f64,
    pub ethereal: bool,
}

/// What an object learns about the object it collided with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionProfile {
    pub id: ObjectId,
    pub state: PhysicsState,
    pub velocity: Vec3,
    pub ethereal: bool,
}

/// Callback sink owned by the game-side entity.
pub trait WeenieObject: Send {
    fn on_collision(&mut self, _other: ObjectId, _profile: &CollisionProfile) {}
    fn on_collision_with_environment(&mut self) {}
    fn on_collision_end(&mut self, _other: ObjectId) {}
    fn on_move_complete(&mut self, _reason: MoveCompleteReason) {}
}

/// Sink that ignores everything.
#[derive(Debug, Default)]
pub struct NullWeenie;

impl WeenieObject for NullWeenie {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WeenieEvent {
    Collision { other: ObjectId },
    CollisionWithEnvironment,
    CollisionEnd { other: ObjectId },
    MoveComplete { reason: MoveCompleteReason },
}

/// Sink that appends every callback to a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingWeenie {
    events: Arc<parking_lot::Mutex<Vec<WeenieEvent>>>,
}

impl RecordingWeenie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WeenieEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&WeenieEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl WeenieObject for RecordingWeenie {
    fn on_collision(&mut self, other: ObjectId, _profile: &CollisionProfile) {
        self.events.lock().push(WeenieEvent::Collision { other });
    }

    fn on_collision_with_environment(&mut self) {
        self.events.lock().push(WeenieEvent::CollisionWithEnvironment);
    }

    fn on_collision_end(&mut self, other: ObjectId) {
        self.events.lock().push(WeenieEvent::CollisionEnd { other });
    }

    fn on_move_complete(&mut self, reason: MoveCompleteReason) {
        self.events.lock().push(WeenieEvent::MoveComplete { reason });
    }
}

// ---------------------------------------------------------------------------
// Update outcome
// ---------------------------------------------------------------------------

/// What one object's update produced, for the sequential phase.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub moved: bool,
    pub collided_objects: Vec<ObjectHit>,
    pub collided_with_environment: bool,
    /// A landblock was missing; the object was left in place.
    pub world_missing: bool,
}

impl UpdateOutcome {
    fn merge_hits(&mut self, hits: &[ObjectHit]) {
        for hit in hits {
            match self.collided_objects.iter_mut().find(|h| h.id == hit.id) {
                Some(existing) => existing.ethereal &= hit.ethereal,
                None => self.collided_objects.push(*hit),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PhysicsObj
// ---------------------------------------------------------------------------

pub struct PhysicsObj {
    pub id: ObjectId,
    pub position: Position,
    pub in_world: bool,
    /// Landblock the object's cell belongs to, held while in the world.
    pub landblock: Option<Arc<Landblock>>,
    /// Own cell first, then every cell the shape reaches into.
    pub shadow_cells: Vec<CellKey>,
    base_shape: Arc<ShapeSet>,
    shape: Arc<ShapeSet>,
    pub scale: f32,
    pub state: PhysicsState,
    pub transient: TransientState,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    /// Angular velocity (radians/s); only Z is integrated.
    pub omega: Vec3,
    /// Actual displacement over the last update, per second.
    pub cached_velocity: Vec3,
    pub friction: f32,
    pub elasticity: f32,
    pub contact_plane: Option<Plane>,
    pub update_time: f64,
    pub collisions: HashMap<ObjectId, CollisionRecord>,
    pub motion: MotionInterpreter,
    pub movement: MoveToManager,
    pub sticky: StickyManager,
    pub parent: Option<ObjectId>,
    /// Environment contact reported last tick.
    pub environment_contact: bool,
    /// Horizontal velocity came from the motion interpreter last step.
    driven: bool,
    weenie: Box<dyn WeenieObject>,
}

impl std::fmt::Debug for PhysicsObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsObj")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("in_world", &self.in_world)
            .field("state", &self.state)
            .field("transient", &self.transient)
            .field("velocity", &self.velocity)
            .finish_non_exhaustive()
    }
}

impl PhysicsObj {
    pub fn new(id: ObjectId, shape: ShapeSet, state: PhysicsState, config: &PhysicsConfig) -> Self {
        let base_shape = Arc::new(shape.validated(id));
        Self {
            id,
            position: Position::new(LandblockId(0), Vec3::ZERO),
            in_world: false,
            landblock: None,
            shadow_cells: Vec::new(),
            shape: base_shape.clone(),
            base_shape,
            scale: 1.0,
            state,
            transient: TransientState::empty(),
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            omega: Vec3::ZERO,
            cached_velocity: Vec3::ZERO,
            friction: config.default_friction,
            elasticity: config.default_elasticity,
            contact_plane: None,
            update_time: 0.0,
            collisions: HashMap::new(),
            motion: MotionInterpreter::new(),
            movement: MoveToManager::new(0.0),
            sticky: StickyManager::default(),
            parent: None,
            environment_contact: false,
            driven: false,
            weenie: Box::new(NullWeenie),
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.set_scale(scale);
        self
    }

    pub fn with_weenie(mut self, weenie: impl WeenieObject + 'static) -> Self {
        self.weenie = Box::new(weenie);
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.clamp(0.0, 1.0);
        self
    }

    pub fn with_elasticity(mut self, elasticity: f32) -> Self {
        self.elasticity = elasticity.clamp(0.0, 1.0);
        self
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.max(EPSILON);
        self.shape = Arc::new(self.base_shape.scaled(self.scale));
    }

    /// Scaled collision shapes.
    pub fn shape(&self) -> &Arc<ShapeSet> {
        &self.shape
    }

    pub fn radius(&self) -> f32 {
        self.shape.horizontal_radius()
    }

    pub fn is_active(&self) -> bool {
        self.transient.contains(TransientState::ACTIVE)
    }

    pub fn on_walkable(&self) -> bool {
        self.transient.contains(TransientState::ON_WALKABLE)
    }

    pub fn activate(&mut self, now: f64) {
        if !self.is_active() {
            self.transient.insert(TransientState::ACTIVE);
            self.update_time = now;
        }
    }

    pub fn set_velocity(&mut self, velocity: Vec3, now: f64) {
        self.velocity = velocity;
        self.activate(now);
    }

    pub fn set_omega(&mut self, omega: Vec3, now: f64) {
        self.omega = omega;
        self.activate(now);
    }

    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            position: self.position,
            shape: self.shape.clone(),
            state: self.state,
        }
    }

    pub fn mover_view(&self) -> MoverView {
        MoverView {
            position: self.position,
            radius: self.radius(),
            on_walkable: self.on_walkable(),
        }
    }

    pub fn target_info(&self) -> TargetInfo {
        TargetInfo {
            object_id: self.id,
            position: self.position,
            radius: self.radius(),
            height: self.shape.height(),
            velocity: self.cached_velocity,
            status: TargetStatus::Ok,
        }
    }

    pub fn collision_profile(&self, ethereal: bool) -> CollisionProfile {
        CollisionProfile {
            id: self.id,
            state: self.state,
            velocity: self.cached_velocity,
            ethereal,
        }
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Start a movement request. Any new request (including `Stop`) ends
    /// sticky following.
    pub fn perform_movement(&mut self, request: MovementRequest, target: Option<TargetInfo>, now: f64) {
        self.sticky.unstick();
        self.movement.perform(request, target, &mut self.motion, now);
        self.activate(now);
    }

    pub fn receive_target_update(&mut self, info: &TargetInfo, now: f64) {
        self.movement
            .receive_target_update(info, &mut self.motion, now);
        self.sticky.receive_target_update(info);
    }

    /// Object this one currently tracks, through a request or stickiness.
    pub fn tracked_target(&self) -> Option<ObjectId> {
        self.movement.target_object().or(self.sticky.target())
    }

    pub fn is_stuck(&self, now: f64, config: &PhysicsConfig) -> bool {
        self.movement.is_stuck(now, config)
    }

    pub fn take_move_completions(&mut self) -> Vec<MoveCompleteReason> {
        self.movement.take_completions()
    }

    /// Clear velocity, contact and movement after a discontinuous move.
    pub fn teleport_reset(&mut self, now: f64) {
        self.velocity = Vec3::ZERO;
        self.cached_velocity = Vec3::ZERO;
        self.contact_plane = None;
        self.transient = TransientState::empty();
        self.environment_contact = false;
        self.driven = false;
        self.movement.cancel(&mut self.motion, now);
        self.sticky.unstick();
        self.motion.stop();
        self.activate(now);
    }

    // -----------------------------------------------------------------------
    // Collision records
    // -----------------------------------------------------------------------

    /// Refresh or open a record. Returns true if the contact is new.
    pub fn record_collision(&mut self, other: ObjectId, now: f64, ethereal: bool) -> bool {
        let record = CollisionRecord {
            touched_time: now,
            ethereal,
        };
        self.collisions.insert(other, record).is_none()
    }

    /// Close records that were not refreshed in time. Ethereal contacts end
    /// as soon as a tick passes without a touch.
    pub fn expire_collisions(&mut self, now: f64, timeout: f64) -> Vec<ObjectId> {
        let mut ended: Vec<ObjectId> = self
            .collisions
            .iter()
            .filter(|(_, r)| {
                if r.ethereal {
                    r.touched_time < now
                } else {
                    now - r.touched_time > timeout
                }
            })
            .map(|(id, _)| *id)
            .collect();
        ended.sort();
        for id in &ended {
            self.collisions.remove(id);
        }
        ended
    }

    pub fn reports_collisions(&self) -> bool {
        self.state.contains(PhysicsState::REPORT_COLLISIONS)
    }

    pub fn notify_collision(&mut self, other: ObjectId, profile: &CollisionProfile) {
        if self.reports_collisions() {
            self.weenie.on_collision(other, profile);
        }
    }

    pub fn notify_collision_with_environment(&mut self) {
        if self.reports_collisions() {
            self.weenie.on_collision_with_environment();
        }
    }

    pub fn notify_collision_end(&mut self, other: ObjectId) {
        if self.reports_collisions() {
            self.weenie.on_collision_end(other);
        }
    }

    pub fn notify_move_complete(&mut self, reason: MoveCompleteReason) {
        self.weenie.on_move_complete(reason);
    }

    // -----------------------------------------------------------------------
    // Cell membership
    // -----------------------------------------------------------------------

    /// Register in the object's own cell and shadow every cell its shape
    /// reaches into, dropping stale entries.
    pub fn link_cells(&mut self, store: &LandblockStore) {
        let cells = store.shadow_cells(&self.position, self.shape.bounding_radius());
        if cells == self.shadow_cells && self.landblock.is_some() {
            return;
        }
        self.unlink_cells(store);
        for (i, key) in cells.iter().enumerate() {
            let Some(lb) = store.get_landblock(key.cell, key.variant) else {
                continue;
            };
            if i == 0 {
                lb.add_object(key.cell, self.id);
                self.landblock = Some(lb);
            } else {
                lb.add_shadow(key.cell, self.id);
            }
        }
        self.shadow_cells = cells;
    }

    /// Remove the object from every cell and shadow cell.
    pub fn unlink_cells(&mut self, store: &LandblockStore) {
        for (i, key) in self.shadow_cells.iter().enumerate() {
            let lb = match (i, &self.landblock) {
                (0, Some(lb)) => Some(lb.clone()),
                _ => store.get_landblock(key.cell, key.variant),
            };
            let Some(lb) = lb else {
                continue;
            };
            if i == 0 {
                lb.remove_object(key.cell, self.id);
            } else {
                lb.remove_shadow(key.cell, self.id);
            }
        }
        self.shadow_cells.clear();
        self.landblock = None;
    }

    // -----------------------------------------------------------------------
    // Integration
    // -----------------------------------------------------------------------

    /// Advance the object to `now`. `None` when the object was not
    /// simulated this tick.
    pub fn update_object(&mut self, now: f64, ctx: &TransitionContext<'_>) -> Option<UpdateOutcome> {
        let config = ctx.config;
        if !self.in_world || self.parent.is_some() || self.state.contains(PhysicsState::STATIC) {
            return None;
        }
        if !self.is_active() || self.state.contains(PhysicsState::FROZEN) {
            self.update_time = now;
            return None;
        }
        let elapsed = now - self.update_time;
        if elapsed < config.min_quantum {
            return None;
        }
        if elapsed > config.huge_quantum {
            debug!("{} skipped {:.2}s gap", self.id, elapsed);
            self.update_time = now;
            return None;
        }

        let view = self.mover_view();
        self.movement
            .update(now, elapsed as f32, &view, &mut self.motion, config);
        if let Some((target, radius, position)) = self.movement.take_sticky_handoff() {
            self.sticky.stick_to(target, radius, position);
        }

        let mut outcome = UpdateOutcome::default();
        let mut remaining = elapsed;
        while remaining >= config.min_quantum {
            let dt = remaining.min(config.max_quantum);
            remaining -= dt;
            self.step(dt as f32, ctx, &mut outcome);
            if outcome.world_missing {
                remaining = 0.0;
                break;
            }
        }
        self.update_time = now - remaining;

        if self.should_sleep() {
            self.transient.remove(TransientState::ACTIVE);
            self.cached_velocity = Vec3::ZERO;
        }
        Some(outcome)
    }

    fn step(&mut self, dt: f32, ctx: &TransitionContext<'_>, outcome: &mut UpdateOutcome) {
        let config = ctx.config;
        let on_walkable = self.on_walkable();
        let heading = self.position.heading();

        // Velocity.
        let driven = on_walkable && self.motion.is_moving();
        if driven {
            let drive = self.motion.linear_velocity(heading, config);
            self.velocity.x = drive.x;
            self.velocity.y = drive.y;
        } else if on_walkable && self.driven {
            // Legs stopped: no coasting.
            self.velocity.x = 0.0;
            self.velocity.y = 0.0;
        }
        self.driven = driven;
        let mut accel = self.acceleration;
        if self.state.contains(PhysicsState::GRAVITY) && !on_walkable {
            accel.z += config.gravity;
        }
        self.velocity += accel * dt;
        if on_walkable && !driven {
            let friction = if self.state.contains(PhysicsState::SLEDDING) {
                self.friction * SLED_FRICTION_FACTOR
            } else {
                self.friction
            };
            self.velocity *= (1.0 - friction).max(0.0).powf(dt);
        }
        let speed = self.velocity.length();
        if speed > config.max_velocity {
            self.velocity *= config.max_velocity / speed;
        }

        // Orientation.
        let spun = heading - self.omega.z.to_degrees() * dt;
        let mut new_heading = self.motion.apply_turn(spun, dt, config);

        let start = self.position;
        let mut end = start.origin() + self.velocity * dt;
        if self.sticky.is_active() {
            if let Some((offset, face)) = self.sticky.adjust(&self.mover_view(), dt, config) {
                end += offset;
                new_heading = face;
            }
        }

        let allow_sliding = !self.movement.is_active() || self.movement.params().allow_sliding;
        let request = TransitionRequest {
            mover: self.id,
            shape: &self.shape,
            state: self.state,
            start,
            end,
            orientation: quat_from_heading(new_heading),
            was_on_walkable: on_walkable,
            allow_sliding,
            placement: false,
        };
        let result = ctx.transition(&request);

        if result.world_missing {
            outcome.world_missing = true;
            return;
        }

        let displacement = result.position.offset_from(start.cell_id) - start.origin();
        self.cached_velocity = displacement / dt;
        if result.position != start {
            outcome.moved = true;
        }
        self.position = result.position;
        self.contact_plane = result.contact.plane;
        self.transient
            .set(TransientState::CONTACT, result.contact.in_contact);
        self.transient
            .set(TransientState::ON_WALKABLE, result.contact.on_walkable);
        self.transient
            .set(TransientState::SLIDING, result.sliding_normal.is_some());

        if let Some(normal) = result.collision_normal {
            if self.state.contains(PhysicsState::INELASTIC) {
                self.velocity = Vec3::ZERO;
            } else {
                let vn = self.velocity.dot(normal);
                if vn < 0.0 {
                    self.velocity -= (1.0 + self.elasticity) * vn * normal;
                }
            }
        }
        if result.contact.on_walkable {
            let normal = self.contact_plane.map(|p| p.normal).unwrap_or(Vec3::Z);
            let vn = self.velocity.dot(normal);
            if vn < 0.0 {
                self.velocity -= vn * normal;
            }
        }

        outcome.merge_hits(&result.collided_objects);
        outcome.collided_with_environment |= result.collided_with_environment;
    }

    fn should_sleep(&self) -> bool {
        let resting = self.on_walkable() || !self.state.contains(PhysicsState::GRAVITY);
        resting
            && self.velocity.length_squared() < EPSILON * EPSILON
            && self.omega.z.abs() < EPSILON
            && self.acceleration == Vec3::ZERO
            && !self.motion.has_motion()
            && !self.movement.is_active()
            && !self.sticky.is_active()
            && self.collisions.is_empty()
    }

    /// Follow the parent's position; parented objects are never ticked.
    pub fn mirror_parent(&mut self, parent: &Position) {
        self.position = *parent;
        self.velocity = Vec3::ZERO;
        self.cached_velocity = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(state: PhysicsState) -> PhysicsObj {
        PhysicsObj::new(ObjectId(1), ShapeSet::sphere(0.5), state, &PhysicsConfig::default())
    }

    #[test]
    fn collision_records_open_once() {
        let mut o = obj(PhysicsState::REPORT_COLLISIONS);
        assert!(o.record_collision(ObjectId(2), 1.0, false));
        assert!(!o.record_collision(ObjectId(2), 1.5, false));
        assert!(o.expire_collisions(2.0, 1.0).is_empty());
        assert_eq!(o.expire_collisions(2.6, 1.0), vec![ObjectId(2)]);
    }

    #[test]
    fn ethereal_records_end_after_one_tick() {
        let mut o = obj(PhysicsState::empty());
        o.record_collision(ObjectId(3), 1.0, true);
        assert!(o.expire_collisions(1.0, 1.0).is_empty());
        assert_eq!(o.expire_collisions(1.1, 1.0), vec![ObjectId(3)]);
    }

    #[test]
    fn unflagged_objects_get_no_collision_callbacks() {
        let weenie = RecordingWeenie::new();
        let mut o = obj(PhysicsState::empty()).with_weenie(weenie.clone());
        o.notify_collision(ObjectId(2), &o.collision_profile(false));
        o.notify_move_complete(MoveCompleteReason::Success);
        assert_eq!(
            weenie.events(),
            vec![WeenieEvent::MoveComplete {
                reason: MoveCompleteReason::Success
            }]
        );
    }

    #[test]
    fn scale_applies_to_shape() {
        let o = obj(PhysicsState::empty()).with_scale(2.0);
        assert!((o.radius() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn teleport_reset_cancels_movement() {
        let mut o = obj(PhysicsState::GRAVITY);
        o.perform_movement(MovementRequest::turn_to_heading(90.0), None, 0.0);
        o.velocity = Vec3::new(1.0, 0.0, 0.0);
        o.teleport_reset(1.0);
        assert_eq!(o.velocity, Vec3::ZERO);
        assert_eq!(o.take_move_completions(), vec![MoveCompleteReason::Cancelled]);
        assert!(o.is_active());
    }
}
