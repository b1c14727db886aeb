//! WorldService – object lifecycle, placement, movement and the tick pump.

use crate::error::{PhysicsError, Result};
use crate::geometry::{heading_vector, Frame};
use crate::movement::{MovementRequest, TargetInfo};
use crate::object::{PhysicsObj, PhysicsState, SetPositionFlags, TransientState, UpdateOutcome};
use crate::position::{LandblockKey, Position};
use crate::protocol::EntityTransform;
use crate::shape::ShapeSet;
use crate::store::LandblockStore;
use crate::structure::WorldSource;
use crate::transition::{ObjectIndex, TransitionContext, TransitionRequest, TransitionResult};
use crate::types::{ObjectId, PhysicsConfig, WorldStats};
use glam::Vec3;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Tick result
// ---------------------------------------------------------------------------

/// Events produced by a single [`WorldService::use_time`] call.
///
/// Callers (typically the `WorldDriver`) publish these.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// The tick counter that produced this set of events.
    pub tick: u64,
    /// Simulation time after the tick (seconds).
    pub time: f64,
    /// Transforms of every object that moved this tick.
    pub transforms: Vec<EntityTransform>,
}

pub struct WorldService {
    config: PhysicsConfig,
    store: Arc<LandblockStore>,
    objects: HashMap<ObjectId, PhysicsObj>,
    time: f64,
    tick_count: u64,
    rng: StdRng,
}

impl WorldService {
    pub fn new(config: PhysicsConfig, source: Arc<dyn WorldSource>) -> Self {
        Self::with_store(config, Arc::new(LandblockStore::new(source)))
    }

    /// Share an existing landblock store, e.g. between services.
    pub fn with_store(config: PhysicsConfig, store: Arc<LandblockStore>) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            store,
            objects: HashMap::new(),
            time: 0.0,
            tick_count: 0,
            rng,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LandblockStore> {
        &self.store
    }

    /// Simulation time (seconds).
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn object(&self, id: ObjectId) -> Option<&PhysicsObj> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut PhysicsObj> {
        self.objects.get_mut(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Register an object outside the world. Replaces (and removes from the
    /// world) any object with the same id.
    pub fn create_object(&mut self, object: PhysicsObj) {
        let id = object.id;
        if let Some(mut old) = self.objects.insert(id, object) {
            warn!("create_object: replacing existing object {}", id);
            old.unlink_cells(&self.store);
        }
    }

    /// Convenience constructor using this service's config.
    pub fn new_object(&self, id: ObjectId, shape: ShapeSet, state: PhysicsState) -> PhysicsObj {
        PhysicsObj::new(id, shape, state, &self.config)
    }

    /// Place an object into the world, pushing it out of anything it
    /// overlaps.
    pub fn enter_world(&mut self, id: ObjectId, position: Position) -> Result<Position> {
        self.set_position(id, position, SetPositionFlags::PLACEMENT | SetPositionFlags::SLIDE)
    }

    pub fn set_position(&mut self, id: ObjectId, position: Position, flags: SetPositionFlags) -> Result<Position> {
        let object = self
            .objects
            .get(&id)
            .ok_or(PhysicsError::UnknownObject(id))?;
        if object.parent.is_some() {
            return Err(PhysicsError::Parented(id));
        }
        let shape = object.shape().clone();
        let state = object.state;

        let target = self.resolve(&position)?;
        let placed = if flags.contains(SetPositionFlags::PLACEMENT) {
            let slide = flags.contains(SetPositionFlags::SLIDE);
            match self.try_place(id, &shape, state, target, slide) {
                Some(result) => result,
                None if flags.contains(SetPositionFlags::SCATTER) => self
                    .scatter(id, &shape, state, target, slide)
                    .ok_or(PhysicsError::NoValidPosition(id, target.cell_id))?,
                None => return Err(PhysicsError::Collided(id)),
            }
        } else {
            TransitionResult {
                position: target,
                ..self.placement_probe(id, &shape, state, target)
            }
        };

        let now = self.time;
        let store = self.store.clone();
        let Some(object) = self.objects.get_mut(&id) else {
            return Err(PhysicsError::UnknownObject(id));
        };
        if flags.contains(SetPositionFlags::TELEPORT) || !object.in_world {
            object.teleport_reset(now);
        }
        object.position = placed.position;
        object.contact_plane = placed.contact.plane;
        object
            .transient
            .set(TransientState::CONTACT, placed.contact.in_contact);
        object
            .transient
            .set(TransientState::ON_WALKABLE, placed.contact.on_walkable);
        object.in_world = true;
        object.activate(now);
        object.link_cells(&store);
        debug!("{} placed at {}", id, placed.position);
        self.deliver_move_completions(id);
        Ok(placed.position)
    }

    /// Remove an object from every cell. It keeps its state and can re-enter.
    pub fn leave_world(&mut self, id: ObjectId) -> Result<()> {
        let store = self.store.clone();
        let now = self.time;
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(PhysicsError::UnknownObject(id))?;
        if !object.in_world {
            return Err(PhysicsError::NotInWorld(id));
        }
        object.unlink_cells(&store);
        object.in_world = false;
        object.parent = None;
        object.movement.cancel(&mut object.motion, now);
        object.sticky.unstick();
        self.deliver_move_completions(id);

        for child in self.objects.values_mut().filter(|o| o.parent == Some(id)) {
            child.parent = None;
            child.in_world = false;
        }
        debug!("{} left the world", id);
        Ok(())
    }

    /// Leave the world (if needed) and drop the object.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<PhysicsObj> {
        if self.objects.get(&id).is_some_and(|o| o.in_world) {
            let _ = self.leave_world(id);
        }
        self.objects.remove(&id)
    }

    /// Attach `child` to `parent`; the child stops ticking and mirrors the
    /// parent's position.
    pub fn set_parent(&mut self, child: ObjectId, parent: ObjectId) -> Result<()> {
        if child == parent {
            return Err(PhysicsError::Parented(child));
        }
        let parent_pos = {
            let p = self
                .objects
                .get(&parent)
                .ok_or(PhysicsError::UnknownObject(parent))?;
            if !p.in_world || p.parent.is_some() {
                return Err(PhysicsError::NotInWorld(parent));
            }
            p.position
        };
        let store = self.store.clone();
        let object = self
            .objects
            .get_mut(&child)
            .ok_or(PhysicsError::UnknownObject(child))?;
        object.unlink_cells(&store);
        object.parent = Some(parent);
        object.in_world = true;
        object.mirror_parent(&parent_pos);
        Ok(())
    }

    /// Detach `child` and drop it into the world just in front of its
    /// parent. On failure the child stays attached.
    pub fn clear_parent(&mut self, child: ObjectId) -> Result<Position> {
        let object = self
            .objects
            .get(&child)
            .ok_or(PhysicsError::UnknownObject(child))?;
        let parent = object.parent;
        let mut at = object.position;
        if let Some(holder) = parent.and_then(|p| self.objects.get(&p)) {
            let reach = holder.shape().horizontal_radius()
                + object.shape().horizontal_radius()
                + self.config.contact_tolerance;
            at.frame.origin += heading_vector(holder.position.heading()) * reach;
        }

        if let Some(object) = self.objects.get_mut(&child) {
            object.parent = None;
        }
        let placed = self.set_position(
            child,
            at,
            SetPositionFlags::PLACEMENT | SetPositionFlags::SLIDE | SetPositionFlags::SCATTER,
        );
        if placed.is_err() {
            if let Some(object) = self.objects.get_mut(&child) {
                object.parent = parent;
            }
        }
        placed
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    pub fn perform_movement(&mut self, id: ObjectId, request: MovementRequest) -> Result<()> {
        let variant = {
            let object = self.objects.get(&id).ok_or(PhysicsError::UnknownObject(id))?;
            if !object.in_world {
                return Err(PhysicsError::NotInWorld(id));
            }
            if object.parent.is_some() {
                return Err(PhysicsError::Parented(id));
            }
            object.position.variant
        };
        let target = request
            .target_object()
            .and_then(|t| self.target_info(t, variant));
        let now = self.time;
        if let Some(object) = self.objects.get_mut(&id) {
            object.perform_movement(request, target, now);
        }
        self.deliver_move_completions(id);
        Ok(())
    }

    pub fn receive_target_update(&mut self, id: ObjectId, info: &TargetInfo) -> Result<()> {
        let now = self.time;
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(PhysicsError::UnknownObject(id))?;
        object.receive_target_update(info, now);
        self.deliver_move_completions(id);
        Ok(())
    }

    pub fn set_velocity(&mut self, id: ObjectId, velocity: Vec3) -> Result<()> {
        let now = self.time;
        let object = self
            .objects
            .get_mut(&id)
            .ok_or(PhysicsError::UnknownObject(id))?;
        object.set_velocity(velocity, now);
        Ok(())
    }

    pub fn is_stuck(&self, id: ObjectId) -> bool {
        self.objects
            .get(&id)
            .is_some_and(|o| o.is_stuck(self.time, &self.config))
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    pub fn use_time(&mut self, dt: f64) -> TickEvents {
        self.tick_count += 1;
        self.time += dt.max(0.0);
        let now = self.time;

        let index = self.build_index(None);
        let store = self.store.clone();
        let config = self.config.clone();
        let ctx = TransitionContext::new(&store, &index, &config);

        // Parallel phase: one group per (landblock, variant).
        let mut groups: HashMap<LandblockKey, Vec<&mut PhysicsObj>> = HashMap::new();
        for object in self.objects.values_mut() {
            if object.in_world && object.parent.is_none() && object.is_active() {
                groups
                    .entry(object.position.landblock_key())
                    .or_default()
                    .push(object);
            }
        }
        let mut outcomes: Vec<(ObjectId, UpdateOutcome)> = groups
            .into_par_iter()
            .flat_map(|(_, group)| {
                group
                    .into_iter()
                    .filter_map(|object| object.update_object(now, &ctx).map(|o| (object.id, o)))
                    .collect::<Vec<_>>()
            })
            .collect();
        outcomes.sort_by_key(|(id, _)| *id);

        // Sequential phase.
        for (id, outcome) in &outcomes {
            if outcome.moved {
                if let Some(object) = self.objects.get_mut(id) {
                    object.link_cells(&store);
                }
            }
        }
        for (id, outcome) in &outcomes {
            self.dispatch_collisions(*id, outcome, now);
        }
        self.send_heartbeats(now);
        let ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        for id in &ids {
            self.deliver_move_completions(*id);
        }
        self.expire_collisions(now);
        let mirrored = self.mirror_parents();

        if self.config.unload_interval_ticks > 0 && self.tick_count % self.config.unload_interval_ticks == 0 {
            let unloaded = store.unload_idle();
            if unloaded > 0 {
                debug!("Unloaded {} idle landblocks", unloaded);
            }
        }

        let transforms = outcomes
            .iter()
            .filter(|(_, o)| o.moved)
            .map(|(id, _)| *id)
            .chain(mirrored)
            .filter_map(|id| self.objects.get(&id))
            .map(|o| EntityTransform::from_object(o, dt as f32))
            .collect();

        TickEvents {
            tick: self.tick_count,
            time: now,
            transforms,
        }
    }

    fn dispatch_collisions(&mut self, id: ObjectId, outcome: &UpdateOutcome, now: f64) {
        for hit in &outcome.collided_objects {
            let (Some(mover), Some(other)) = (self.objects.get(&id), self.objects.get(&hit.id)) else {
                continue;
            };
            let mover_profile = mover.collision_profile(hit.ethereal);
            let other_profile = other.collision_profile(hit.ethereal);

            if let Some(mover) = self.objects.get_mut(&id) {
                if mover.record_collision(hit.id, now, hit.ethereal) {
                    mover.notify_collision(hit.id, &other_profile);
                }
            }
            if let Some(other) = self.objects.get_mut(&hit.id) {
                if other.record_collision(id, now, hit.ethereal) {
                    other.notify_collision(id, &mover_profile);
                }
            }
        }
        if let Some(mover) = self.objects.get_mut(&id) {
            if outcome.collided_with_environment && !mover.environment_contact {
                mover.notify_collision_with_environment();
            }
            mover.environment_contact = outcome.collided_with_environment;
        }
    }

    fn send_heartbeats(&mut self, now: f64) {
        let trackers: Vec<(ObjectId, ObjectId, Position)> = self
            .objects
            .values()
            .filter_map(|o| o.tracked_target().map(|t| (o.id, t, o.position)))
            .collect();
        for (tracker, target, fallback) in trackers {
            let info = self
                .target_info(target, fallback.variant)
                .unwrap_or_else(|| TargetInfo::exit_world(target, fallback));
            if let Some(object) = self.objects.get_mut(&tracker) {
                object.receive_target_update(&info, now);
            }
        }
    }

    fn deliver_move_completions(&mut self, id: ObjectId) {
        if let Some(object) = self.objects.get_mut(&id) {
            for reason in object.take_move_completions() {
                object.notify_move_complete(reason);
            }
        }
    }

    fn expire_collisions(&mut self, now: f64) {
        let timeout = self.config.collision_timeout;
        for object in self.objects.values_mut() {
            for other in object.expire_collisions(now, timeout) {
                object.notify_collision_end(other);
            }
        }
    }

    fn mirror_parents(&mut self) -> Vec<ObjectId> {
        let links: Vec<(ObjectId, ObjectId)> = self
            .objects
            .values()
            .filter_map(|o| o.parent.map(|p| (o.id, p)))
            .collect();
        let mut mirrored = Vec::new();
        for (child, parent) in links {
            let Some(parent_pos) = self.objects.get(&parent).map(|p| p.position) else {
                continue;
            };
            if let Some(object) = self.objects.get_mut(&child) {
                if object.position != parent_pos {
                    object.mirror_parent(&parent_pos);
                    mirrored.push(child);
                }
            }
        }
        mirrored
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Normalize and resolve a requested position against loaded cells.
    fn resolve(&self, position: &Position) -> Result<Position> {
        let normalized = position
            .normalized()
            .ok_or(PhysicsError::InvalidCell(position.cell_id))?;
        if self
            .store
            .get_cell(normalized.cell_id, normalized.variant)
            .is_none()
        {
            return Err(PhysicsError::NoCell(normalized.cell_id, normalized.variant));
        }
        let cell = self
            .store
            .resolve_cell(&normalized)
            .ok_or(PhysicsError::NoCell(normalized.cell_id, normalized.variant))?;
        if cell == normalized.cell_id {
            return Ok(normalized);
        }
        Position {
            cell_id: cell,
            ..normalized
        }
        .normalized()
        .ok_or(PhysicsError::InvalidCell(cell))
    }

    fn try_place(
        &self,
        id: ObjectId,
        shape: &ShapeSet,
        state: PhysicsState,
        at: Position,
        slide: bool,
    ) -> Option<TransitionResult> {
        let index = self.build_index(Some(id));
        let ctx = TransitionContext::new(&self.store, &index, &self.config);
        let result = ctx.transition(&TransitionRequest::placement(id, shape, state, at, slide));
        if result.blocked || result.world_missing {
            None
        } else {
            Some(result)
        }
    }

    /// Contact state at `at` without moving there.
    fn placement_probe(&self, id: ObjectId, shape: &ShapeSet, state: PhysicsState, at: Position) -> TransitionResult {
        let index = self.build_index(Some(id));
        let ctx = TransitionContext::new(&self.store, &index, &self.config);
        ctx.transition(&TransitionRequest::placement(id, shape, state, at, false))
    }

    fn scatter(
        &mut self,
        id: ObjectId,
        shape: &ShapeSet,
        state: PhysicsState,
        at: Position,
        slide: bool,
    ) -> Option<TransitionResult> {
        let radius = self.config.scatter_radius;
        for attempt in 0..self.config.scatter_attempts {
            let angle: f32 = self.rng.random_range(0.0..std::f32::consts::TAU);
            let dist: f32 = self.rng.random_range(0.0..=radius);
            let offset = Vec3::new(angle.cos() * dist, angle.sin() * dist, 0.0);
            let candidate = if at.cell_id.is_indoor() {
                Position {
                    frame: Frame::new(at.origin() + offset, at.frame.orientation),
                    ..at
                }
            } else {
                match Position::from_offset(at.landblock(), at.origin() + offset, at.frame.orientation, at.variant) {
                    Some(p) => p,
                    None => continue,
                }
            };
            let Ok(candidate) = self.resolve(&candidate) else {
                continue;
            };
            if let Some(result) = self.try_place(id, shape, state, candidate, slide) {
                debug!("{} scattered on attempt {}", id, attempt + 1);
                return Some(result);
            }
        }
        warn!("{} found no valid position near {}", id, at);
        None
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    fn build_index(&self, exclude: Option<ObjectId>) -> ObjectIndex {
        let mut index = ObjectIndex::new();
        for object in self.objects.values() {
            if !object.in_world || object.parent.is_some() || Some(object.id) == exclude {
                continue;
            }
            let cells = if object.shadow_cells.is_empty() {
                vec![object.position.cell_key()]
            } else {
                object.shadow_cells.clone()
            };
            index.insert(object.snapshot(), &cells);
        }
        index
    }

    fn target_info(&self, target: ObjectId, variant: u32) -> Option<TargetInfo> {
        self.objects
            .get(&target)
            .filter(|o| o.in_world && o.parent.is_none() && o.position.variant == variant)
            .map(|o| o.target_info())
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            loaded_landblocks: self.store.loaded_count(),
            total_objects: self.objects.len(),
            objects_in_world: self.objects.values().filter(|o| o.in_world).count(),
            active_objects: self
                .objects
                .values()
                .filter(|o| o.in_world && o.is_active())
                .count(),
            total_ticks: self.tick_count,
        }
    }
}

impl std::fmt::Debug for WorldService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldService")
            .field("objects", &self.objects.len())
            .field("time", &self.time)
            .field("ticks", &self.tick_count)
            .finish_non_exhaustive()
    }
}
