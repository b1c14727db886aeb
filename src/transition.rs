//! Transition engine: the furthest valid position along a requested move.
//!
//! A transition sweeps a mover's spheres from a start position toward an
//! end offset in sub-steps no longer than the smallest sphere radius. Each
//! sub-step is resolved against terrain, indoor cell polygons, static
//! structures and other objects:
//!
//! * walkable contacts (up-normal at least `floor_z`) lift the mover onto
//!   the surface,
//! * other blocking contacts are recorded and then either stepped over
//!   (when low enough and the mover stands on walkable ground), slid along
//!   (push out along the contact normal, keeping the tangential motion) or,
//!   with sliding disabled, stop the sweep,
//! * after each advance a grounded mover probes downward for walkable
//!   ground within its step-down height.
//!
//! All geometry is computed relative to the start landblock's origin, so
//! precision stays local even when the path crosses landblock edges. The
//! engine only reads shared state: the landblock store and an immutable
//! [`ObjectIndex`] snapshot taken at the start of the tick.

use crate::geometry::{Contact, Frame, Plane, Sphere, EPSILON};
use crate::landblock::{CellRef, Landblock};
use crate::object::PhysicsState;
use crate::position::{CellKey, LandblockId, Position, LANDBLOCK_CELL, LANDBLOCK_SIZE};
use crate::shape::ShapeSet;
use crate::store::{outdoor_cells_around, LandblockStore};
use crate::types::{ObjectId, PhysicsConfig};
use glam::{Quat, Vec3};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Resolution passes per sub-step before the mover is declared stuck.
const MAX_INSERT_TRIES: usize = 6;

// ---------------------------------------------------------------------------
// Object snapshots
// ---------------------------------------------------------------------------

/// Immutable view of one object for the duration of a tick.
#[derive(Debug, Clone)]
pub struct ObjectSnapshot {
    pub id: ObjectId,
    pub position: Position,
    /// Already scaled.
    pub shape: Arc<ShapeSet>,
    pub state: PhysicsState,
}

/// Snapshot of every in-world object, bucketed by the cells each one
/// occupies or shadows.
#[derive(Debug, Default)]
pub struct ObjectIndex {
    objects: HashMap<ObjectId, ObjectSnapshot>,
    cells: HashMap<CellKey, Vec<ObjectId>>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: ObjectSnapshot, cells: &[CellKey]) {
        for cell in cells {
            self.cells.entry(*cell).or_default().push(snapshot.id);
        }
        self.objects.insert(snapshot.id, snapshot);
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectSnapshot> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects registered in any of `cells`, each once, minus `exclude`.
    pub fn in_cells(&self, cells: &[CellKey], exclude: ObjectId) -> Vec<&ObjectSnapshot> {
        let mut seen = HashSet::new();
        cells
            .iter()
            .filter_map(|c| self.cells.get(c))
            .flatten()
            .filter(|id| **id != exclude && seen.insert(**id))
            .filter_map(|id| self.objects.get(id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransitionRequest<'a> {
    pub mover: ObjectId,
    /// Mover shapes, already scaled.
    pub shape: &'a ShapeSet,
    pub state: PhysicsState,
    pub start: Position,
    /// Requested end, relative to the start landblock's origin.
    pub end: Vec3,
    pub orientation: Quat,
    pub was_on_walkable: bool,
    pub allow_sliding: bool,
    /// Zero-length insertion at `start` (set-position / enter-world).
    pub placement: bool,
}

impl<'a> TransitionRequest<'a> {
    pub fn placement(mover: ObjectId, shape: &'a ShapeSet, state: PhysicsState, at: Position, allow_sliding: bool) -> Self {
        Self {
            mover,
            shape,
            state,
            end: at.origin(),
            orientation: at.frame.orientation,
            start: at,
            was_on_walkable: false,
            allow_sliding,
            placement: true,
        }
    }
}

/// Contact state at the resolved position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactState {
    pub in_contact: bool,
    pub on_walkable: bool,
    /// Supporting plane, relative to the resolved landblock.
    pub plane: Option<Plane>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHit {
    pub id: ObjectId,
    pub ethereal: bool,
}

#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub position: Position,
    pub contact: ContactState,
    /// Every object touched during the sweep, each once, sorted by id.
    pub collided_objects: Vec<ObjectHit>,
    pub collided_with_environment: bool,
    /// Normal of the last blocking (non-walkable) contact.
    pub collision_normal: Option<Vec3>,
    /// Normal the mover slid along, if it slid.
    pub sliding_normal: Option<Vec3>,
    /// The sweep stopped short of the requested end.
    pub blocked: bool,
    /// A needed landblock was not available; the mover was left in place.
    pub world_missing: bool,
}

impl TransitionResult {
    fn unmoved(start: Position) -> Self {
        Self {
            position: start,
            contact: ContactState::default(),
            collided_objects: Vec::new(),
            collided_with_environment: false,
            collision_normal: None,
            sliding_normal: None,
            blocked: false,
            world_missing: false,
        }
    }

    pub fn collided(&self) -> bool {
        self.collided_with_environment || self.collided_objects.iter().any(|h| !h.ethereal)
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Shared, read-only inputs for every transition in a tick.
pub struct TransitionContext<'a> {
    pub store: &'a LandblockStore,
    pub objects: &'a ObjectIndex,
    pub config: &'a PhysicsConfig,
}

impl<'a> TransitionContext<'a> {
    pub fn new(store: &'a LandblockStore, objects: &'a ObjectIndex, config: &'a PhysicsConfig) -> Self {
        Self {
            store,
            objects,
            config,
        }
    }

    pub fn transition(&self, request: &TransitionRequest<'_>) -> TransitionResult {
        if request.state.contains(PhysicsState::STATIC) {
            return TransitionResult::unmoved(request.start);
        }
        let mut sweep = Sweep::new(self, request);
        sweep.run()
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Obstacle {
    Environment,
    Object {
        id: ObjectId,
        ethereal: bool,
        as_environment: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    contact: Contact,
    obstacle: Obstacle,
}

enum Settle {
    /// No blocking penetration; `support` is the best walkable contact.
    Clear { pos: Vec3, support: Option<Contact>, touching: Vec<Hit> },
    Blocked { pos: Vec3, hit: Hit },
}

struct Sweep<'c, 'r> {
    ctx: &'c TransitionContext<'c>,
    req: &'r TransitionRequest<'r>,
    reference: LandblockId,
    spheres: Vec<Sphere>,
    landblocks: HashMap<LandblockId, Arc<Landblock>>,
    hits: BTreeMap<ObjectId, bool>,
    environment: bool,
    collision_normal: Option<Vec3>,
    sliding_normal: Option<Vec3>,
    missing: bool,
}

impl<'c, 'r> Sweep<'c, 'r> {
    fn new(ctx: &'c TransitionContext<'c>, req: &'r TransitionRequest<'r>) -> Self {
        let spheres = req
            .shape
            .mover_spheres()
            .into_iter()
            .map(|s| Sphere::new(req.orientation * s.center, s.radius))
            .collect();
        Self {
            ctx,
            req,
            reference: req.start.landblock(),
            spheres,
            landblocks: HashMap::new(),
            hits: BTreeMap::new(),
            environment: false,
            collision_normal: None,
            sliding_normal: None,
            missing: false,
        }
    }

    fn config(&self) -> &PhysicsConfig {
        self.ctx.config
    }

    fn run(&mut self) -> TransitionResult {
        let start = self.req.start;
        let start_off = start.origin();
        let mut cur = start_off;
        let mut cell = start.cell_id;
        let mut grounded = self.req.was_on_walkable;
        let mut blocked = false;

        if self.spheres.is_empty() {
            return self.shapeless_move();
        }

        if self.req.placement {
            match self.place(cur, cell) {
                Some(pos) => cur = pos,
                None => blocked = true,
            }
        } else {
            let delta = self.req.end - start_off;
            let dist = delta.length();
            let min_radius = self
                .spheres
                .iter()
                .map(|s| s.radius)
                .fold(f32::MAX, f32::min)
                .max(EPSILON);
            let steps = if dist > EPSILON {
                ((dist / min_radius).ceil() as usize).clamp(1, self.config().max_transition_steps.max(1))
            } else {
                0
            };
            let step = if steps > 0 { delta / steps as f32 } else { Vec3::ZERO };

            for _ in 0..steps {
                let Some((next, support)) = self.advance(cur, cur + step, cell, grounded) else {
                    blocked = true;
                    break;
                };
                let Some(located) = self.locate(next, cell) else {
                    blocked = true;
                    break;
                };
                cur = next;
                cell = located.cell_id;
                grounded = support;
            }
        }

        if self.missing {
            warn!(
                "transition for {} left in place: landblock data missing near {}",
                self.req.mover, start
            );
            let mut result = TransitionResult::unmoved(start);
            result.world_missing = true;
            result.blocked = true;
            return result;
        }

        let Some(position) = self.locate(cur, cell) else {
            let mut result = TransitionResult::unmoved(start);
            result.blocked = true;
            return result;
        };
        let contact = self.final_contact(cur, position.cell_id, &position);

        TransitionResult {
            position,
            contact,
            collided_objects: self
                .hits
                .iter()
                .map(|(id, ethereal)| ObjectHit {
                    id: *id,
                    ethereal: *ethereal,
                })
                .collect(),
            collided_with_environment: self.environment,
            collision_normal: self.collision_normal,
            sliding_normal: self.sliding_normal,
            blocked,
            world_missing: false,
        }
    }

    /// Objects without shapes move freely but still change cells.
    fn shapeless_move(&mut self) -> TransitionResult {
        let end = if self.req.placement {
            self.req.start.origin()
        } else {
            self.req.end
        };
        match self.locate(end, self.req.start.cell_id) {
            Some(position) => TransitionResult {
                position,
                ..TransitionResult::unmoved(self.req.start)
            },
            None => {
                let mut result = TransitionResult::unmoved(self.req.start);
                result.blocked = true;
                result.world_missing = self.missing;
                result
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sub-step resolution
    // -----------------------------------------------------------------------

    /// Resolve one sub-step from `from` toward `target`. Returns the accepted
    /// offset and whether it rests on walkable ground, or `None` if the
    /// mover cannot advance at all.
    fn advance(&mut self, from: Vec3, target: Vec3, cell: LandblockId, grounded: bool) -> Option<(Vec3, bool)> {
        let step_up = self.step_up_height();
        let mut candidate = target;
        let mut stepped_up = false;
        let mut tried_step = false;

        for _ in 0..MAX_INSERT_TRIES {
            match self.settle(candidate, cell) {
                Settle::Clear { pos, support, touching } => {
                    self.record_touching(&touching);
                    if support.is_some() || !grounded || self.req.state.contains(PhysicsState::MISSILE) {
                        return Some((pos, support.is_some()));
                    }
                    let drop = self.step_down_height() + if stepped_up { step_up } else { 0.0 };
                    return Some(match self.step_down(pos, cell, drop) {
                        Some(ground) => (ground, true),
                        None => (pos, false),
                    });
                }
                Settle::Blocked { pos, hit } => {
                    self.record_block(&hit);
                    let height = hit.contact.point.z - pos.z;
                    if grounded && !tried_step && height <= step_up && step_up > 0.0 {
                        tried_step = true;
                        let raised = pos + Vec3::Z * step_up;
                        if let Settle::Clear { .. } = self.settle(raised, cell) {
                            candidate = raised;
                            stepped_up = true;
                            continue;
                        }
                    }
                    if !self.req.allow_sliding {
                        return None;
                    }
                    self.sliding_normal = Some(hit.contact.normal);
                    candidate = pos + hit.contact.normal * (hit.contact.depth + EPSILON);
                }
            }
        }
        debug!("{} stuck resolving step from {:?}", self.req.mover, from);
        None
    }

    /// Zero-length insertion at `at`; pushes out of blockers when sliding is
    /// allowed.
    fn place(&mut self, at: Vec3, cell: LandblockId) -> Option<Vec3> {
        let mut candidate = at;
        for _ in 0..MAX_INSERT_TRIES {
            match self.settle(candidate, cell) {
                Settle::Clear { pos, touching, .. } => {
                    self.record_touching(&touching);
                    return Some(pos);
                }
                Settle::Blocked { pos, hit } => {
                    self.record_block(&hit);
                    if !self.req.allow_sliding {
                        return None;
                    }
                    candidate = pos + hit.contact.normal * (hit.contact.depth + EPSILON);
                }
            }
        }
        None
    }

    /// Probe downward in radius-sized increments for walkable ground.
    fn step_down(&mut self, from: Vec3, cell: LandblockId, drop: f32) -> Option<Vec3> {
        if drop <= 0.0 {
            return None;
        }
        let min_radius = self.spheres.iter().map(|s| s.radius).fold(f32::MAX, f32::min);
        let count = (drop / min_radius.max(EPSILON)).ceil().max(1.0) as usize;
        for i in 1..=count {
            let probe = from - Vec3::Z * (drop * i as f32 / count as f32);
            match self.settle(probe, cell) {
                Settle::Clear {
                    pos,
                    support: Some(_),
                    touching,
                } => {
                    self.record_touching(&touching);
                    return Some(pos);
                }
                Settle::Clear { .. } => continue,
                Settle::Blocked { .. } => return None,
            }
        }
        None
    }

    /// Lift out of walkable penetrations; stop at the first blocking one.
    fn settle(&mut self, at: Vec3, cell: LandblockId) -> Settle {
        let floor_z = self.config().floor_z;
        let tolerance = self.config().contact_tolerance;
        let mut pos = at;
        let mut lifted: Option<Contact> = None;

        for _ in 0..MAX_INSERT_TRIES {
            let hits = self.gather(pos, cell, tolerance);
            let deepest = hits
                .iter()
                .filter(|h| self.blocks(h) && h.contact.depth > EPSILON)
                .max_by(|a, b| a.contact.depth.total_cmp(&b.contact.depth))
                .copied();
            match deepest {
                None => {
                    let support = hits
                        .iter()
                        .filter(|h| self.supports(h))
                        .max_by(|a, b| a.contact.normal.z.total_cmp(&b.contact.normal.z))
                        .map(|h| h.contact)
                        .or(lifted);
                    let touching = hits
                        .into_iter()
                        .filter(|h| h.contact.depth > -tolerance)
                        .collect();
                    return Settle::Clear { pos, support, touching };
                }
                Some(hit) if hit.contact.normal.z >= floor_z => {
                    pos.z += hit.contact.depth / hit.contact.normal.z;
                    lifted = Some(hit.contact);
                }
                Some(hit) => return Settle::Blocked { pos, hit },
            }
        }
        let hits = self.gather(pos, cell, tolerance);
        match hits
            .into_iter()
            .filter(|h| self.blocks(h) && h.contact.depth > EPSILON)
            .max_by(|a, b| a.contact.depth.total_cmp(&b.contact.depth))
        {
            Some(hit) => Settle::Blocked { pos, hit },
            None => Settle::Clear {
                pos,
                support: lifted,
                touching: Vec::new(),
            },
        }
    }

    fn blocks(&self, hit: &Hit) -> bool {
        match hit.obstacle {
            Obstacle::Object { ethereal, .. } => !ethereal,
            Obstacle::Environment => {
                !self.req.state.contains(PhysicsState::ETHEREAL)
                    || hit.contact.normal.z >= self.config().floor_z
            }
        }
    }

    fn supports(&self, hit: &Hit) -> bool {
        self.blocks(hit)
            && hit.contact.normal.z >= self.config().floor_z
            && hit.contact.depth > -self.config().contact_tolerance
    }

    fn record_block(&mut self, hit: &Hit) {
        self.collision_normal = Some(hit.contact.normal);
        self.record_hit(hit);
    }

    fn record_touching(&mut self, hits: &[Hit]) {
        for hit in hits {
            if let Obstacle::Object { .. } = hit.obstacle {
                self.record_hit(hit);
            }
        }
    }

    fn record_hit(&mut self, hit: &Hit) {
        match hit.obstacle {
            Obstacle::Environment => self.environment = true,
            Obstacle::Object {
                as_environment: true,
                ethereal: false,
                ..
            } => self.environment = true,
            Obstacle::Object { id, ethereal, .. } => {
                let entry = self.hits.entry(id).or_insert(ethereal);
                *entry &= ethereal;
            }
        }
    }

    fn final_contact(&mut self, at: Vec3, cell: LandblockId, position: &Position) -> ContactState {
        let tolerance = self.config().contact_tolerance;
        let hits = self.gather(at, cell, tolerance);
        self.record_touching(
            &hits
                .iter()
                .filter(|h| h.contact.depth > -tolerance)
                .copied()
                .collect::<Vec<_>>(),
        );
        let in_contact = hits
            .iter()
            .any(|h| self.blocks(h) && h.contact.depth > -tolerance);
        let support = hits
            .iter()
            .filter(|h| self.supports(h))
            .max_by(|a, b| a.contact.normal.z.total_cmp(&b.contact.normal.z))
            .map(|h| h.contact);
        let rebase = self.block_offset(position.cell_id);
        ContactState {
            in_contact,
            on_walkable: support.is_some(),
            plane: support.map(|c| Plane::from_point_normal(c.point - rebase, c.normal)),
        }
    }

    // -----------------------------------------------------------------------
    // Contact gathering
    // -----------------------------------------------------------------------

    fn gather(&mut self, pos: Vec3, cell: LandblockId, tolerance: f32) -> Vec<Hit> {
        let spheres = self.spheres.clone();
        let indoor = if cell.is_indoor() {
            match self.ctx.store.get_cell(cell, self.req.start.variant) {
                Some(CellRef::Indoor(c)) => Some(c),
                _ => {
                    self.missing = true;
                    None
                }
            }
        } else {
            None
        };
        let outside = indoor
            .as_ref()
            .map(|c| c.seen_outside || c.portals.contains(&LANDBLOCK_CELL))
            .unwrap_or(true);

        let mut hits = Vec::new();
        for sphere in &spheres {
            let center = pos + sphere.center;
            let r = sphere.radius;
            if outside {
                self.gather_outdoor(center, r, tolerance, &mut hits);
            }
            if let Some(env) = &indoor {
                self.gather_indoor(env.id, center, r, tolerance, &mut hits);
            }
            self.gather_objects(center, r, cell, tolerance, &mut hits);
        }
        hits
    }

    fn gather_outdoor(&mut self, center: Vec3, r: f32, tolerance: f32, hits: &mut Vec<Hit>) {
        let mut blocks: Vec<LandblockId> = outdoor_cells_around(self.reference, center, r + tolerance)
            .into_iter()
            .map(|c| c.landblock())
            .collect();
        blocks.sort();
        blocks.dedup();

        for id in blocks {
            let Some(lb) = self.landblock(id) else {
                continue;
            };
            let offset = self.block_offset(id);
            let local = center - offset;
            for poly in lb.terrain_polygons_near(local, r + tolerance) {
                if let Some(c) = poly.sphere_contact(local, r, tolerance) {
                    hits.push(environment_hit(c, offset));
                }
            }
            for s in lb.structures_near(local, r + tolerance) {
                for c in s.shape.sphere_contacts(&s.frame, local, r, tolerance) {
                    hits.push(environment_hit(c, offset));
                }
            }
        }
    }

    fn gather_indoor(&mut self, cell: LandblockId, center: Vec3, r: f32, tolerance: f32, hits: &mut Vec<Hit>) {
        let variant = self.req.start.variant;
        let offset = self.block_offset(cell);
        let local = center - offset;
        let mut visit = vec![cell];
        if let Some(CellRef::Indoor(env)) = self.ctx.store.get_cell(cell, variant) {
            visit.extend(
                env.portals
                    .iter()
                    .filter(|p| **p != LANDBLOCK_CELL)
                    .map(|p| cell.with_cell(*p)),
            );
        }
        for id in visit {
            let Some(CellRef::Indoor(env)) = self.ctx.store.get_cell(id, variant) else {
                continue;
            };
            for poly in &env.polygons {
                if let Some(c) = poly.sphere_contact(local, r, tolerance) {
                    hits.push(environment_hit(c, offset));
                }
            }
            for s in &env.structures {
                if s.frame.origin.distance(local) > s.bounds_radius + r + tolerance {
                    continue;
                }
                for c in s.shape.sphere_contacts(&s.frame, local, r, tolerance) {
                    hits.push(environment_hit(c, offset));
                }
            }
        }
    }

    fn gather_objects(&mut self, center: Vec3, r: f32, cell: LandblockId, tolerance: f32, hits: &mut Vec<Hit>) {
        if self.req.state.contains(PhysicsState::IGNORE_COLLISIONS) || self.ctx.objects.is_empty() {
            return;
        }
        let variant = self.req.start.variant;
        let probe = Position {
            cell_id: cell,
            frame: Frame::from_origin(center - self.block_offset(cell)),
            variant,
        };
        let cells = self.ctx.store.shadow_cells(&probe, r + tolerance);
        let mover_ethereal = self.req.state.contains(PhysicsState::ETHEREAL);

        for other in self.ctx.objects.in_cells(&cells, self.req.mover) {
            if other.state.contains(PhysicsState::IGNORE_COLLISIONS) {
                continue;
            }
            let frame = Frame::new(other.position.offset_from(self.reference), other.position.frame.orientation);
            let ethereal = mover_ethereal || other.state.contains(PhysicsState::ETHEREAL);
            let as_environment = other
                .state
                .contains(PhysicsState::REPORT_COLLISIONS_AS_ENVIRONMENT);
            for contact in other.shape.sphere_contacts(&frame, center, r, tolerance) {
                hits.push(Hit {
                    contact,
                    obstacle: Obstacle::Object {
                        id: other.id,
                        ethereal,
                        as_environment,
                    },
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Frames and cells
    // -----------------------------------------------------------------------

    fn landblock(&mut self, id: LandblockId) -> Option<Arc<Landblock>> {
        if let Some(lb) = self.landblocks.get(&id) {
            return Some(lb.clone());
        }
        match self.ctx.store.get_landblock(id, self.req.start.variant) {
            Some(lb) => {
                self.landblocks.insert(id, lb.clone());
                Some(lb)
            }
            None => {
                self.missing = true;
                None
            }
        }
    }

    /// Origin of `id`'s landblock relative to the reference landblock.
    fn block_offset(&self, id: LandblockId) -> Vec3 {
        let dx = id.lb_x() as i32 - self.reference.lb_x() as i32;
        let dy = id.lb_y() as i32 - self.reference.lb_y() as i32;
        Vec3::new(dx as f32 * LANDBLOCK_SIZE, dy as f32 * LANDBLOCK_SIZE, 0.0)
    }

    /// Normalized position and resolved cell for a reference-relative offset.
    fn locate(&mut self, offset: Vec3, cell: LandblockId) -> Option<Position> {
        let variant = self.req.start.variant;
        let orientation = self.req.orientation;
        let pos = if cell.is_indoor() {
            Position {
                cell_id: cell,
                frame: Frame::new(offset - self.block_offset(cell), orientation),
                variant,
            }
        } else {
            Position::from_offset(self.reference, offset, orientation, variant)?
        };
        let Some(resolved) = self.ctx.store.resolve_cell(&pos) else {
            self.missing = true;
            return None;
        };
        if resolved == pos.cell_id {
            return Some(pos);
        }
        Position {
            cell_id: resolved,
            ..pos
        }
        .normalized()
    }

    fn step_up_height(&self) -> f32 {
        if self.req.shape.step_up_height > 0.0 {
            self.req.shape.step_up_height
        } else {
            self.config().step_up_height
        }
    }

    fn step_down_height(&self) -> f32 {
        if self.req.shape.step_down_height > 0.0 {
            self.req.shape.step_down_height
        } else {
            self.config().step_down_height
        }
    }
}

fn environment_hit(contact: Contact, offset: Vec3) -> Hit {
    Hit {
        contact: Contact {
            point: contact.point + offset,
            ..contact
        },
        obstacle: Obstacle::Environment,
    }
}
