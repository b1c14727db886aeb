//! Structure subsystem: static structures, indoor cell definitions and their
//! registry, plus the top-level `World` data container.

use crate::geometry::{Frame, Polygon};
use crate::position::LandblockId;
use crate::shape::ShapeSet;
use crate::terrain::{HeightChunk, TerrainSource};
use crate::types::Variant;
use glam::Vec3;
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Structure instance
// ---------------------------------------------------------------------------

/// A single static structure placed in a landblock (building, rock, wall …).
#[derive(Debug, Clone)]
pub struct StructureInstance {
    /// Globally unique identifier for the structure.
    pub id: String,
    /// Landblock the frame is relative to.
    pub landblock: LandblockId,
    /// Landblock-local placement.
    pub frame: Frame,
    /// Bounding radius around `frame.origin` used for range queries.
    pub bounds_radius: f32,
    /// Collision shapes in the structure's local frame.
    pub shape: Arc<ShapeSet>,
}

impl StructureInstance {
    pub fn new(id: impl Into<String>, landblock: LandblockId, frame: Frame, shape: ShapeSet) -> Self {
        Self {
            id: id.into(),
            landblock: landblock.landblock(),
            frame,
            bounds_radius: shape.bounding_radius(),
            shape: Arc::new(shape),
        }
    }
}

// ---------------------------------------------------------------------------
// Indoor cells
// ---------------------------------------------------------------------------

/// Static definition of an indoor cell. Geometry is landblock-local.
#[derive(Debug, Clone)]
pub struct EnvCell {
    pub id: LandblockId,
    /// Single-sided polygons facing into the cell.
    pub polygons: Vec<Polygon>,
    /// Cells reachable through portals; `0xFFFF` leads outside.
    pub portals: Vec<u16>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    /// Reachable directly from outdoor cells.
    pub seen_outside: bool,
    /// Static objects inside the cell.
    pub structures: Vec<StructureInstance>,
}

impl EnvCell {
    /// Box room with inward faces. Sides whose outward normal is listed in
    /// `open_sides` are left out so movers can walk through.
    pub fn room(id: LandblockId, min: Vec3, max: Vec3, open_sides: &[Vec3]) -> Self {
        let polygons = Polygon::box_faces(min, max)
            .into_iter()
            .filter(|face| {
                !open_sides
                    .iter()
                    .any(|side| face.plane.normal.dot(*side) > 0.99)
            })
            .filter_map(|face| {
                let mut verts = face.vertices;
                verts.reverse();
                Polygon::new(verts)
            })
            .collect();
        Self {
            id,
            polygons,
            portals: Vec::new(),
            bounds_min: min,
            bounds_max: max,
            seen_outside: false,
            structures: Vec::new(),
        }
    }

    pub fn with_portal(mut self, other: u16) -> Self {
        self.portals.push(other);
        self
    }

    pub fn seen_outside(mut self) -> Self {
        self.seen_outside = true;
        self
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.bounds_min).all() && point.cmple(self.bounds_max).all()
    }

    pub fn info(&self) -> CellInfo {
        CellInfo {
            id: self.id,
            bounds_min: self.bounds_min,
            bounds_max: self.bounds_max,
            seen_outside: self.seen_outside,
        }
    }
}

/// What a landblock knows about its indoor cells before they are loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellInfo {
    pub id: LandblockId,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub seen_outside: bool,
}

impl CellInfo {
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.bounds_min).all() && point.cmple(self.bounds_max).all()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds all static structures and indoor cells placed in the world.
pub struct StructureRegistry {
    instances: HashMap<String, StructureInstance>,
    env_cells: HashMap<LandblockId, Arc<EnvCell>>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
            env_cells: HashMap::new(),
        }
    }

    pub fn insert(&mut self, structure: StructureInstance) {
        self.instances.insert(structure.id.clone(), structure);
    }

    pub fn get(&self, id: &str) -> Option<&StructureInstance> {
        self.instances.get(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn insert_env_cell(&mut self, cell: EnvCell) {
        self.env_cells.insert(cell.id, Arc::new(cell));
    }

    pub fn env_cell(&self, id: LandblockId) -> Option<Arc<EnvCell>> {
        self.env_cells.get(&id).cloned()
    }

    /// Indoor cells of one landblock, sorted by id.
    pub fn cells_in(&self, landblock: LandblockId) -> Vec<CellInfo> {
        let landblock = landblock.landblock();
        let mut cells: Vec<CellInfo> = self
            .env_cells
            .values()
            .filter(|c| c.id.landblock() == landblock)
            .map(|c| c.info())
            .collect();
        cells.sort_by_key(|c| c.id);
        cells
    }

    /// Return the structures of `landblock` whose bounding circle overlaps
    /// the given landblock-local rectangle.
    pub fn query_rect(
        &self,
        landblock: LandblockId,
        min_x: f32,
        min_y: f32,
        max_x: f32,
        max_y: f32,
    ) -> Vec<&StructureInstance> {
        let landblock = landblock.landblock();
        self.instances
            .values()
            .filter(|s| s.landblock == landblock)
            .filter(|s| {
                let r = s.bounds_radius;
                let p = s.frame.origin;
                p.x + r >= min_x && p.x - r <= max_x && p.y + r >= min_y && p.y - r <= max_y
            })
            .collect()
    }
}

impl Default for StructureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// World source
// ---------------------------------------------------------------------------

/// Everything needed to build a loaded landblock.
pub struct LandblockData {
    pub heights: Arc<HeightChunk>,
    pub structures: Vec<StructureInstance>,
    pub cells: Vec<CellInfo>,
}

/// Static world data read by the landblock store. Loading is synchronous and
/// happens once per landblock or cell per variant.
pub trait WorldSource: Send + Sync {
    fn landblock(&self, id: LandblockId, variant: Variant) -> Option<LandblockData>;
    fn env_cell(&self, id: LandblockId, variant: Variant) -> Option<Arc<EnvCell>>;
}

// ---------------------------------------------------------------------------
// World (data container)
// ---------------------------------------------------------------------------

/// The immutable world data layer. Every variant shares the same layout.
pub struct World {
    pub terrain: Arc<dyn TerrainSource>,
    pub structures: StructureRegistry,
}

impl World {
    pub fn new(terrain: Arc<dyn TerrainSource>) -> Self {
        Self {
            terrain,
            structures: StructureRegistry::new(),
        }
    }
}

impl WorldSource for World {
    fn landblock(&self, id: LandblockId, _variant: Variant) -> Option<LandblockData> {
        let heights = self.terrain.landblock_heights(id.lb_x(), id.lb_y())?;
        let size = crate::position::LANDBLOCK_SIZE;
        let structures = self
            .structures
            .query_rect(id, f32::NEG_INFINITY, f32::NEG_INFINITY, size * 2.0, size * 2.0)
            .into_iter()
            .cloned()
            .collect();
        Some(LandblockData {
            heights,
            structures,
            cells: self.structures.cells_in(id),
        })
    }

    fn env_cell(&self, id: LandblockId, _variant: Variant) -> Option<Arc<EnvCell>> {
        if !id.is_indoor() {
            return None;
        }
        self.structures.env_cell(id)
    }
}
