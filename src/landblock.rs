//! A loaded landblock: terrain, static structures, lazily loaded indoor
//! cells and the per-cell object membership tables.

use crate::geometry::Polygon;
use crate::position::{outdoor_cell_index, LandblockId, LandblockKey, LANDBLOCK_CELL};
use crate::structure::{CellInfo, EnvCell, LandblockData, StructureInstance};
use crate::terrain::HeightChunk;
use crate::types::{ObjectId, Variant};
use glam::Vec3;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Resolved cell: outdoor cells are computed, indoor cells are loaded.
#[derive(Debug, Clone)]
pub enum CellRef {
    Outdoor(LandblockId),
    Indoor(Arc<EnvCell>),
}

impl CellRef {
    pub fn id(&self) -> LandblockId {
        match self {
            CellRef::Outdoor(id) => *id,
            CellRef::Indoor(cell) => cell.id,
        }
    }

    pub fn is_indoor(&self) -> bool {
        matches!(self, CellRef::Indoor(_))
    }
}

/// Objects registered in one cell.
#[derive(Debug, Default, Clone)]
pub struct CellContents {
    /// Objects whose position lies in the cell.
    pub objects: HashSet<ObjectId>,
    /// Objects from neighbouring cells whose shapes reach into this one.
    pub shadows: HashSet<ObjectId>,
}

impl CellContents {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.shadows.is_empty()
    }
}

#[derive(Debug)]
pub struct Landblock {
    key: LandblockKey,
    heights: Arc<HeightChunk>,
    structures: Vec<StructureInstance>,
    cell_infos: Vec<CellInfo>,
    env_cells: RwLock<HashMap<u16, Arc<EnvCell>>>,
    membership: RwLock<HashMap<u16, CellContents>>,
}

impl Landblock {
    pub fn new(key: LandblockKey, data: LandblockData) -> Self {
        Self {
            key,
            heights: data.heights,
            structures: data.structures,
            cell_infos: data.cells,
            env_cells: RwLock::new(HashMap::new()),
            membership: RwLock::new(HashMap::new()),
        }
    }

    pub fn key(&self) -> LandblockKey {
        self.key
    }

    pub fn id(&self) -> LandblockId {
        self.key.landblock
    }

    pub fn variant(&self) -> Variant {
        self.key.variant
    }

    // -----------------------------------------------------------------------
    // Static geometry
    // -----------------------------------------------------------------------

    pub fn heights(&self) -> &HeightChunk {
        &self.heights
    }

    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        self.heights.height_at(x, y)
    }

    pub fn terrain_polygons_near(&self, center: Vec3, reach: f32) -> Vec<Polygon> {
        self.heights.triangles_near(center, reach)
    }

    pub fn structures(&self) -> &[StructureInstance] {
        &self.structures
    }

    /// Structures whose bounding sphere may reach a sphere at `center`.
    pub fn structures_near(&self, center: Vec3, reach: f32) -> impl Iterator<Item = &StructureInstance> {
        self.structures
            .iter()
            .filter(move |s| s.frame.origin.distance(center) <= s.bounds_radius + reach)
    }

    pub fn cell_infos(&self) -> &[CellInfo] {
        &self.cell_infos
    }

    pub fn has_indoor_cell(&self, cell: u16) -> bool {
        self.cell_infos.iter().any(|c| c.id.cell() == cell)
    }

    /// Outdoor cell id for a landblock-local point.
    pub fn outdoor_cell_at(&self, point: Vec3) -> LandblockId {
        self.id().with_cell(outdoor_cell_index(point.x, point.y))
    }

    // -----------------------------------------------------------------------
    // Indoor cell cache
    // -----------------------------------------------------------------------

    pub fn cached_env_cell(&self, cell: u16) -> Option<Arc<EnvCell>> {
        self.env_cells.read().get(&cell).cloned()
    }

    /// Insert-or-get; a concurrent loader that lost the race gets the winner.
    pub fn insert_env_cell(&self, cell: Arc<EnvCell>) -> Arc<EnvCell> {
        self.env_cells
            .write()
            .entry(cell.id.cell())
            .or_insert(cell)
            .clone()
    }

    pub fn loaded_env_cells(&self) -> usize {
        self.env_cells.read().len()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    pub fn add_object(&self, cell: LandblockId, id: ObjectId) {
        self.membership
            .write()
            .entry(cell_word(cell))
            .or_default()
            .objects
            .insert(id);
    }

    pub fn remove_object(&self, cell: LandblockId, id: ObjectId) {
        let mut membership = self.membership.write();
        let word = cell_word(cell);
        if let Some(contents) = membership.get_mut(&word) {
            contents.objects.remove(&id);
            if contents.is_empty() {
                membership.remove(&word);
            }
        }
    }

    pub fn add_shadow(&self, cell: LandblockId, id: ObjectId) {
        self.membership
            .write()
            .entry(cell_word(cell))
            .or_default()
            .shadows
            .insert(id);
    }

    pub fn remove_shadow(&self, cell: LandblockId, id: ObjectId) {
        let mut membership = self.membership.write();
        let word = cell_word(cell);
        if let Some(contents) = membership.get_mut(&word) {
            contents.shadows.remove(&id);
            if contents.is_empty() {
                membership.remove(&word);
            }
        }
    }

    pub fn contents(&self, cell: LandblockId) -> CellContents {
        self.membership
            .read()
            .get(&cell_word(cell))
            .cloned()
            .unwrap_or_default()
    }

    /// Objects and shadows across every cell.
    pub fn member_count(&self) -> usize {
        self.membership
            .read()
            .values()
            .map(|c| c.objects.len() + c.shadows.len())
            .sum()
    }

    pub fn is_idle(&self) -> bool {
        self.membership.read().is_empty()
    }
}

fn cell_word(cell: LandblockId) -> u16 {
    if cell.is_valid() {
        cell.cell()
    } else {
        LANDBLOCK_CELL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::LandblockData;

    fn block() -> Landblock {
        let id = LandblockId::landblock_at(4, 4);
        Landblock::new(
            LandblockKey::new(id, 0),
            LandblockData {
                heights: Arc::new(HeightChunk::flat(0.0)),
                structures: Vec::new(),
                cells: Vec::new(),
            },
        )
    }

    #[test]
    fn membership_empties_cleanly() {
        let lb = block();
        let cell = lb.id().with_cell(1);
        lb.add_object(cell, ObjectId(1));
        lb.add_shadow(cell, ObjectId(2));
        assert_eq!(lb.member_count(), 2);
        lb.remove_object(cell, ObjectId(1));
        lb.remove_shadow(cell, ObjectId(2));
        assert!(lb.is_idle());
    }

    #[test]
    fn outdoor_cell_is_computed() {
        let lb = block();
        assert_eq!(lb.outdoor_cell_at(Vec3::new(30.0, 5.0, 0.0)).cell(), 9);
    }
}
