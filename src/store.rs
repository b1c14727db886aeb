//! Concurrent landblock cache keyed by `(landblock, variant)`.
//!
//! Lookups take the read lock first and only fall back to the write lock on
//! a miss, re-checking the entry under it, so concurrent first access from
//! many workers constructs each landblock exactly once.

use crate::landblock::{CellRef, Landblock};
use crate::position::{
    CellKey, LandblockId, LandblockKey, Position, CELLS_PER_SIDE, CELL_SIZE, FIRST_OUTDOOR_CELL,
    LANDBLOCK_CELL,
};
use crate::structure::{CellInfo, WorldSource};
use crate::types::Variant;
use glam::Vec3;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Adjust-cell cache
// ---------------------------------------------------------------------------

/// Indoor cells of one landblock variant with their bounds, used to
/// re-target a position whose indoor cell id is stale or unknown.
#[derive(Debug)]
pub struct AdjustCell {
    landblock: LandblockId,
    cells: Vec<CellInfo>,
}

impl AdjustCell {
    pub fn landblock(&self) -> LandblockId {
        self.landblock
    }

    /// First indoor cell whose bounds contain the landblock-local `point`.
    pub fn find(&self, point: Vec3) -> Option<LandblockId> {
        self.cells.iter().find(|c| c.contains(point)).map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct LandblockStore {
    source: Arc<dyn WorldSource>,
    landblocks: RwLock<HashMap<LandblockKey, Arc<Landblock>>>,
    adjust_cells: RwLock<HashMap<LandblockKey, Arc<AdjustCell>>>,
    loads: AtomicUsize,
}

impl LandblockStore {
    pub fn new(source: Arc<dyn WorldSource>) -> Self {
        Self {
            source,
            landblocks: RwLock::new(HashMap::new()),
            adjust_cells: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// The landblock for `id`'s coordinates in `variant`, loading it on first
    /// access. `None` for invalid ids or coordinates without world data.
    pub fn get_landblock(&self, id: LandblockId, variant: Variant) -> Option<Arc<Landblock>> {
        if !id.is_valid() {
            debug!("get_landblock: invalid id {}", id);
            return None;
        }
        let key = LandblockKey::new(id, variant);
        if let Some(lb) = self.landblocks.read().get(&key) {
            return Some(lb.clone());
        }

        let mut landblocks = self.landblocks.write();
        match landblocks.entry(key) {
            Entry::Occupied(e) => Some(e.get().clone()),
            Entry::Vacant(v) => {
                let Some(data) = self.source.landblock(key.landblock, variant) else {
                    debug!("No world data for landblock {}", key);
                    return None;
                };
                let lb = Arc::new(Landblock::new(key, data));
                self.loads.fetch_add(1, Ordering::Relaxed);
                debug!("Loaded landblock {}", key);
                v.insert(lb.clone());
                Some(lb)
            }
        }
    }

    /// Resolve a cell id. Outdoor cells are computed; indoor cells are loaded
    /// from world data on first reference and cached per variant.
    pub fn get_cell(&self, cell_id: LandblockId, variant: Variant) -> Option<CellRef> {
        if !cell_id.is_valid() || cell_id.cell() == LANDBLOCK_CELL {
            return None;
        }
        let lb = self.get_landblock(cell_id, variant)?;
        if cell_id.is_outdoor() {
            return Some(CellRef::Outdoor(cell_id));
        }
        if let Some(cell) = lb.cached_env_cell(cell_id.cell()) {
            return Some(CellRef::Indoor(cell));
        }
        let Some(cell) = self.source.env_cell(cell_id, variant) else {
            debug!("No indoor cell {} in variant {}", cell_id, variant);
            return None;
        };
        Some(CellRef::Indoor(lb.insert_env_cell(cell)))
    }

    /// Cached indoor-cell bounds for a landblock variant.
    pub fn adjust_cell(&self, id: LandblockId, variant: Variant) -> Option<Arc<AdjustCell>> {
        let key = LandblockKey::new(id, variant);
        if let Some(adjust) = self.adjust_cells.read().get(&key) {
            return Some(adjust.clone());
        }
        let lb = self.get_landblock(id, variant)?;
        let mut cache = self.adjust_cells.write();
        let adjust = cache
            .entry(key)
            .or_insert_with(|| {
                Arc::new(AdjustCell {
                    landblock: key.landblock,
                    cells: lb.cell_infos().to_vec(),
                })
            })
            .clone();
        Some(adjust)
    }

    /// Remove a landblock if nothing lives in it and nobody else holds it.
    pub fn unload_landblock(&self, id: LandblockId, variant: Variant) -> bool {
        let key = LandblockKey::new(id, variant);
        let mut landblocks = self.landblocks.write();
        let Some(lb) = landblocks.get(&key) else {
            return false;
        };
        if !lb.is_idle() || Arc::strong_count(lb) > 1 {
            return false;
        }
        landblocks.remove(&key);
        drop(landblocks);
        self.adjust_cells.write().remove(&key);
        debug!("Unloaded landblock {}", key);
        true
    }

    /// Unload every landblock that is safe to drop. Returns how many went.
    pub fn unload_idle(&self) -> usize {
        let keys: Vec<LandblockKey> = self.landblocks.read().keys().copied().collect();
        keys.into_iter()
            .filter(|k| self.unload_landblock(k.landblock, k.variant))
            .count()
    }

    pub fn is_loaded(&self, id: LandblockId, variant: Variant) -> bool {
        self.landblocks
            .read()
            .contains_key(&LandblockKey::new(id, variant))
    }

    pub fn loaded_count(&self) -> usize {
        self.landblocks.read().len()
    }

    /// Landblocks constructed since the store was created.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Cell resolution
    // -----------------------------------------------------------------------

    /// The cell a landblock-normalized position belongs in, starting from
    /// its current cell id. `None` if a needed landblock is not available.
    pub fn resolve_cell(&self, pos: &Position) -> Option<LandblockId> {
        let lb = self.get_landblock(pos.cell_id, pos.variant)?;
        let point = pos.origin();

        if pos.cell_id.is_indoor() {
            if let Some(CellRef::Indoor(cell)) = self.get_cell(pos.cell_id, pos.variant) {
                if cell.contains(point) {
                    return Some(cell.id);
                }
                for &portal in &cell.portals {
                    if portal == LANDBLOCK_CELL {
                        continue;
                    }
                    let other = cell.id.with_cell(portal);
                    if let Some(CellRef::Indoor(next)) = self.get_cell(other, pos.variant) {
                        if next.contains(point) {
                            return Some(next.id);
                        }
                    }
                }
            }
            if let Some(found) = self
                .adjust_cell(pos.cell_id, pos.variant)
                .and_then(|a| a.find(point))
            {
                return Some(found);
            }
            return Some(lb.outdoor_cell_at(point));
        }

        // Outdoor: only seen-outside cells can be walked into.
        if let Some(info) = lb
            .cell_infos()
            .iter()
            .find(|c| c.seen_outside && c.contains(point))
        {
            return Some(info.id);
        }
        Some(lb.outdoor_cell_at(point))
    }

    /// Every cell a sphere at `pos` with `radius` reaches into, its own cell
    /// first.
    pub fn shadow_cells(&self, pos: &Position, radius: f32) -> Vec<CellKey> {
        let variant = pos.variant;
        let mut cells = vec![pos.cell_id];

        let mut reaches_outside = !pos.cell_id.is_indoor();
        if pos.cell_id.is_indoor() {
            match self.get_cell(pos.cell_id, variant) {
                Some(CellRef::Indoor(cell)) => {
                    reaches_outside |= cell.seen_outside;
                    for &portal in &cell.portals {
                        if portal == LANDBLOCK_CELL {
                            reaches_outside = true;
                        } else {
                            cells.push(cell.id.with_cell(portal));
                        }
                    }
                }
                _ => warn!("shadow_cells: indoor cell {} not loadable", pos.cell_id),
            }
        }

        if reaches_outside {
            cells.extend(outdoor_cells_around(pos.landblock(), pos.origin(), radius));
            if !pos.cell_id.is_indoor() {
                self.push_seen_outside(&mut cells, pos, radius);
            }
        }

        cells.sort();
        cells.dedup();
        // Own cell first.
        if let Some(i) = cells.iter().position(|c| *c == pos.cell_id) {
            cells.swap(0, i);
        }
        cells.into_iter().map(|c| CellKey::new(c, variant)).collect()
    }

    fn push_seen_outside(&self, cells: &mut Vec<LandblockId>, pos: &Position, radius: f32) {
        let Some(lb) = self.get_landblock(pos.cell_id, pos.variant) else {
            return;
        };
        let lo = pos.origin() - Vec3::splat(radius);
        let hi = pos.origin() + Vec3::splat(radius);
        for info in lb.cell_infos().iter().filter(|c| c.seen_outside) {
            let overlaps = hi.cmpge(info.bounds_min).all() && lo.cmple(info.bounds_max).all();
            if overlaps {
                cells.push(info.id);
            }
        }
    }
}

/// Outdoor cells overlapped by the square `center +- radius`, where `center`
/// is relative to `reference`'s landblock origin. Cells off the map are
/// skipped.
pub fn outdoor_cells_around(reference: LandblockId, center: Vec3, radius: f32) -> Vec<LandblockId> {
    let per_side = CELLS_PER_SIDE as i32;
    let lo_x = ((center.x - radius) / CELL_SIZE).floor() as i32;
    let hi_x = ((center.x + radius) / CELL_SIZE).floor() as i32;
    let lo_y = ((center.y - radius) / CELL_SIZE).floor() as i32;
    let hi_y = ((center.y + radius) / CELL_SIZE).floor() as i32;

    let mut out = Vec::new();
    for gx in lo_x..=hi_x {
        for gy in lo_y..=hi_y {
            let Some(lb) = reference.neighbor(gx.div_euclid(per_side), gy.div_euclid(per_side)) else {
                continue;
            };
            let ix = gx.rem_euclid(per_side) as u16;
            let iy = gy.rem_euclid(per_side) as u16;
            out.push(lb.with_cell(ix * CELLS_PER_SIDE as u16 + iy + FIRST_OUTDOOR_CELL));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_around_cross_landblock_edges() {
        let reference = LandblockId::landblock_at(10, 10);
        let cells = outdoor_cells_around(reference, Vec3::new(191.8, 100.0, 0.0), 0.5);
        assert_eq!(cells.len(), 2);
        assert!(cells.contains(&LandblockId::new(10, 10, 7 * 8 + 4 + 1)));
        assert!(cells.contains(&LandblockId::new(11, 10, 4 + 1)));
    }

    #[test]
    fn cells_around_skip_off_map() {
        let reference = LandblockId::landblock_at(0, 0);
        let cells = outdoor_cells_around(reference, Vec3::new(0.2, 0.2, 0.0), 0.5);
        assert_eq!(cells, vec![LandblockId::new(0, 0, 1)]);
    }
}
