//! Landblock/cell identifiers and world positions.
//!
//! A [`LandblockId`] packs `0xXXYYCCCC`: landblock grid coordinates in the
//! high bytes and a cell number in the low word. Outdoor cells are a pure
//! function of the local offset; indoor cells come from static world data.
//!
//! A [`Position`] is a cell id plus a [`Frame`] local to that cell's
//! landblock, tagged with the [`Variant`] it lives in. Outdoor positions keep
//! their offset inside `[0, 192)`; [`Position::normalized`] re-bases anything
//! that strays across an edge.

use crate::geometry::{heading_from_quat, quat_from_heading, Frame};
use crate::types::Variant;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Side length of a landblock in world units.
pub const LANDBLOCK_SIZE: f32 = 192.0;
/// Side length of one outdoor cell.
pub const CELL_SIZE: f32 = 24.0;
/// Outdoor cells along one landblock side.
pub const CELLS_PER_SIDE: u32 = 8;
/// Landblocks along one world side.
pub const LANDBLOCKS_PER_SIDE: i32 = 256;

/// Cell word naming the landblock itself rather than a cell in it.
pub const LANDBLOCK_CELL: u16 = 0xFFFF;
pub const FIRST_OUTDOOR_CELL: u16 = 0x0001;
pub const LAST_OUTDOOR_CELL: u16 = 0x0040;
pub const FIRST_INDOOR_CELL: u16 = 0x0100;
pub const LAST_INDOOR_CELL: u16 = 0xFFFD;

// ---------------------------------------------------------------------------
// Landblock id
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LandblockId(pub u32);

impl LandblockId {
    pub fn new(x: u8, y: u8, cell: u16) -> Self {
        Self(((x as u32) << 24) | ((y as u32) << 16) | cell as u32)
    }

    /// Id naming the landblock at `(x, y)` itself.
    pub fn landblock_at(x: u8, y: u8) -> Self {
        Self::new(x, y, LANDBLOCK_CELL)
    }

    pub fn lb_x(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn lb_y(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn cell(self) -> u16 {
        self.0 as u16
    }

    /// The owning landblock (cell word `0xFFFF`).
    pub fn landblock(self) -> Self {
        Self::landblock_at(self.lb_x(), self.lb_y())
    }

    pub fn with_cell(self, cell: u16) -> Self {
        Self::new(self.lb_x(), self.lb_y(), cell)
    }

    pub fn is_outdoor(self) -> bool {
        (FIRST_OUTDOOR_CELL..=LAST_OUTDOOR_CELL).contains(&self.cell())
    }

    pub fn is_indoor(self) -> bool {
        (FIRST_INDOOR_CELL..=LAST_INDOOR_CELL).contains(&self.cell())
    }

    pub fn is_landblock(self) -> bool {
        self.cell() == LANDBLOCK_CELL
    }

    /// Zero and reserved cell words are invalid.
    pub fn is_valid(self) -> bool {
        self.0 != 0 && (self.is_outdoor() || self.is_indoor() || self.is_landblock())
    }

    /// Landblock `dx`, `dy` steps away, `None` off the map.
    pub fn neighbor(self, dx: i32, dy: i32) -> Option<Self> {
        let x = self.lb_x() as i32 + dx;
        let y = self.lb_y() as i32 + dy;
        if !(0..LANDBLOCKS_PER_SIDE).contains(&x) || !(0..LANDBLOCKS_PER_SIDE).contains(&y) {
            return None;
        }
        Some(Self::landblock_at(x as u8, y as u8))
    }

    pub fn neighbor_in(self, direction: Direction) -> Option<Self> {
        let (dx, dy) = direction.offset();
        self.neighbor(dx, dy)
    }

    /// World-space origin of this landblock. Only for display and coarse
    /// distance checks; physics stays landblock-relative.
    pub fn origin(self) -> Vec3 {
        Vec3::new(
            self.lb_x() as f32 * LANDBLOCK_SIZE,
            self.lb_y() as f32 * LANDBLOCK_SIZE,
            0.0,
        )
    }
}

impl std::fmt::Display for LandblockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Compass step between adjacent landblocks (+Y is north).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, 1),
            Direction::NorthWest => (-1, 1),
            Direction::SouthEast => (1, -1),
            Direction::SouthWest => (-1, -1),
        }
    }
}

/// Outdoor cell word for a landblock-local offset. Offsets outside the
/// landblock clamp to the edge cell.
pub fn outdoor_cell_index(x: f32, y: f32) -> u16 {
    let max = (CELLS_PER_SIDE - 1) as f32;
    let ix = (x / CELL_SIZE).floor().clamp(0.0, max) as u16;
    let iy = (y / CELL_SIZE).floor().clamp(0.0, max) as u16;
    ix * CELLS_PER_SIDE as u16 + iy + FIRST_OUTDOOR_CELL
}

/// Local grid coordinates of an outdoor cell word, `None` for any other
/// cell word.
pub fn outdoor_cell_coords(cell: u16) -> Option<(u32, u32)> {
    if !(FIRST_OUTDOOR_CELL..=LAST_OUTDOOR_CELL).contains(&cell) {
        return None;
    }
    let i = (cell - FIRST_OUTDOOR_CELL) as u32;
    Some((i / CELLS_PER_SIDE, i % CELLS_PER_SIDE))
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// `(landblock, variant)`: the real identity of a loaded landblock.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LandblockKey {
    pub landblock: LandblockId,
    pub variant: Variant,
}

impl LandblockKey {
    pub fn new(id: LandblockId, variant: Variant) -> Self {
        Self {
            landblock: id.landblock(),
            variant,
        }
    }
}

impl std::fmt::Display for LandblockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/v{}", self.landblock, self.variant)
    }
}

/// `(cell, variant)`: membership and shadow bucket.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellKey {
    pub cell: LandblockId,
    pub variant: Variant,
}

impl CellKey {
    pub fn new(cell: LandblockId, variant: Variant) -> Self {
        Self { cell, variant }
    }

    pub fn landblock_key(&self) -> LandblockKey {
        LandblockKey::new(self.cell, self.variant)
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub cell_id: LandblockId,
    pub frame: Frame,
    #[serde(default)]
    pub variant: Variant,
}

impl Position {
    pub fn new(cell_id: LandblockId, origin: Vec3) -> Self {
        Self {
            cell_id,
            frame: Frame::from_origin(origin),
            variant: 0,
        }
    }

    /// Outdoor position in landblock `(x, y)`; the cell is derived from the
    /// offset and the result is normalized.
    pub fn outdoor(x: u8, y: u8, origin: Vec3) -> Option<Self> {
        Self::new(LandblockId::landblock_at(x, y), origin).normalized()
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_heading(mut self, heading: f32) -> Self {
        self.frame.set_heading(heading);
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.frame.orientation = orientation;
        self
    }

    pub fn origin(&self) -> Vec3 {
        self.frame.origin
    }

    pub fn heading(&self) -> f32 {
        heading_from_quat(self.frame.orientation)
    }

    pub fn set_heading(&mut self, heading: f32) {
        self.frame.orientation = quat_from_heading(heading);
    }

    pub fn landblock(&self) -> LandblockId {
        self.cell_id.landblock()
    }

    pub fn landblock_key(&self) -> LandblockKey {
        LandblockKey::new(self.cell_id, self.variant)
    }

    pub fn cell_key(&self) -> CellKey {
        CellKey::new(self.cell_id, self.variant)
    }

    /// Whether the cell id and local offset agree. Indoor cells are only
    /// checked for a valid id here; their bounds live with the cell data.
    pub fn is_consistent(&self) -> bool {
        if !self.cell_id.is_valid() {
            return false;
        }
        if self.cell_id.is_indoor() {
            return true;
        }
        let o = self.frame.origin;
        let inside = (0.0..LANDBLOCK_SIZE).contains(&o.x) && (0.0..LANDBLOCK_SIZE).contains(&o.y);
        inside && self.cell_id.cell() == outdoor_cell_index(o.x, o.y)
    }

    /// Re-base the offset into `[0, 192)` of whichever landblock contains it
    /// and recompute the outdoor cell. Indoor positions are returned as-is.
    /// `None` if the id is invalid or the position falls off the map.
    pub fn normalized(&self) -> Option<Self> {
        if !self.cell_id.is_valid() {
            return None;
        }
        if self.cell_id.is_indoor() {
            return Some(*self);
        }
        let mut origin = self.frame.origin;
        let (dx, x) = rebase_axis(origin.x);
        let (dy, y) = rebase_axis(origin.y);
        origin.x = x;
        origin.y = y;
        let landblock = self.cell_id.neighbor(dx, dy)?;
        Some(Self {
            cell_id: landblock.with_cell(outdoor_cell_index(x, y)),
            frame: Frame::new(origin, self.frame.orientation),
            variant: self.variant,
        })
    }

    /// This position's origin expressed relative to `reference`'s landblock
    /// origin. Exact for integer landblock steps.
    pub fn offset_from(&self, reference: LandblockId) -> Vec3 {
        let dx = self.cell_id.lb_x() as i32 - reference.lb_x() as i32;
        let dy = self.cell_id.lb_y() as i32 - reference.lb_y() as i32;
        self.frame.origin + Vec3::new(dx as f32 * LANDBLOCK_SIZE, dy as f32 * LANDBLOCK_SIZE, 0.0)
    }

    /// Outdoor position at `offset` from `reference`'s landblock origin,
    /// normalized into the landblock that contains it.
    pub fn from_offset(reference: LandblockId, offset: Vec3, orientation: Quat, variant: Variant) -> Option<Self> {
        Self {
            cell_id: reference.landblock(),
            frame: Frame::new(offset, orientation),
            variant,
        }
        .normalized()
    }

    /// Distance between two positions, infinite across variants.
    pub fn distance(&self, other: &Position) -> f32 {
        if self.variant != other.variant {
            return f32::INFINITY;
        }
        self.frame.origin.distance(other.offset_from(self.cell_id))
    }

    /// Horizontal distance, infinite across variants.
    pub fn horizontal_distance(&self, other: &Position) -> f32 {
        if self.variant != other.variant {
            return f32::INFINITY;
        }
        let d = other.offset_from(self.cell_id) - self.frame.origin;
        d.truncate().length()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let o = self.frame.origin;
        write!(
            f,
            "{} [{:.3} {:.3} {:.3}] v{}",
            self.cell_id, o.x, o.y, o.z, self.variant
        )
    }
}

/// Split a coordinate into a landblock step and an offset in `[0, 192)`.
fn rebase_axis(value: f32) -> (i32, f32) {
    let mut steps = (value / LANDBLOCK_SIZE).floor() as i32;
    let mut local = value - steps as f32 * LANDBLOCK_SIZE;
    // Tiny negatives round up to exactly 192 in f32.
    if local >= LANDBLOCK_SIZE {
        local -= LANDBLOCK_SIZE;
        steps += 1;
    }
    if local < 0.0 {
        local += LANDBLOCK_SIZE;
        steps -= 1;
    }
    (steps, local)
}
