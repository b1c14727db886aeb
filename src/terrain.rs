//! Terrain subsystem: TerrainSource trait, HeightmapTerrain implementation,
//! per-landblock height cache, and land-cell triangle construction.

use crate::geometry::{Plane, Polygon};
use crate::position::{CELLS_PER_SIDE, CELL_SIZE};
use glam::Vec3;
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Height samples along one landblock side (cell corners).
pub const VERTS_PER_SIDE: usize = CELLS_PER_SIDE as usize + 1;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Anything that can provide landblock vertex heights.
pub trait TerrainSource: Send + Sync {
    /// Heights for landblock `(x, y)`, or `None` where there is no land.
    fn landblock_heights(&self, x: u8, y: u8) -> Option<Arc<HeightChunk>>;
}

// ---------------------------------------------------------------------------
// Height chunk
// ---------------------------------------------------------------------------

/// 9x9 corner heights of one landblock, stored x-major.
///
/// Each 24x24 cell is split into two triangles along its SW-NE diagonal.
#[derive(Debug, Clone)]
pub struct HeightChunk {
    pub heights: Vec<f32>,
}

impl HeightChunk {
    pub fn flat(height: f32) -> Self {
        Self {
            heights: vec![height; VERTS_PER_SIDE * VERTS_PER_SIDE],
        }
    }

    pub fn vertex(&self, ix: usize, iy: usize) -> Vec3 {
        let ix = ix.min(VERTS_PER_SIDE - 1);
        let iy = iy.min(VERTS_PER_SIDE - 1);
        Vec3::new(
            ix as f32 * CELL_SIZE,
            iy as f32 * CELL_SIZE,
            self.heights[ix * VERTS_PER_SIDE + iy],
        )
    }

    /// The two triangles of cell `(ix, iy)`, normals up.
    pub fn cell_triangles(&self, ix: usize, iy: usize) -> [Polygon; 2] {
        let v00 = self.vertex(ix, iy);
        let v10 = self.vertex(ix + 1, iy);
        let v11 = self.vertex(ix + 1, iy + 1);
        let v01 = self.vertex(ix, iy + 1);
        [triangle(v00, v10, v11), triangle(v00, v11, v01)]
    }

    /// The triangle under a landblock-local `(x, y)`.
    pub fn triangle_at(&self, x: f32, y: f32) -> Polygon {
        let max = (CELLS_PER_SIDE - 1) as f32;
        let cx = (x / CELL_SIZE).floor().clamp(0.0, max);
        let cy = (y / CELL_SIZE).floor().clamp(0.0, max);
        let u = x / CELL_SIZE - cx;
        let v = y / CELL_SIZE - cy;
        let [lower, upper] = self.cell_triangles(cx as usize, cy as usize);
        if u >= v {
            lower
        } else {
            upper
        }
    }

    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        let tri = self.triangle_at(x, y);
        tri.plane.z_at(x, y).unwrap_or(tri.vertices[0].z)
    }

    pub fn normal_at(&self, x: f32, y: f32) -> Vec3 {
        self.triangle_at(x, y).plane.normal
    }

    /// Triangles of every cell overlapped by the square `center +- reach`.
    pub fn triangles_near(&self, center: Vec3, reach: f32) -> Vec<Polygon> {
        let max = (CELLS_PER_SIDE - 1) as i32;
        let lo_x = ((center.x - reach) / CELL_SIZE).floor() as i32;
        let hi_x = ((center.x + reach) / CELL_SIZE).floor() as i32;
        let lo_y = ((center.y - reach) / CELL_SIZE).floor() as i32;
        let hi_y = ((center.y + reach) / CELL_SIZE).floor() as i32;
        if hi_x < 0 || hi_y < 0 || lo_x > max || lo_y > max {
            return Vec::new();
        }
        let mut out = Vec::new();
        for ix in lo_x.max(0)..=hi_x.min(max) {
            for iy in lo_y.max(0)..=hi_y.min(max) {
                out.extend(self.cell_triangles(ix as usize, iy as usize));
            }
        }
        out
    }
}

fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Polygon {
    let plane = Plane::from_points(a, b, c).unwrap_or_else(|| Plane::from_point_normal(a, Vec3::Z));
    Polygon {
        vertices: vec![a, b, c],
        plane,
    }
}

// ---------------------------------------------------------------------------
// Flat terrain
// ---------------------------------------------------------------------------

/// Every landblock is level ground at one height.
pub struct FlatTerrain {
    chunk: Arc<HeightChunk>,
}

impl FlatTerrain {
    pub fn new(height: f32) -> Self {
        Self {
            chunk: Arc::new(HeightChunk::flat(height)),
        }
    }
}

impl TerrainSource for FlatTerrain {
    fn landblock_heights(&self, _x: u8, _y: u8) -> Option<Arc<HeightChunk>> {
        Some(self.chunk.clone())
    }
}

// ---------------------------------------------------------------------------
// Heightmap terrain
// ---------------------------------------------------------------------------

pub struct HeightmapTerrain {
    pub seed: u64,
    /// Mean ground height.
    pub base_height: f32,
    /// Peak deviation from `base_height`.
    pub amplitude: f32,
    cache: RwLock<HashMap<(u8, u8), Arc<HeightChunk>>>,
}

impl HeightmapTerrain {
    pub fn new(seed: u64, base_height: f32, amplitude: f32) -> Self {
        Self {
            seed,
            base_height,
            amplitude,
            cache: RwLock::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Cache helpers
    // -----------------------------------------------------------------------

    pub fn get_or_generate_chunk(&self, x: u8, y: u8) -> Arc<HeightChunk> {
        if let Some(chunk) = self.cache.read().get(&(x, y)) {
            return chunk.clone();
        }
        let mut cache = self.cache.write();
        match cache.entry((x, y)) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(v) => {
                let chunk = Arc::new(self.generate_chunk(x, y));
                v.insert(chunk.clone());
                chunk
            }
        }
    }

    pub fn cached_chunks(&self) -> usize {
        self.cache.read().len()
    }

    /// Evict every landblock further than `max_blocks` from `(origin_x,
    /// origin_y)` in Chebyshev distance.
    pub fn evict_distant_chunks(&self, origin_x: u8, origin_y: u8, max_blocks: i32) {
        let mut cache = self.cache.write();
        cache.retain(|(x, y), _| {
            let dx = (*x as i32 - origin_x as i32).abs();
            let dy = (*y as i32 - origin_y as i32).abs();
            dx <= max_blocks && dy <= max_blocks
        });
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    fn generate_chunk(&self, x: u8, y: u8) -> HeightChunk {
        let origin_x = x as f32 * crate::position::LANDBLOCK_SIZE;
        let origin_y = y as f32 * crate::position::LANDBLOCK_SIZE;

        let mut heights = Vec::with_capacity(VERTS_PER_SIDE * VERTS_PER_SIDE);
        for ix in 0..VERTS_PER_SIDE {
            for iy in 0..VERTS_PER_SIDE {
                let wx = origin_x + ix as f32 * CELL_SIZE;
                let wy = origin_y + iy as f32 * CELL_SIZE;
                heights.push(self.sample_noise(wx, wy));
            }
        }
        HeightChunk { heights }
    }

    /// Sampled in world coordinates so shared edge vertices agree between
    /// neighbouring landblocks.
    fn sample_noise(&self, x: f32, y: f32) -> f32 {
        let scale = 0.01;
        // Top 24 bits of an LCG step, as a phase in [0, TAU).
        let bits = self
            .seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407)
            >> 40;
        let phase = bits as f32 / (1u64 << 24) as f32 * std::f32::consts::TAU;
        self.base_height + ((x * scale + phase).sin() * (y * scale + 0.5 * phase).cos()) * self.amplitude
    }
}

impl TerrainSource for HeightmapTerrain {
    fn landblock_heights(&self, x: u8, y: u8) -> Option<Arc<HeightChunk>> {
        Some(self.get_or_generate_chunk(x, y))
    }
}
