//! Terrain unit tests

#[cfg(test)]
mod tests {
    use realm_physics::geometry::EPSILON;
    use realm_physics::terrain::{HeightChunk, HeightmapTerrain, TerrainSource, VERTS_PER_SIDE};
    use realm_physics::types::DEFAULT_FLOOR_Z;
    use std::sync::Arc;

    fn make_terrain(seed: u64) -> HeightmapTerrain {
        HeightmapTerrain::new(seed, 20.0, 8.0)
    }

    // -----------------------------------------------------------------------
    // Determinism
    // -----------------------------------------------------------------------

    #[test]
    fn height_is_deterministic() {
        let a = make_terrain(42);
        let b = make_terrain(42);
        let ca = a.get_or_generate_chunk(10, 12);
        let cb = b.get_or_generate_chunk(10, 12);
        assert_eq!(ca.heights, cb.heights);
    }

    #[test]
    fn different_seeds_produce_different_terrain() {
        let t1 = make_terrain(1);
        let t2 = make_terrain(999_999);
        let c1 = t1.get_or_generate_chunk(3, 4);
        let c2 = t2.get_or_generate_chunk(3, 4);
        let all_same = c1
            .heights
            .iter()
            .zip(&c2.heights)
            .all(|(a, b)| (a - b).abs() < 1e-6);
        assert!(!all_same, "At least one vertex should differ between seeds");
    }

    #[test]
    fn terrain_is_not_flat() {
        let t = make_terrain(7);
        let chunk = t.get_or_generate_chunk(20, 20);
        let min = chunk.heights.iter().copied().fold(f32::MAX, f32::min);
        let max = chunk.heights.iter().copied().fold(f32::MIN, f32::max);
        assert!(max - min > 0.1, "expected relief, got {min}..{max}");
    }

    // -----------------------------------------------------------------------
    // Height values are reasonable
    // -----------------------------------------------------------------------

    #[test]
    fn height_within_expected_range() {
        let t = make_terrain(42);
        for (x, y) in [(0u8, 0u8), (10, 10), (128, 64), (255, 255)] {
            let chunk = t.get_or_generate_chunk(x, y);
            assert_eq!(chunk.heights.len(), VERTS_PER_SIDE * VERTS_PER_SIDE);
            for h in &chunk.heights {
                assert!(
                    (12.0..=28.0).contains(h),
                    "height {} out of expected range in landblock ({}, {})",
                    h,
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn shared_edges_agree_between_landblocks() {
        let t = make_terrain(42);
        let west = t.get_or_generate_chunk(10, 10);
        let east = t.get_or_generate_chunk(11, 10);
        let north = t.get_or_generate_chunk(10, 11);
        for i in 0..VERTS_PER_SIDE {
            assert_eq!(west.vertex(VERTS_PER_SIDE - 1, i).z, east.vertex(0, i).z);
            assert_eq!(west.vertex(i, VERTS_PER_SIDE - 1).z, north.vertex(i, 0).z);
        }
    }

    // -----------------------------------------------------------------------
    // Triangles and normals
    // -----------------------------------------------------------------------

    #[test]
    fn height_at_interpolates_between_corners() {
        let t = make_terrain(42);
        let chunk = t.get_or_generate_chunk(5, 5);
        let h = chunk.height_at(30.0, 40.0);
        let corners = [
            chunk.vertex(1, 1).z,
            chunk.vertex(2, 1).z,
            chunk.vertex(1, 2).z,
            chunk.vertex(2, 2).z,
        ];
        let lo = corners.iter().copied().fold(f32::MAX, f32::min);
        let hi = corners.iter().copied().fold(f32::MIN, f32::max);
        assert!(h >= lo - EPSILON && h <= hi + EPSILON);
    }

    #[test]
    fn gentle_terrain_is_walkable() {
        let t = make_terrain(42);
        let chunk = t.get_or_generate_chunk(8, 9);
        for x in [1.0f32, 50.0, 100.0, 191.0] {
            for y in [1.0f32, 70.0, 150.0] {
                let n = chunk.normal_at(x, y);
                assert!(n.z >= DEFAULT_FLOOR_Z, "normal {:?} too steep at ({}, {})", n, x, y);
            }
        }
    }

    #[test]
    fn flat_chunk_has_up_normals() {
        let chunk = HeightChunk::flat(3.0);
        assert_eq!(chunk.height_at(100.0, 100.0), 3.0);
        assert!((chunk.normal_at(5.0, 17.0).z - 1.0).abs() < 1e-6);
    }

    // -----------------------------------------------------------------------
    // Chunk cache
    // -----------------------------------------------------------------------

    #[test]
    fn chunk_cache_returns_same_arc() {
        let t = make_terrain(42);
        let c1 = t.get_or_generate_chunk(0, 0);
        let c2 = t.landblock_heights(0, 0).expect("heightmap covers the map");
        assert!(Arc::ptr_eq(&c1, &c2));
        assert_eq!(t.cached_chunks(), 1);
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    #[test]
    fn evict_removes_distant_chunks() {
        let t = make_terrain(42);
        for x in 0u8..=10 {
            for y in 0u8..=10 {
                t.get_or_generate_chunk(x, y);
            }
        }
        assert_eq!(t.cached_chunks(), 121);
        t.evict_distant_chunks(5, 5, 1);
        assert_eq!(t.cached_chunks(), 9);
        // Evicted chunks regenerate identically.
        let before = make_terrain(42).get_or_generate_chunk(0, 0);
        let after = t.get_or_generate_chunk(0, 0);
        assert_eq!(before.heights, after.heights);
    }
}
