//! Position re-basing properties

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use glam::{Quat, Vec3};
    use proptest::prelude::*;
    use realm_physics::position::{LandblockId, Position};

    proptest! {
        #[test]
        fn normalizing_keeps_the_world_point(
            lb_x in 2u8..250,
            lb_y in 2u8..250,
            x in -300.0f32..500.0,
            y in -300.0f32..500.0,
            z in -10.0f32..50.0,
        ) {
            let reference = LandblockId::landblock_at(lb_x, lb_y);
            let raw = Position::new(reference, Vec3::new(x, y, z));
            let n = raw.normalized().expect("stays on the map");

            prop_assert!(n.is_consistent());
            prop_assert!(n.cell_id.is_outdoor());
            let back = n.offset_from(reference);
            prop_assert!((back.x - x).abs() < 1e-3, "x {} -> {}", x, back.x);
            prop_assert!((back.y - y).abs() < 1e-3, "y {} -> {}", y, back.y);
            prop_assert_eq!(back.z, z);
        }

        #[test]
        fn from_offset_matches_normalized(
            lb_x in 2u8..250,
            lb_y in 2u8..250,
            x in -300.0f32..500.0,
            y in -300.0f32..500.0,
        ) {
            let reference = LandblockId::landblock_at(lb_x, lb_y);
            let offset = Vec3::new(x, y, 0.0);
            let a = Position::from_offset(reference, offset, Quat::IDENTITY, 3).unwrap();
            let b = Position::new(reference, offset).with_variant(3).normalized().unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn distance_is_symmetric_across_landblocks(
            ax in 0.0f32..192.0,
            bx in 0.0f32..192.0,
            y in 0.0f32..192.0,
        ) {
            let a = Position::outdoor(40, 40, Vec3::new(ax, y, 0.0)).unwrap();
            let b = Position::outdoor(41, 40, Vec3::new(bx, y, 0.0)).unwrap();
            let expected = 192.0 + bx - ax;
            prop_assert!((a.horizontal_distance(&b) - expected).abs() < 1e-3);
            prop_assert!((b.horizontal_distance(&a) - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn heading_survives_normalization() {
        let pos = Position::new(LandblockId::landblock_at(7, 7), Vec3::new(-4.0, 250.0, 0.0)).with_heading(135.0);
        let n = pos.normalized().unwrap();
        assert_eq!(n.cell_id.lb_x(), 6);
        assert_eq!(n.cell_id.lb_y(), 8);
        assert_abs_diff_eq!(n.origin().x, 188.0, epsilon = 1e-4);
        assert_abs_diff_eq!(n.origin().y, 58.0, epsilon = 1e-4);
        assert_abs_diff_eq!(n.heading(), 135.0, epsilon = 1e-2);
    }

    #[test]
    fn indoor_positions_are_not_rebased() {
        let cell = LandblockId::new(7, 7, 0x0105);
        let pos = Position::new(cell, Vec3::new(500.0, -20.0, 3.0));
        assert_eq!(pos.normalized(), Some(pos));
    }
}
