//! Transition engine tests: landblock crossing, portals, walls, steps, ethereal movers

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use realm_physics::bsp::BspTree;
    use realm_physics::geometry::Frame;
    use realm_physics::object::PhysicsState;
    use realm_physics::position::{LandblockId, Position};
    use realm_physics::shape::ShapeSet;
    use realm_physics::store::LandblockStore;
    use realm_physics::structure::{EnvCell, StructureInstance, World};
    use realm_physics::terrain::FlatTerrain;
    use realm_physics::transition::{ObjectIndex, ObjectSnapshot, TransitionContext, TransitionRequest};
    use realm_physics::types::{ObjectId, PhysicsConfig};
    use std::sync::Arc;

    const MOVER: ObjectId = ObjectId(1);

    /// Flat ground at z = 0 in (10, 10) with, along x in [100, 104], a tall
    /// wall (y < 100), a 0.3-high ledge (y 120..140) and a 1.0-high block
    /// (y 160..180).
    fn make_store() -> LandblockStore {
        let mut world = World::new(Arc::new(FlatTerrain::new(0.0)));
        let lb = LandblockId::landblock_at(10, 10);
        world.structures.insert(StructureInstance::new(
            "wall",
            lb,
            Frame::default(),
            ShapeSet::mesh(BspTree::solid_box(
                Vec3::new(100.0, 0.0, 0.0),
                Vec3::new(101.0, 100.0, 10.0),
            )),
        ));
        world.structures.insert(StructureInstance::new(
            "ledge",
            lb,
            Frame::default(),
            ShapeSet::mesh(BspTree::solid_box(
                Vec3::new(100.0, 120.0, 0.0),
                Vec3::new(104.0, 140.0, 0.3),
            )),
        ));
        world.structures.insert(StructureInstance::new(
            "block",
            lb,
            Frame::default(),
            ShapeSet::mesh(BspTree::solid_box(
                Vec3::new(100.0, 160.0, 0.0),
                Vec3::new(104.0, 180.0, 1.0),
            )),
        ));
        LandblockStore::new(Arc::new(world))
    }

    fn request<'a>(shape: &'a ShapeSet, state: PhysicsState, start: Position, end: Vec3) -> TransitionRequest<'a> {
        TransitionRequest {
            mover: MOVER,
            shape,
            state,
            start,
            end,
            orientation: Quat::IDENTITY,
            was_on_walkable: true,
            allow_sliding: true,
            placement: false,
        }
    }

    fn at(x: f32, y: f32) -> Position {
        Position::outdoor(10, 10, Vec3::new(x, y, 0.0)).unwrap()
    }

    // -----------------------------------------------------------------------
    // Landblock boundaries
    // -----------------------------------------------------------------------

    #[test]
    fn crossing_east_edge_rebases_into_neighbour() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = at(191.9, 150.0);
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(193.0, 150.0, 0.0)));

        assert!(!result.blocked);
        assert_eq!(result.position.cell_id.lb_x(), 11);
        assert_eq!(result.position.cell_id.lb_y(), 10);
        assert!((result.position.origin().x - 1.0).abs() < 1e-3);
        assert!(result.position.is_consistent());
        assert!(result.contact.on_walkable);
    }

    #[test]
    fn crossing_map_edge_is_blocked() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = Position::outdoor(0, 0, Vec3::new(1.0, 50.0, 0.0)).unwrap();
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(-2.0, 50.0, 0.0)));
        assert!(result.blocked);
        assert_eq!(result.position.cell_id.lb_x(), 0);
        assert!(result.position.origin().x >= 0.0);
    }

    // -----------------------------------------------------------------------
    // Walls
    // -----------------------------------------------------------------------

    #[test]
    fn wall_stops_mover_without_sliding() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let mut req = request(&shape, PhysicsState::empty(), at(98.0, 50.0), Vec3::new(103.0, 55.0, 0.0));
        req.allow_sliding = false;
        let result = ctx.transition(&req);

        assert!(result.blocked);
        assert!(result.collided_with_environment);
        assert!(result.position.origin().x <= 99.5 + config.contact_tolerance);
        let normal = result.collision_normal.expect("wall normal");
        assert!(normal.x < -0.9);
    }

    #[test]
    fn wall_slides_mover_along_its_face() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = at(98.0, 50.0);
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(103.0, 55.0, 0.0)));

        let end = result.position.origin();
        assert!(end.x <= 99.5 + config.contact_tolerance, "went through the wall: {:?}", end);
        assert!(end.y > 53.0, "tangential motion kept: {:?}", end);
        assert!(result.sliding_normal.is_some());
        assert!(result.collided_with_environment);
    }

    #[test]
    fn ethereal_mover_passes_walls_but_keeps_the_floor() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let result = ctx.transition(&request(
            &shape,
            PhysicsState::ETHEREAL,
            at(98.0, 50.0),
            Vec3::new(103.0, 50.0, 0.0),
        ));
        assert!(!result.blocked);
        assert!((result.position.origin().x - 103.0).abs() < 1e-3);
        assert!(result.contact.on_walkable);
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    #[test]
    fn low_ledge_is_stepped_onto() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let result = ctx.transition(&request(
            &shape,
            PhysicsState::empty(),
            at(98.0, 130.0),
            Vec3::new(102.0, 130.0, 0.0),
        ));
        let end = result.position.origin();
        assert!(end.x > 100.5, "did not climb: {:?}", end);
        assert!((end.z - 0.3).abs() < 0.05, "not standing on the ledge: {:?}", end);
        assert!(result.contact.on_walkable);
    }

    #[test]
    fn tall_block_is_not_stepped_onto() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let mut req = request(&shape, PhysicsState::empty(), at(98.2, 170.0), Vec3::new(102.2, 170.0, 0.0));
        req.allow_sliding = false;
        let result = ctx.transition(&req);
        assert!(result.blocked);
        assert!(result.position.origin().x < 99.5 + config.contact_tolerance);
        assert!(result.position.origin().z.abs() < 0.05);
    }

    #[test]
    fn walking_off_a_ledge_steps_down() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = Position::outdoor(10, 10, Vec3::new(103.0, 130.0, 0.3)).unwrap();
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(106.0, 130.0, 0.3)));
        let end = result.position.origin();
        assert!(end.x > 105.0);
        assert!(end.z.abs() < 0.05, "should be back on the ground: {:?}", end);
        assert!(result.contact.on_walkable);
    }

    // -----------------------------------------------------------------------
    // Indoor cells and portals
    // -----------------------------------------------------------------------

    const ROOM: u16 = 0x0100;
    const PORCH: u16 = 0x0101;

    /// In (20, 20): a closed room (x 50..60) whose east side opens onto a
    /// porch (x 60..66) that is open to the outside on its east side.
    fn make_indoor_store() -> LandblockStore {
        let mut world = World::new(Arc::new(FlatTerrain::new(0.0)));
        let lb = LandblockId::landblock_at(20, 20);
        world.structures.insert_env_cell(
            EnvCell::room(
                lb.with_cell(ROOM),
                Vec3::new(50.0, 50.0, 0.0),
                Vec3::new(60.0, 60.0, 4.0),
                &[Vec3::X],
            )
            .with_portal(PORCH),
        );
        world.structures.insert_env_cell(
            EnvCell::room(
                lb.with_cell(PORCH),
                Vec3::new(60.0, 50.0, 0.0),
                Vec3::new(66.0, 60.0, 4.0),
                &[Vec3::X, Vec3::NEG_X],
            )
            .with_portal(ROOM)
            .with_portal(0xFFFF)
            .seen_outside(),
        );
        LandblockStore::new(Arc::new(world))
    }

    fn indoors(cell: u16, x: f32) -> Position {
        Position::new(LandblockId::new(20, 20, cell), Vec3::new(x, 55.0, 0.0))
    }

    #[test]
    fn walking_in_from_outside_enters_the_porch() {
        let store = make_indoor_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = Position::outdoor(20, 20, Vec3::new(70.0, 55.0, 0.0)).unwrap();
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(63.0, 55.0, 0.0)));

        assert!(!result.blocked);
        assert_eq!(result.position.cell_id, LandblockId::new(20, 20, PORCH));
        assert!((result.position.origin().x - 63.0).abs() < 1e-3);
        assert!(result.contact.on_walkable);
    }

    #[test]
    fn portal_leads_from_porch_into_room() {
        let store = make_indoor_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let result = ctx.transition(&request(
            &shape,
            PhysicsState::empty(),
            indoors(PORCH, 63.0),
            Vec3::new(57.0, 55.0, 0.0),
        ));

        assert!(!result.blocked);
        assert_eq!(result.position.cell_id, LandblockId::new(20, 20, ROOM));
        assert!((result.position.origin().x - 57.0).abs() < 1e-3);
        assert!(result.position.is_consistent());
    }

    #[test]
    fn leaving_the_porch_returns_to_an_outdoor_cell() {
        let store = make_indoor_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let result = ctx.transition(&request(
            &shape,
            PhysicsState::empty(),
            indoors(PORCH, 63.0),
            Vec3::new(70.0, 55.0, 0.0),
        ));

        assert!(!result.blocked);
        assert!(result.position.cell_id.is_outdoor());
        assert_eq!(result.position.landblock(), LandblockId::landblock_at(20, 20));
        assert!((result.position.origin().x - 70.0).abs() < 1e-3);
        assert!(result.position.is_consistent());
        assert!(result.contact.on_walkable);
    }

    #[test]
    fn room_walls_stop_indoor_movers() {
        let store = make_indoor_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let mut req = request(&shape, PhysicsState::empty(), indoors(ROOM, 55.0), Vec3::new(47.0, 55.0, 0.0));
        req.allow_sliding = false;
        let result = ctx.transition(&req);

        assert!(result.blocked);
        assert!(result.collided_with_environment);
        assert_eq!(result.position.cell_id, LandblockId::new(20, 20, ROOM));
        assert!(result.position.origin().x >= 50.5 - config.contact_tolerance);
        assert!(result.collision_normal.expect("wall normal").x > 0.9);
    }

    #[test]
    fn closed_room_is_not_entered_from_outside() {
        let store = make_indoor_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = Position::outdoor(20, 20, Vec3::new(55.0, 40.0, 0.0)).unwrap();
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(55.0, 55.0, 0.0)));

        assert!(result.position.cell_id.is_outdoor());
        assert_ne!(result.position.cell_id, LandblockId::new(20, 20, ROOM));
    }

    // -----------------------------------------------------------------------
    // Objects
    // -----------------------------------------------------------------------

    fn index_with(store: &LandblockStore, id: ObjectId, pos: Position, shape: ShapeSet, state: PhysicsState) -> ObjectIndex {
        let shape = Arc::new(shape);
        let cells = store.shadow_cells(&pos, shape.bounding_radius());
        let mut index = ObjectIndex::new();
        index.insert(
            ObjectSnapshot {
                id,
                position: pos,
                shape,
                state,
            },
            &cells,
        );
        index
    }

    #[test]
    fn solid_objects_block_and_are_reported() {
        let store = make_store();
        let index = index_with(&store, ObjectId(2), at(60.0, 20.0), ShapeSet::cylinder(0.5, 2.0), PhysicsState::empty());
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::creature(0.5, 1.8);

        let mut req = request(&shape, PhysicsState::empty(), at(57.0, 20.0), Vec3::new(62.0, 20.0, 0.0));
        req.allow_sliding = false;
        let result = ctx.transition(&req);

        assert!(result.blocked);
        assert!(result.position.origin().x <= 59.0 + config.contact_tolerance);
        assert_eq!(result.collided_objects.len(), 1);
        assert_eq!(result.collided_objects[0].id, ObjectId(2));
        assert!(!result.collided_objects[0].ethereal);
        assert!(!result.collided_with_environment);
    }

    #[test]
    fn ethereal_objects_are_passed_and_reported() {
        let store = make_store();
        let index = index_with(&store, ObjectId(2), at(60.0, 20.0), ShapeSet::cylinder(0.5, 2.0), PhysicsState::ETHEREAL);
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::creature(0.5, 1.8);

        let result = ctx.transition(&request(&shape, PhysicsState::empty(), at(57.0, 20.0), Vec3::new(63.0, 20.0, 0.0)));
        assert!(!result.blocked);
        assert!((result.position.origin().x - 63.0).abs() < 1e-3);
        assert_eq!(result.collided_objects.len(), 1);
        assert!(result.collided_objects[0].ethereal);
        assert!(!result.collided());
    }

    #[test]
    fn ignore_collisions_skips_objects() {
        let store = make_store();
        let index = index_with(&store, ObjectId(2), at(60.0, 20.0), ShapeSet::cylinder(0.5, 2.0), PhysicsState::empty());
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::creature(0.5, 1.8);

        let result = ctx.transition(&request(
            &shape,
            PhysicsState::IGNORE_COLLISIONS,
            at(57.0, 20.0),
            Vec3::new(63.0, 20.0, 0.0),
        ));
        assert!(!result.blocked);
        assert!(result.collided_objects.is_empty());
    }

    #[test]
    fn static_movers_never_move() {
        let store = make_store();
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = at(10.0, 10.0);
        let result = ctx.transition(&request(&shape, PhysicsState::STATIC, start, Vec3::new(20.0, 10.0, 0.0)));
        assert_eq!(result.position, start);
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    #[test]
    fn placement_pushes_out_of_overlap() {
        let store = make_store();
        let index = index_with(&store, ObjectId(2), at(60.0, 20.0), ShapeSet::cylinder(0.5, 2.0), PhysicsState::empty());
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::creature(0.5, 1.8);

        let overlapping = at(60.6, 20.0);
        let result = ctx.transition(&TransitionRequest::placement(MOVER, &shape, PhysicsState::empty(), overlapping, true));
        assert!(!result.blocked);
        assert!(result.position.origin().x >= 61.0 - 1e-3);

        let refused = ctx.transition(&TransitionRequest::placement(MOVER, &shape, PhysicsState::empty(), overlapping, false));
        assert!(refused.blocked);
    }

    #[test]
    fn missing_landblock_leaves_mover_in_place() {
        struct Nowhere;
        impl realm_physics::structure::WorldSource for Nowhere {
            fn landblock(
                &self,
                id: LandblockId,
                _variant: u32,
            ) -> Option<realm_physics::structure::LandblockData> {
                if id.lb_x() == 10 {
                    World::new(Arc::new(FlatTerrain::new(0.0))).landblock(id, 0)
                } else {
                    None
                }
            }
            fn env_cell(&self, _id: LandblockId, _variant: u32) -> Option<Arc<realm_physics::structure::EnvCell>> {
                None
            }
        }
        use realm_physics::structure::WorldSource;

        let store = LandblockStore::new(Arc::new(Nowhere));
        let index = ObjectIndex::new();
        let config = PhysicsConfig::default();
        let ctx = TransitionContext::new(&store, &index, &config);
        let shape = ShapeSet::sphere(0.5);

        let start = at(191.0, 50.0);
        let result = ctx.transition(&request(&shape, PhysicsState::empty(), start, Vec3::new(195.0, 50.0, 0.0)));
        assert!(result.world_missing);
        assert_eq!(result.position, start);
    }
}
