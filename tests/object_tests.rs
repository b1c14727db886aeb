//! PhysicsObj integration tests: gravity, landing, friction, sleeping

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use realm_physics::{
        FlatTerrain, ObjectId, PhysicsConfig, PhysicsState, Position, ShapeSet, World, WorldService,
    };
    use std::sync::Arc;

    const DT: f64 = 1.0 / 30.0;

    fn make_service() -> WorldService {
        let world = Arc::new(World::new(Arc::new(FlatTerrain::new(0.0))));
        WorldService::new(PhysicsConfig::default(), world)
    }

    fn spawn(svc: &mut WorldService, id: u32, state: PhysicsState, at: Vec3) -> ObjectId {
        let id = ObjectId(id);
        let object = svc.new_object(id, ShapeSet::sphere(0.5), state);
        svc.create_object(object);
        svc.enter_world(id, Position::outdoor(10, 10, at).unwrap())
            .expect("open ground");
        id
    }

    // -----------------------------------------------------------------------
    // Gravity
    // -----------------------------------------------------------------------

    #[test]
    fn dropped_object_falls_and_lands() {
        let mut svc = make_service();
        let id = spawn(&mut svc, 1, PhysicsState::GRAVITY, Vec3::new(50.0, 50.0, 50.0));
        assert!(!svc.object(id).unwrap().on_walkable());

        let mut last_speed = 0.0f32;
        let mut landed_after = None;
        for tick in 0..300 {
            svc.use_time(DT);
            let obj = svc.object(id).unwrap();
            if obj.on_walkable() {
                landed_after = Some(tick);
                break;
            }
            let speed = obj.velocity.z.abs();
            assert!(obj.velocity.z <= 0.0);
            assert!(speed + 1e-4 >= last_speed, "fall speed decreased at tick {}", tick);
            last_speed = speed;
        }

        let ticks = landed_after.expect("object never landed");
        // sqrt(2 * 50 / 9.8) is a little over 3 s.
        assert!((85..=110).contains(&ticks), "landed after {} ticks", ticks);
        let obj = svc.object(id).unwrap();
        assert!(obj.velocity.z.abs() < 1e-3);
        assert!(obj.position.origin().z.abs() < 0.05);
    }

    #[test]
    fn terminal_speed_is_capped() {
        let mut svc = make_service();
        let mut config = svc.config().clone();
        config.max_velocity = 5.0;
        let world = Arc::new(World::new(Arc::new(FlatTerrain::new(0.0))));
        svc = WorldService::new(config, world);
        let id = spawn(&mut svc, 1, PhysicsState::GRAVITY, Vec3::new(50.0, 50.0, 80.0));
        for _ in 0..60 {
            svc.use_time(DT);
        }
        assert!(svc.object(id).unwrap().velocity.length() <= 5.0 + 1e-3);
    }

    #[test]
    fn objects_without_gravity_hover() {
        let mut svc = make_service();
        let id = spawn(&mut svc, 1, PhysicsState::empty(), Vec3::new(50.0, 50.0, 10.0));
        for _ in 0..30 {
            svc.use_time(DT);
        }
        let obj = svc.object(id).unwrap();
        assert!((obj.position.origin().z - 10.0).abs() < 1e-4);
        assert!(!obj.is_active(), "nothing to do, should sleep");
    }

    // -----------------------------------------------------------------------
    // Friction and sleeping
    // -----------------------------------------------------------------------

    #[test]
    fn friction_stops_a_sliding_object() {
        let mut svc = make_service();
        let id = spawn(&mut svc, 1, PhysicsState::GRAVITY, Vec3::new(50.0, 50.0, 0.0));
        svc.set_velocity(id, Vec3::new(4.0, 0.0, 0.0)).unwrap();
        for _ in 0..150 {
            svc.use_time(DT);
        }
        let obj = svc.object(id).unwrap();
        assert!(obj.position.origin().x > 50.5);
        assert!(obj.velocity.length() < 0.01);
    }

    #[test]
    fn frictionless_object_keeps_gliding() {
        let mut svc = make_service();
        let id = ObjectId(1);
        let object = svc
            .new_object(id, ShapeSet::sphere(0.5), PhysicsState::GRAVITY)
            .with_friction(0.0);
        svc.create_object(object);
        svc.enter_world(id, Position::outdoor(10, 10, Vec3::new(50.0, 50.0, 0.0)).unwrap())
            .unwrap();
        svc.set_velocity(id, Vec3::new(3.0, 0.0, 0.0)).unwrap();
        for _ in 0..30 {
            svc.use_time(DT);
        }
        let obj = svc.object(id).unwrap();
        assert!((obj.position.origin().x - 53.0).abs() < 0.05);
        assert!(obj.on_walkable());
    }

    #[test]
    fn frozen_objects_do_not_integrate() {
        let mut svc = make_service();
        let id = spawn(&mut svc, 1, PhysicsState::GRAVITY | PhysicsState::FROZEN, Vec3::new(50.0, 50.0, 20.0));
        for _ in 0..30 {
            svc.use_time(DT);
        }
        assert!((svc.object(id).unwrap().position.origin().z - 20.0).abs() < 1e-4);
    }

    #[test]
    fn static_objects_are_never_ticked() {
        let mut svc = make_service();
        let id = spawn(&mut svc, 1, PhysicsState::STATIC | PhysicsState::GRAVITY, Vec3::new(50.0, 50.0, 20.0));
        let events = svc.use_time(DT);
        assert!(events.transforms.is_empty());
        assert!((svc.object(id).unwrap().position.origin().z - 20.0).abs() < 1e-4);
    }

    // -----------------------------------------------------------------------
    // Transforms
    // -----------------------------------------------------------------------

    #[test]
    fn moving_objects_emit_transforms() {
        let mut svc = make_service();
        let id = spawn(&mut svc, 1, PhysicsState::GRAVITY, Vec3::new(50.0, 50.0, 20.0));
        let events = svc.use_time(DT);
        assert_eq!(events.tick, 1);
        assert_eq!(events.transforms.len(), 1);
        let t = &events.transforms[0];
        assert_eq!(t.entity_id, id);
        assert!(t.vz < 0.0);
        assert!((t.dt - DT as f32).abs() < 1e-6);
    }

    #[test]
    fn crossing_into_the_next_landblock_relinks() {
        let mut svc = make_service();
        let id = ObjectId(1);
        let object = svc
            .new_object(id, ShapeSet::sphere(0.5), PhysicsState::GRAVITY)
            .with_friction(0.0);
        svc.create_object(object);
        svc.enter_world(id, Position::outdoor(10, 10, Vec3::new(190.0, 50.0, 0.0)).unwrap())
            .unwrap();
        svc.set_velocity(id, Vec3::new(6.0, 0.0, 0.0)).unwrap();
        for _ in 0..30 {
            svc.use_time(DT);
        }
        let obj = svc.object(id).unwrap();
        assert_eq!(obj.position.cell_id.lb_x(), 11);
        assert!((obj.position.origin().x - 4.0).abs() < 0.1);
        let lb = obj.landblock.as_ref().expect("linked");
        assert_eq!(lb.id().lb_x(), 11);
        assert!(lb.contents(obj.position.cell_id).objects.contains(&id));
    }
}
