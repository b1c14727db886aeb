//! WorldDriver tests: command round trips and outbound events
#![cfg(feature = "server")]

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use parking_lot::Mutex;
    use realm_physics::driver::OutboundEvent;
    use realm_physics::protocol::{subjects, EnterWorldMsg, MovementMsg, PhysicsNotice, PositionMsg, ShapeMsg};
    use realm_physics::{
        DriverConfig, FlatTerrain, MoveCompleteReason, MovementRequest, ObjectId, PhysicsConfig, PhysicsState,
        Position, World, WorldDriver, WorldService,
    };
    use std::sync::Arc;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    fn make_driver() -> WorldDriver {
        let world = Arc::new(World::new(Arc::new(FlatTerrain::new(0.0))));
        let service = WorldService::new(PhysicsConfig::default(), world);
        WorldDriver::new(
            DriverConfig {
                session: "test".into(),
                ..DriverConfig::default()
            },
            Arc::new(Mutex::new(service)),
        )
    }

    fn enter_msg(id: u32, at: Vec3) -> EnterWorldMsg {
        EnterWorldMsg {
            id: ObjectId(id),
            shape: ShapeMsg::Creature {
                radius: 0.5,
                height: 1.8,
            },
            state: PhysicsState::GRAVITY.bits(),
            scale: 1.0,
            position: PositionMsg::from(&Position::outdoor(10, 10, at).unwrap()),
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    #[test]
    fn enter_world_replies_once_processed() {
        let mut driver = make_driver();
        let handle = driver.handle();

        let mut fut = task::spawn(handle.enter_world(enter_msg(1, Vec3::new(50.0, 50.0, 0.0))));
        assert_pending!(fut.poll());

        assert_eq!(driver.process_commands(), 1);
        assert!(fut.is_woken());
        let placed = assert_ready!(fut.poll()).unwrap();
        assert_eq!(placed.cell_id.lb_x(), 10);
        assert!((placed.origin().x - 50.0).abs() < 1e-3);
        assert!(driver.service().lock().object(ObjectId(1)).is_some());
    }

    #[test]
    fn failed_enter_removes_the_object() {
        let mut driver = make_driver();
        let handle = driver.handle();
        let mut msg = enter_msg(1, Vec3::new(50.0, 50.0, 0.0));
        msg.position.cell_id = 0;

        let mut fut = task::spawn(handle.enter_world(msg));
        assert_pending!(fut.poll());
        driver.process_commands();
        let err = assert_ready!(fut.poll()).unwrap_err();
        assert!(err.to_string().contains("invalid cell"), "{}", err);

        let mut stats = task::spawn(handle.stats());
        assert_pending!(stats.poll());
        driver.process_commands();
        assert_eq!(assert_ready!(stats.poll()).unwrap().total_objects, 0);
    }

    #[test]
    fn stopped_driver_rejects_commands() {
        let driver = make_driver();
        let handle = driver.handle();
        drop(driver);

        let mut fut = task::spawn(handle.stats());
        let err = assert_ready!(fut.poll()).unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    // -----------------------------------------------------------------------
    // Outbound events
    // -----------------------------------------------------------------------

    #[test]
    fn falling_objects_publish_transforms() {
        let mut driver = make_driver();
        let handle = driver.handle();
        let mut rx = handle.subscribe();

        let mut fut = task::spawn(handle.enter_world(enter_msg(1, Vec3::new(50.0, 50.0, 5.0))));
        assert_pending!(fut.poll());
        driver.process_commands();
        assert_ready!(fut.poll()).unwrap();

        driver.step();
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.subject(), subjects::ENTITY_TRANSFORM);
        assert_eq!(event.frame(), 1);
        match event {
            OutboundEvent::Transform(e) => {
                assert_eq!(e.session, "test");
                assert_eq!(e.payload.entity_id, ObjectId(1));
                assert!(e.payload.vz < 0.0);
            }
            other => panic!("expected a transform, got {:?}", other),
        }

        let json: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["session"], "test");
        assert_eq!(json["payload"]["entity_id"], 1);
    }

    #[test]
    fn resting_objects_publish_nothing() {
        let mut driver = make_driver();
        let handle = driver.handle();
        let mut rx = handle.subscribe();

        let mut fut = task::spawn(handle.enter_world(enter_msg(1, Vec3::new(50.0, 50.0, 0.0))));
        assert_pending!(fut.poll());
        driver.process_commands();
        assert_ready!(fut.poll()).unwrap();

        // The first tick settles it; after that it sleeps.
        driver.step();
        drain(&mut rx);
        for _ in 0..5 {
            driver.step();
        }
        assert!(drain(&mut rx)
            .iter()
            .all(|e| e.subject() != subjects::ENTITY_TRANSFORM));
    }

    #[test]
    fn move_completion_arrives_as_a_notice() {
        let mut driver = make_driver();
        let handle = driver.handle();
        let mut rx = handle.subscribe();

        let mut fut = task::spawn(handle.enter_world(enter_msg(1, Vec3::new(50.0, 50.0, 0.0))));
        assert_pending!(fut.poll());
        driver.process_commands();
        assert_ready!(fut.poll()).unwrap();

        let mut fut = task::spawn(handle.perform_movement(MovementMsg {
            id: ObjectId(1),
            request: MovementRequest::turn_to_heading(90.0),
        }));
        assert_pending!(fut.poll());
        driver.process_commands();
        assert_ready!(fut.poll()).unwrap();

        for _ in 0..60 {
            driver.step();
        }
        let notices: Vec<PhysicsNotice> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                OutboundEvent::Notice(n) => Some(n.payload),
                _ => None,
            })
            .collect();
        assert_eq!(
            notices,
            vec![PhysicsNotice::MoveComplete {
                entity_id: ObjectId(1),
                reason: MoveCompleteReason::Success,
            }]
        );
    }

    #[test]
    fn leave_world_publishes_removal() {
        let mut driver = make_driver();
        let handle = driver.handle();
        let mut rx = handle.subscribe();

        let mut fut = task::spawn(handle.enter_world(enter_msg(1, Vec3::new(50.0, 50.0, 0.0))));
        assert_pending!(fut.poll());
        driver.process_commands();
        assert_ready!(fut.poll()).unwrap();

        let mut fut = task::spawn(handle.leave_world(ObjectId(1)));
        assert_pending!(fut.poll());
        driver.process_commands();
        assert_ready!(fut.poll()).unwrap();

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.subject() == subjects::ENTITY_REMOVED));
        assert!(driver.service().lock().object(ObjectId(1)).is_none());

        let mut again = task::spawn(handle.leave_world(ObjectId(1)));
        assert_pending!(again.poll());
        driver.process_commands();
        assert!(assert_ready!(again.poll()).is_err());
    }
}
