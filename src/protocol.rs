//! `physics.*` wire protocol.
//!
//! This module owns **every message that crosses the boundary** between the
//! physics server and its consumers (game logic, visibility tracker, clients).
//!
//! ## Channel namespaces
//!
//! | Namespace           | Direction          |
//! |---------------------|--------------------|
//! | `physics.entity.*`  | server → consumer  |
//! | `physics.notice.*`  | server → owner     |
//!
//! ## Design rules
//!
//! 1. Every struct must be `Serialize + Deserialize` with snake_case JSON.
//! 2. No collision geometry leaks out; positions travel as cell id + local
//!    offset + heading.
//! 3. Every outbound event includes `frame: u64` and `session: String`.
//!    Commands carry no envelope; they arrive through the driver handle.
//! 4. Transforms include `dt: f32` to support client-side interpolation.

use crate::geometry::Frame;
use crate::movement::{MoveCompleteReason, MovementRequest};
use crate::object::{PhysicsObj, SetPositionFlags};
use crate::position::{LandblockId, Position};
use crate::types::{ObjectId, Variant};
use glam::Vec3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Common envelope
// ---------------------------------------------------------------------------

/// Every outbound message is wrapped in this envelope.
///
/// The `session` field lets multiplexed consumers distinguish worlds.
/// The `frame` field lets consumers sort interleaved streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEvent<T> {
    pub session: String,
    pub frame: u64,
    pub payload: T,
}

impl<T> WorldEvent<T> {
    pub fn new(session: impl Into<String>, frame: u64, payload: T) -> Self {
        Self {
            session: session.into(),
            frame,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Persisted / wire form of a [`Position`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMsg {
    pub cell_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Degrees, 0 = north, 90 = east.
    #[serde(default)]
    pub heading: f32,
    #[serde(default)]
    pub variant: Variant,
}

impl From<&Position> for PositionMsg {
    fn from(p: &Position) -> Self {
        let o = p.origin();
        Self {
            cell_id: p.cell_id.0,
            x: o.x,
            y: o.y,
            z: o.z,
            heading: p.heading(),
            variant: p.variant,
        }
    }
}

impl From<PositionMsg> for Position {
    fn from(m: PositionMsg) -> Self {
        Position {
            cell_id: LandblockId(m.cell_id),
            frame: Frame::from_origin(Vec3::new(m.x, m.y, m.z)),
            variant: m.variant,
        }
        .with_heading(m.heading)
    }
}

// ---------------------------------------------------------------------------
// Entity events  (subjects: physics.entity.*)
// ---------------------------------------------------------------------------

/// Authoritative transform update for a moving object.
///
/// Sent at simulation tick rate for every object that moved.
/// Clients interpolate between received frames at their render rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTransform {
    pub entity_id: ObjectId,
    pub position: PositionMsg,
    /// Actual displacement per second, for dead-reckoning.
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub on_walkable: bool,
    /// Integration step that produced this transform.
    pub dt: f32,
}

impl EntityTransform {
    pub fn from_object(object: &PhysicsObj, dt: f32) -> Self {
        let v = object.cached_velocity;
        Self {
            entity_id: object.id,
            position: PositionMsg::from(&object.position),
            vx: v.x,
            vy: v.y,
            vz: v.z,
            on_walkable: object.on_walkable(),
            dt,
        }
    }
}

/// An object left the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRemoved {
    pub entity_id: ObjectId,
}

// ---------------------------------------------------------------------------
// Owner notices  (subjects: physics.notice.*)
// ---------------------------------------------------------------------------

/// Callback delivered to an object's owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicsNotice {
    Collision { entity_id: ObjectId, other: ObjectId },
    CollisionWithEnvironment { entity_id: ObjectId },
    CollisionEnd { entity_id: ObjectId, other: ObjectId },
    MoveComplete { entity_id: ObjectId, reason: MoveCompleteReason },
}

impl PhysicsNotice {
    pub fn subject(&self) -> &'static str {
        match self {
            PhysicsNotice::Collision { .. } => subjects::NOTICE_COLLISION,
            PhysicsNotice::CollisionWithEnvironment { .. } => subjects::NOTICE_ENVIRONMENT,
            PhysicsNotice::CollisionEnd { .. } => subjects::NOTICE_COLLISION_END,
            PhysicsNotice::MoveComplete { .. } => subjects::NOTICE_MOVE_COMPLETE,
        }
    }
}

// ---------------------------------------------------------------------------
// Command requests  (consumer → server, via WorldHandle)
// ---------------------------------------------------------------------------

/// Shape of a new object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeMsg {
    Sphere { radius: f32 },
    Creature { radius: f32, height: f32 },
    Cylinder { radius: f32, height: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterWorldMsg {
    pub id: ObjectId,
    pub shape: ShapeMsg,
    /// `PhysicsState` bits.
    #[serde(default)]
    pub state: u32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    pub position: PositionMsg,
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPositionMsg {
    pub id: ObjectId,
    pub position: PositionMsg,
    #[serde(default)]
    pub flags: SetPositionFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementMsg {
    pub id: ObjectId,
    pub request: MovementRequest,
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

/// All subjects used by the physics protocol, as constants.
pub mod subjects {
    pub const ENTITY_TRANSFORM: &str = "physics.entity.transform";
    pub const ENTITY_REMOVED: &str = "physics.entity.removed";

    pub const NOTICE_COLLISION: &str = "physics.notice.collision";
    pub const NOTICE_ENVIRONMENT: &str = "physics.notice.environment";
    pub const NOTICE_COLLISION_END: &str = "physics.notice.collision_end";
    pub const NOTICE_MOVE_COMPLETE: &str = "physics.notice.move_complete";
}
