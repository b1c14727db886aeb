//! Error taxonomy for inbound calls into the physics core.
//!
//! Nothing on the per-tick path returns these; they only surface from the
//! explicit entry points on [`crate::WorldService`].

use crate::position::LandblockId;
use crate::types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),

    #[error("object {0} is not in the world")]
    NotInWorld(ObjectId),

    #[error("invalid cell id {0}")]
    InvalidCell(LandblockId),

    #[error("no loadable cell for {0} (variant {1})")]
    NoCell(LandblockId, u32),

    #[error("no valid position for object {0} near {1}")]
    NoValidPosition(ObjectId, LandblockId),

    #[error("object {0} collided while being placed")]
    Collided(ObjectId),

    #[error("object {0} is parented and has no independent position")]
    Parented(ObjectId),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
