//! Realm Physics
//!
//! Authoritative spatial physics and movement core for a persistent world
//! server built from 192×192 landblocks.
//!
//! ## Architecture
//!
//! ```text
//! WorldDriver  (driver.rs)           ← tick loop, command channel, fan-out
//!   └── WorldService  (service.rs)   ← object lifecycle, placement, use_time
//!         ├── PhysicsObj  (object.rs)        ← integration, collision records
//!         │     ├── MoveToManager (movement.rs)
//!         │     └── MotionInterpreter (motion.rs)
//!         ├── TransitionContext (transition.rs) ← swept-sphere movement
//!         └── LandblockStore  (store.rs)     ← shared landblock cache
//!               └── World  (structure.rs)    ← data layer
//!                     ├── HeightmapTerrain  (terrain.rs)
//!                     └── StructureRegistry (structure.rs)
//! ```
//!
//! Everything except the driver is synchronous and runtime-free. The driver
//! and the server binary require the `server` feature.

pub mod bsp;
pub mod error;
pub mod geometry;
pub mod landblock;
pub mod motion;
pub mod movement;
pub mod object;
pub mod position;
pub mod protocol;
pub mod service;
pub mod shape;
pub mod store;
pub mod structure;
pub mod terrain;
pub mod transition;
pub mod types;

#[cfg(feature = "server")]
pub mod driver;

pub use error::{PhysicsError, Result};
pub use movement::{MoveCompleteReason, MovementParameters, MovementRequest, TargetInfo};
pub use object::{
    PhysicsObj, PhysicsState, RecordingWeenie, SetPositionFlags, WeenieEvent, WeenieObject,
};
pub use position::{LandblockId, Position};
pub use service::{TickEvents, WorldService};
pub use shape::ShapeSet;
pub use store::LandblockStore;
pub use structure::{EnvCell, StructureInstance, StructureRegistry, World, WorldSource};
pub use terrain::{FlatTerrain, HeightmapTerrain, TerrainSource};
pub use types::{ObjectId, PhysicsConfig, Variant, WorldStats};

#[cfg(feature = "server")]
pub use driver::{DriverConfig, WorldDriver, WorldHandle};
