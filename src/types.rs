//! Core types shared across all modules: identifiers, tuning config, stats.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identity of a simulated physics object.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

/// Tag distinguishing parallel, non-interacting instances of the same
/// landblock coordinates. `0` is the base world.
pub type Variant = u32;

// ---------------------------------------------------------------------------
// Physics constants
// ---------------------------------------------------------------------------

/// cos(48.4 deg): polygons whose up-normal is at least this are walkable.
pub const DEFAULT_FLOOR_Z: f32 = 0.664_174_15;

/// Standard gravity along -Z (units/s^2).
pub const DEFAULT_GRAVITY: f32 = -9.8;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Every empirically tuned value of the physics core.
///
/// Loaded by the server binary through the `config` crate, so every field
/// has a default and partial files/env overrides are fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Acceleration applied to airborne objects with gravity (units/s^2).
    pub gravity: f32,
    /// Velocities longer than this are renormalized.
    pub max_velocity: f32,
    /// Elapsed time below which an object update is skipped (seconds).
    pub min_quantum: f64,
    /// Largest single integration step (seconds).
    pub max_quantum: f64,
    /// Elapsed time above which the object clock is reset instead of
    /// integrated (seconds).
    pub huge_quantum: f64,
    /// Minimum up-normal of a walkable polygon.
    pub floor_z: f32,
    /// Step-up height used when a shape does not carry its own.
    pub step_up_height: f32,
    /// Step-down height used when a shape does not carry its own.
    pub step_down_height: f32,
    /// Gap under which two surfaces count as touching.
    pub contact_tolerance: f32,
    /// Upper bound on sub-steps a single transition may take.
    pub max_transition_steps: usize,
    /// Ground friction coefficient for new objects.
    pub default_friction: f32,
    /// Bounce elasticity for new objects.
    pub default_elasticity: f32,
    /// Seconds without repeat contact before a collision ends.
    pub collision_timeout: f64,
    /// Walk speed (units/s).
    pub walk_speed: f32,
    /// Run speed (units/s).
    pub run_speed: f32,
    /// Turn rate for turn commands (degrees/s).
    pub turn_speed_deg: f32,
    /// A turn is complete once within this many degrees of its goal.
    pub heading_tolerance_deg: f32,
    /// Forward motion corrects heading with an auxiliary turn above this.
    pub aux_turn_threshold_deg: f32,
    /// Movement progress is sampled at this interval (seconds).
    pub progress_interval: f64,
    /// Minimum approach rate before a move is abandoned (units/s).
    pub min_progress_rate: f32,
    /// Minimum turn rate before a turn is abandoned (degrees/s).
    pub min_turn_rate_deg: f32,
    /// `is_stuck()` trips after this long without a completed sub-action.
    pub stuck_threshold: f64,
    /// Distance kept between a sticky mover and its target's surface.
    pub sticky_gap: f32,
    /// Speed at which a sticky mover re-aligns (units/s).
    pub sticky_speed: f32,
    /// Radius searched by scatter placement.
    pub scatter_radius: f32,
    /// Random offsets tried by scatter placement.
    pub scatter_attempts: usize,
    /// Ticks between idle-landblock unload sweeps (0 disables).
    pub unload_interval_ticks: u64,
    /// Seed for scatter placement.
    pub seed: u64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
            max_velocity: 50.0,
            min_quantum: 0.01,
            max_quantum: 0.1,
            huge_quantum: 2.0,
            floor_z: DEFAULT_FLOOR_Z,
            step_up_height: 0.6,
            step_down_height: 0.6,
            contact_tolerance: 0.02,
            max_transition_steps: 200,
            default_friction: 0.95,
            default_elasticity: 0.05,
            collision_timeout: 1.0,
            walk_speed: 3.12,
            run_speed: 10.0,
            turn_speed_deg: 90.0,
            heading_tolerance_deg: 1.0,
            aux_turn_threshold_deg: 20.0,
            progress_interval: 1.0,
            min_progress_rate: 0.25,
            min_turn_rate_deg: 5.0,
            stuck_threshold: 5.0,
            sticky_gap: 0.3,
            sticky_speed: 10.0,
            scatter_radius: 5.0,
            scatter_attempts: 10,
            unload_interval_ticks: 300,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldStats {
    pub loaded_landblocks: usize,
    pub total_objects: usize,
    pub objects_in_world: usize,
    pub active_objects: usize,
    pub total_ticks: u64,
}
