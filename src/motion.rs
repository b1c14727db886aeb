//! Raw motion state: what a creature's legs are doing.
//!
//! The movement manager issues [`MotionCommand`]s; the physics object turns
//! the current forward command into horizontal velocity (only while on
//! walkable ground) and the current turn command into a yaw rate.

use crate::geometry::{heading_diff, heading_vector, normalize_heading};
use crate::types::PhysicsConfig;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Backward walking runs at this fraction of walk speed.
const BACKWARD_FACTOR: f32 = 0.65;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionCommand {
    Ready,
    WalkForward,
    RunForward,
    WalkBackward,
    TurnLeft,
    TurnRight,
}

impl MotionCommand {
    pub fn is_forward(self) -> bool {
        matches!(
            self,
            MotionCommand::WalkForward | MotionCommand::RunForward | MotionCommand::WalkBackward
        )
    }

    pub fn is_turn(self) -> bool {
        matches!(self, MotionCommand::TurnLeft | MotionCommand::TurnRight)
    }
}

#[derive(Debug, Clone)]
pub struct MotionInterpreter {
    forward: MotionCommand,
    forward_speed: f32,
    turn: MotionCommand,
    turn_speed: f32,
    /// Exact heading to snap to once a turn reaches or crosses it.
    pending_heading: Option<f32>,
}

impl Default for MotionInterpreter {
    fn default() -> Self {
        Self {
            forward: MotionCommand::Ready,
            forward_speed: 1.0,
            turn: MotionCommand::Ready,
            turn_speed: 1.0,
            pending_heading: None,
        }
    }
}

impl MotionInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a raw command with a speed multiplier. `Ready` stops everything.
    pub fn do_motion(&mut self, command: MotionCommand, speed: f32) {
        match command {
            MotionCommand::Ready => self.stop(),
            c if c.is_forward() => {
                self.forward = c;
                self.forward_speed = speed.max(0.0);
            }
            c => {
                self.turn = c;
                self.turn_speed = speed.max(0.0);
            }
        }
    }

    pub fn stop_forward(&mut self) {
        self.forward = MotionCommand::Ready;
    }

    pub fn stop_turn(&mut self) {
        self.turn = MotionCommand::Ready;
    }

    pub fn stop(&mut self) {
        self.stop_forward();
        self.stop_turn();
        self.pending_heading = None;
    }

    pub fn forward(&self) -> MotionCommand {
        self.forward
    }

    pub fn turn(&self) -> MotionCommand {
        self.turn
    }

    pub fn forward_speed(&self) -> f32 {
        self.forward_speed
    }

    pub fn is_moving(&self) -> bool {
        self.forward != MotionCommand::Ready
    }

    pub fn is_turning(&self) -> bool {
        self.turn != MotionCommand::Ready
    }

    pub fn has_motion(&self) -> bool {
        self.is_moving() || self.is_turning() || self.pending_heading.is_some()
    }

    pub fn pending_heading(&self) -> Option<f32> {
        self.pending_heading
    }

    pub fn set_pending_heading(&mut self, heading: Option<f32>) {
        self.pending_heading = heading.map(normalize_heading);
    }

    /// Horizontal velocity the forward command drives along `heading`.
    pub fn linear_velocity(&self, heading: f32, config: &PhysicsConfig) -> Vec3 {
        let speed = match self.forward {
            MotionCommand::WalkForward => config.walk_speed,
            MotionCommand::RunForward => config.run_speed,
            MotionCommand::WalkBackward => -config.walk_speed * BACKWARD_FACTOR,
            _ => 0.0,
        };
        heading_vector(heading) * speed * self.forward_speed
    }

    /// Yaw rate in degrees/s, positive turning right.
    pub fn turn_rate(&self, config: &PhysicsConfig) -> f32 {
        match self.turn {
            MotionCommand::TurnRight => config.turn_speed_deg * self.turn_speed,
            MotionCommand::TurnLeft => -config.turn_speed_deg * self.turn_speed,
            _ => 0.0,
        }
    }

    /// Advance `heading` by the turn command over `dt`, snapping to the
    /// pending heading when the turn reaches it.
    pub fn apply_turn(&mut self, heading: f32, dt: f32, config: &PhysicsConfig) -> f32 {
        let rate = self.turn_rate(config);
        let Some(goal) = self.pending_heading else {
            return normalize_heading(heading + rate * dt);
        };
        let remaining = heading_diff(goal, heading);
        let swept = rate * dt;
        let reaches = rate == 0.0
            || (remaining.abs() <= swept.abs()
                && (remaining == 0.0 || remaining.signum() == swept.signum()));
        if reaches {
            self.pending_heading = None;
            self.stop_turn();
            return goal;
        }
        normalize_heading(heading + swept)
    }
}
