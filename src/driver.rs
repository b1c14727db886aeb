//! Server surface – a fixed-rate tick loop around [`WorldService`].
//!
//! ## Inbound
//!
//! [`WorldHandle`] sends [`WorldCommand`]s over an `mpsc` channel; each
//! carries a `oneshot` for the reply. Commands are applied between ticks.
//!
//! | Command       | Effect                                           |
//! |---------------|--------------------------------------------------|
//! | `EnterWorld`  | create the object, `enter_world`                 |
//! | `SetPosition` | `set_position` with the given flags              |
//! | `Movement`    | `perform_movement`                               |
//! | `LeaveWorld`  | `leave_world`, drop the object                   |
//! | `Stats`       | reply with `WorldStats`                          |
//!
//! ## Outbound
//!
//! Every [`OutboundEvent`] is broadcast wrapped in a [`WorldEvent`]:
//!
//! | Subject                        | Payload             |
//! |--------------------------------|---------------------|
//! | `physics.entity.transform`     | `EntityTransform`   |
//! | `physics.entity.removed`       | `EntityRemoved`     |
//! | `physics.notice.*`             | `PhysicsNotice`     |

use crate::error::PhysicsError;
use crate::movement::MoveCompleteReason;
use crate::object::{CollisionProfile, PhysicsState, WeenieObject};
use crate::position::Position;
use crate::protocol::{
    subjects, EnterWorldMsg, EntityRemoved, EntityTransform, MovementMsg, PhysicsNotice, SetPositionMsg,
    ShapeMsg, WorldEvent,
};
use crate::service::WorldService;
use crate::shape::ShapeSet;
use crate::types::{ObjectId, WorldStats};
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Session name stamped on every outbound event.
    pub session: String,
    /// Tick rate in Hz.
    pub tick_rate_hz: f32,
    /// Pending inbound commands before senders wait.
    pub command_capacity: usize,
    /// Outbound events retained for slow subscribers.
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            session: "default".into(),
            tick_rate_hz: 30.0,
            command_capacity: 256,
            event_capacity: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub enum WorldCommand {
    EnterWorld {
        msg: EnterWorldMsg,
        reply: oneshot::Sender<Result<Position, PhysicsError>>,
    },
    SetPosition {
        msg: SetPositionMsg,
        reply: oneshot::Sender<Result<Position, PhysicsError>>,
    },
    Movement {
        msg: MovementMsg,
        reply: oneshot::Sender<Result<(), PhysicsError>>,
    },
    LeaveWorld {
        id: ObjectId,
        reply: oneshot::Sender<Result<(), PhysicsError>>,
    },
    Stats {
        reply: oneshot::Sender<WorldStats>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Transform(WorldEvent<EntityTransform>),
    Removed(WorldEvent<EntityRemoved>),
    Notice(WorldEvent<PhysicsNotice>),
}

impl OutboundEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            OutboundEvent::Transform(_) => subjects::ENTITY_TRANSFORM,
            OutboundEvent::Removed(_) => subjects::ENTITY_REMOVED,
            OutboundEvent::Notice(e) => e.payload.subject(),
        }
    }

    pub fn frame(&self) -> u64 {
        match self {
            OutboundEvent::Transform(e) => e.frame,
            OutboundEvent::Removed(e) => e.frame,
            OutboundEvent::Notice(e) => e.frame,
        }
    }

    /// Serialised payload for a transport.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).with_context(|| format!("Failed to serialise event for {}", self.subject()))
    }
}

// ---------------------------------------------------------------------------
// Channel-backed weenie
// ---------------------------------------------------------------------------

/// Forwards an object's callbacks to the driver as [`PhysicsNotice`]s.
pub struct ChannelWeenie {
    id: ObjectId,
    tx: mpsc::UnboundedSender<PhysicsNotice>,
}

impl ChannelWeenie {
    pub fn new(id: ObjectId, tx: mpsc::UnboundedSender<PhysicsNotice>) -> Self {
        Self { id, tx }
    }

    fn send(&self, notice: PhysicsNotice) {
        // Receiver only goes away on shutdown.
        let _ = self.tx.send(notice);
    }
}

impl WeenieObject for ChannelWeenie {
    fn on_collision(&mut self, other: ObjectId, _profile: &CollisionProfile) {
        self.send(PhysicsNotice::Collision {
            entity_id: self.id,
            other,
        });
    }

    fn on_collision_with_environment(&mut self) {
        self.send(PhysicsNotice::CollisionWithEnvironment { entity_id: self.id });
    }

    fn on_collision_end(&mut self, other: ObjectId) {
        self.send(PhysicsNotice::CollisionEnd {
            entity_id: self.id,
            other,
        });
    }

    fn on_move_complete(&mut self, reason: MoveCompleteReason) {
        self.send(PhysicsNotice::MoveComplete {
            entity_id: self.id,
            reason,
        });
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable client side of a running [`WorldDriver`].
#[derive(Clone)]
pub struct WorldHandle {
    commands: mpsc::Sender<WorldCommand>,
    events: broadcast::Sender<OutboundEvent>,
}

impl WorldHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.events.subscribe()
    }

    pub async fn enter_world(&self, msg: EnterWorldMsg) -> Result<Position> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::EnterWorld { msg, reply }).await?;
        Ok(rx.await.context("world driver dropped the request")??)
    }

    pub async fn set_position(&self, msg: SetPositionMsg) -> Result<Position> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::SetPosition { msg, reply }).await?;
        Ok(rx.await.context("world driver dropped the request")??)
    }

    pub async fn perform_movement(&self, msg: MovementMsg) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::Movement { msg, reply }).await?;
        Ok(rx.await.context("world driver dropped the request")??)
    }

    pub async fn leave_world(&self, id: ObjectId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::LeaveWorld { id, reply }).await?;
        Ok(rx.await.context("world driver dropped the request")??)
    }

    pub async fn stats(&self) -> Result<WorldStats> {
        let (reply, rx) = oneshot::channel();
        self.send(WorldCommand::Stats { reply }).await?;
        rx.await.context("world driver dropped the request")
    }

    async fn send(&self, command: WorldCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("world driver is not running"))
    }
}

// ---------------------------------------------------------------------------
// WorldDriver
// ---------------------------------------------------------------------------

/// Owns the tick loop for a [`WorldService`].
///
/// Call [`WorldDriver::run`] inside a Tokio task, or drive it manually with
/// [`WorldDriver::process_commands`] and [`WorldDriver::step`].
pub struct WorldDriver {
    config: DriverConfig,
    service: Arc<Mutex<WorldService>>,
    commands_tx: mpsc::Sender<WorldCommand>,
    commands_rx: mpsc::Receiver<WorldCommand>,
    events: broadcast::Sender<OutboundEvent>,
    notices_tx: mpsc::UnboundedSender<PhysicsNotice>,
    notices_rx: mpsc::UnboundedReceiver<PhysicsNotice>,
    frame: u64,
}

impl WorldDriver {
    pub fn new(config: DriverConfig, service: Arc<Mutex<WorldService>>) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        Self {
            config,
            service,
            commands_tx,
            commands_rx,
            events,
            notices_tx,
            notices_rx,
            frame: 0,
        }
    }

    pub fn handle(&self) -> WorldHandle {
        WorldHandle {
            commands: self.commands_tx.clone(),
            events: self.events.clone(),
        }
    }

    pub fn service(&self) -> &Arc<Mutex<WorldService>> {
        &self.service
    }

    /// Apply every queued command. Returns how many were applied.
    pub fn process_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands_rx.try_recv() {
            self.apply(command);
            applied += 1;
        }
        self.flush_notices();
        applied
    }

    /// Advance the world one tick and publish what happened.
    pub fn step(&mut self) {
        let dt = 1.0 / self.config.tick_rate_hz.max(f32::EPSILON) as f64;
        // Hold the lock only long enough to tick, then release before publishing.
        let events = {
            let mut svc = self.service.lock();
            svc.use_time(dt)
        };
        self.frame = events.tick;

        let span = tracing::debug_span!("tick", frame = events.tick, moved = events.transforms.len());
        let _enter = span.enter();
        for transform in events.transforms {
            self.publish(OutboundEvent::Transform(WorldEvent::new(
                self.config.session.as_str(),
                self.frame,
                transform,
            )));
        }
        self.flush_notices();
    }

    /// Run until the task is cancelled or SIGINT arrives.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "WorldDriver active – session '{}' ticking at {:.0}Hz",
            self.config.session, self.config.tick_rate_hz
        );
        let interval = std::time::Duration::from_secs_f32(1.0 / self.config.tick_rate_hz.max(f32::EPSILON));
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => self.step(),
                Some(command) = self.commands_rx.recv() => {
                    self.apply(command);
                    self.flush_notices();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("WorldDriver shutting down (SIGINT)");
                    break;
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn apply(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::EnterWorld { msg, reply } => {
                let result = self.enter_world(msg);
                let _ = reply.send(result);
            }
            WorldCommand::SetPosition { msg, reply } => {
                let result = self
                    .service
                    .lock()
                    .set_position(msg.id, msg.position.into(), msg.flags);
                let _ = reply.send(result);
            }
            WorldCommand::Movement { msg, reply } => {
                let result = self.service.lock().perform_movement(msg.id, msg.request);
                let _ = reply.send(result);
            }
            WorldCommand::LeaveWorld { id, reply } => {
                let result = {
                    let mut svc = self.service.lock();
                    svc.leave_world(id).map(|()| {
                        svc.remove_object(id);
                    })
                };
                if result.is_ok() {
                    self.publish(OutboundEvent::Removed(WorldEvent::new(
                        self.config.session.as_str(),
                        self.frame,
                        EntityRemoved { entity_id: id },
                    )));
                }
                let _ = reply.send(result);
            }
            WorldCommand::Stats { reply } => {
                let _ = reply.send(self.service.lock().stats());
            }
        }
    }

    fn enter_world(&mut self, msg: EnterWorldMsg) -> Result<Position, PhysicsError> {
        let shape = match msg.shape {
            ShapeMsg::Sphere { radius } => ShapeSet::sphere(radius),
            ShapeMsg::Creature { radius, height } => ShapeSet::creature(radius, height),
            ShapeMsg::Cylinder { radius, height } => ShapeSet::cylinder(radius, height),
        };
        let state = PhysicsState::from_bits_truncate(msg.state);
        let mut svc = self.service.lock();
        let object = svc
            .new_object(msg.id, shape, state)
            .with_scale(msg.scale)
            .with_weenie(ChannelWeenie::new(msg.id, self.notices_tx.clone()));
        svc.create_object(object);
        let result = svc.enter_world(msg.id, msg.position.into());
        if let Err(e) = &result {
            warn!("enter_world for {} failed: {}", msg.id, e);
            svc.remove_object(msg.id);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    fn flush_notices(&mut self) {
        while let Ok(notice) = self.notices_rx.try_recv() {
            self.publish(OutboundEvent::Notice(WorldEvent::new(
                self.config.session.as_str(),
                self.frame,
                notice,
            )));
        }
    }

    /// Broadcast `event`. Having no subscribers is not an error.
    fn publish(&self, event: OutboundEvent) {
        if self.events.send(event).is_err() {
            log::trace!("No subscribers for outbound event");
        }
    }
}
