//! Ark Engine -- event-driven frame orchestrator built on [`ark_ecs`].
//!
//! This crate drives an [`ark_ecs::world::World`] forward one frame at a
//! time. Each tick runs the registered systems in fixed schedule-slot order
//! (time, physics, update, render-prep). Systems and listeners publish
//! events on a synchronous, re-entrant [`EventBus`](event::EventBus), and
//! declarative [`Rule`](rule::Rule)s are compiled once at setup into bus
//! subscriptions or per-tick systems.
//!
//! # Quick Start
//!
//! ```
//! use ark_engine::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Score(u32);
//!
//! let blueprint = Blueprint::new()
//!     .setup(|world, _display| {
//!         world.register_component::<Score>("score");
//!         world.spawn_with(Score(0))?;
//!         Ok(())
//!     })
//!     .rule(Rule::every_tick("score_up", |_dt, ctx| {
//!         for (_e, score) in ctx.world_mut().iter_mut::<Score>() {
//!             score.0 += 1;
//!         }
//!         Ok(())
//!     }));
//!
//! let mut ark = Orchestrator::from_blueprint(blueprint, World::new()).unwrap();
//! ark.start();
//! for _ in 0..3 {
//!     ark.tick(1.0 / 60.0);
//! }
//! let scores: Vec<u32> = ark.world().query::<(&Score,)>().map(|(_, (s,))| s.0).collect();
//! assert_eq!(scores, vec![3]);
//! ```

#![deny(unsafe_code)]

pub mod animation;
pub mod blueprint;
pub mod camera;
pub mod canvas;
pub mod config;
pub mod context;
pub mod event;
pub mod frame;
pub mod physics;
pub mod rule;
pub mod sync;
pub mod system;
pub mod time;

use ark_ecs::EcsError;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use ark_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the engine.
///
/// `SubscriberFault` and `SystemFault` are never returned to a publisher or
/// to the host tick source. They are built so the isolated failure can be
/// logged with a consistent message and then counted.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A rule trigger does not fit its action, or names an unknown event.
    #[error("rule '{rule}' has a malformed trigger: {details}")]
    MalformedRuleTrigger { rule: String, details: String },

    /// A listener failed or panicked while handling an event.
    #[error("listener for event '{event}' failed: {details}")]
    SubscriberFault { event: String, details: String },

    /// A system failed or panicked during a tick.
    #[error("system '{system}' failed: {details}")]
    SystemFault { system: String, details: String },

    /// A blueprint setup function returned an error.
    #[error("blueprint setup failed: {0:#}")]
    SetupFailed(anyhow::Error),

    /// An ECS operation failed.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// A sync snapshot's recorded hash does not match its contents.
    #[error("sync snapshot hash mismatch: recorded {recorded}, recomputed {recomputed}")]
    SnapshotHashMismatch { recorded: String, recomputed: String },

    /// State could not be encoded for hashing.
    #[error("failed to encode state: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A [`FrameConfig`](config::FrameConfig) value is out of range or unparsable.
    #[error("invalid frame config: {0}")]
    InvalidConfig(String),
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use ark_ecs::prelude::*;

    pub use crate::animation::{Animation, AnimationSystem};
    pub use crate::blueprint::Blueprint;
    pub use crate::camera::{Camera, CameraSystem, CameraTarget};
    pub use crate::canvas::{Canvas, Renderer};
    pub use crate::config::FrameConfig;
    pub use crate::context::{
        ActionContext, AudioContext, DisplayContext, LoopSignal, SilentAudio, SoundMapping,
    };
    pub use crate::event::{
        Collision, Event, EventBus, EventEnvelope, EventKind, PauseLoop, ResumeLoop,
        ScreenResize, TerminateLoop,
    };
    pub use crate::frame::{LoopState, Orchestrator, TickReport};
    pub use crate::physics::{
        BodyState, ColliderShape, Contact, PhysicsAdapter, PhysicsBody, PhysicsBodyType,
        PhysicsSystem, Position, RapierPhysics, Velocity,
    };
    pub use crate::rule::{Rule, RuleAction, RuleCompilation, Trigger};
    pub use crate::sync::{SyncRole, SyncSnapshot};
    pub use crate::system::{FnSystem, ScheduleSlot, System, SystemRegistry};
    pub use crate::time::{StopWatch, TimeSystem, WORLD_TIME};
    pub use crate::EngineError;
}
