//! Ark ECS -- sparse-set Entity Component System for the Ark runtime.
//!
//! Entities are plain monotonic ids that are never reissued. Each registered
//! component kind owns one densely packed column, and queries walk the
//! smallest matching column. All entity iteration is in ascending id order,
//! so the same world always yields the same sequence.
//!
//! The whole world can be captured as a JSON-backed [`WorldSnapshot`] and
//! replaced atomically from one, which is how multiplayer participants
//! receive authoritative state.
//!
//! # Quick Start
//!
//! ```
//! use ark_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let entity = world
//!     .spawn_bundle(
//!         ComponentBundle::new()
//!             .with(Position { x: 0.0, y: 0.0 })
//!             .with(Velocity { dx: 1.0, dy: 0.0 }),
//!     )
//!     .unwrap();
//!
//! for (_e, (pos, vel)) in world.query::<(&Position, &Velocity)>() {
//!     assert_eq!(pos.x + vel.dx, 1.0);
//! }
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod query;
pub mod snapshot;
mod storage;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Reads never fail: a missing component or entity is `None`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// A write referenced an entity that was never created or already removed.
    #[error("entity {entity} does not exist (removed or never created)")]
    UnknownEntity { entity: entity::EntityId },

    /// The same component kind appeared twice in one spawn call.
    #[error("component '{component}' appears more than once in the same bundle")]
    DuplicateComponentInBatch { component: String },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// Every issuable entity id has been used.
    #[error("entity id space exhausted")]
    EntityIdsExhausted,

    /// A snapshot named an id that can never be live.
    #[error("entity {entity} is reserved and cannot be adopted")]
    ReservedEntityId { entity: entity::EntityId },

    /// Deserialization of a component value failed.
    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserializationError { component: String, details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentInfo, ComponentKind, ComponentRegistry};
    pub use crate::entity::EntityId;
    pub use crate::query::{Query, QueryItem, QueryIter};
    pub use crate::snapshot::{EntitySnapshot, WorldSnapshot};
    pub use crate::world::{ComponentBundle, ComponentView, World};
    pub use crate::EcsError;
}

pub use snapshot::WorldSnapshot;

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
