//! Physics adapter contract, rapier2d backend, and the physics system.
//!
//! The engine owns the association between entities and physics bodies;
//! the [`PhysicsAdapter`] owns the simulation. Each tick [`PhysicsSystem`]:
//!
//! 1. Removes bodies whose entity is gone or no longer has a [`PhysicsBody`].
//! 2. Creates bodies for new entities with [`PhysicsBody`] + [`Position`],
//!    and pushes ECS state into kinematic and static bodies.
//! 3. Steps the adapter by the tick delta.
//! 4. Writes dynamic body positions and velocities back into the ECS.
//! 5. Publishes a [`Collision`] event for every contact that started.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Bodies are tracked in
//! ascending entity order and contacts are sorted, so identical inputs
//! produce identical write-backs and event sequences.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ark_ecs::entity::EntityId;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::context::ActionContext;
use crate::event::Collision;
use crate::system::System;

/// Registered component name for [`Position`].
pub const POSITION_COMPONENT: &str = "position";
/// Registered component name for [`Velocity`].
pub const VELOCITY_COMPONENT: &str = "velocity";
/// Registered component name for [`PhysicsBody`].
pub const PHYSICS_BODY_COMPONENT: &str = "physics_body";

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// 2D position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// 2D linear velocity in units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

/// How the simulation treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicsBodyType {
    /// Moved by the solver. Its state is written back into the ECS.
    Dynamic,
    /// Moved by game logic through `Position` and `Velocity`.
    Kinematic,
    /// Never moves.
    Static,
}

/// Collider geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Box { half_width: f64, half_height: f64 },
    Circle { radius: f64 },
}

/// Attach to an entity (together with [`Position`]) to simulate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    pub body_type: PhysicsBodyType,
    pub collider: ColliderShape,
    /// 0.0 absorbs, 1.0 bounces perfectly.
    pub restitution: f64,
    /// Sensors report contacts but do not collide.
    pub is_sensor: bool,
}

impl PhysicsBody {
    pub fn is_dynamic(&self) -> bool {
        self.body_type == PhysicsBodyType::Dynamic
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// A body's state as seen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Position,
    pub velocity: Velocity,
    pub dynamic: bool,
}

/// Two bodies started touching during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub entity_a: EntityId,
    pub entity_b: EntityId,
}

/// A physics simulator keyed by entity.
pub trait PhysicsAdapter {
    /// Create a body for `entity`. A no-op if it already has one.
    fn create_body(
        &mut self,
        entity: EntityId,
        body: &PhysicsBody,
        position: &Position,
        velocity: &Velocity,
    );

    /// Remove the body for `entity`. Returns whether one existed.
    fn remove_body(&mut self, entity: EntityId) -> bool;

    fn has_body(&self, entity: EntityId) -> bool;

    /// Entities with a body, ascending.
    fn bodies(&self) -> Vec<EntityId>;

    fn get_body(&self, entity: EntityId) -> Option<BodyState>;

    /// Overwrite a body's position and velocity.
    fn set_body_state(&mut self, entity: EntityId, position: &Position, velocity: &Velocity);

    /// Apply an instantaneous impulse. Returns whether the body exists.
    fn apply_impulse(&mut self, entity: EntityId, impulse: &Velocity) -> bool;

    /// Advance the simulation and report contacts that started, sorted by
    /// `(min, max)` entity id.
    fn step(&mut self, dt: f64) -> Vec<Contact>;
}

// ---------------------------------------------------------------------------
// RapierPhysics
// ---------------------------------------------------------------------------

/// [`PhysicsAdapter`] backed by rapier2d.
pub struct RapierPhysics {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    entity_to_body: BTreeMap<EntityId, RigidBodyHandle>,
    collider_to_entity: HashMap<ColliderHandle, EntityId>,
}

impl Default for RapierPhysics {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl std::fmt::Debug for RapierPhysics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapierPhysics")
            .field("gravity", &(self.gravity.x, self.gravity.y))
            .field("bodies", &self.entity_to_body.len())
            .finish()
    }
}

impl RapierPhysics {
    pub fn new(gravity_x: f64, gravity_y: f64) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity_x as Real, gravity_y as Real],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            entity_to_body: BTreeMap::new(),
            collider_to_entity: HashMap::new(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }
}

impl PhysicsAdapter for RapierPhysics {
    fn create_body(
        &mut self,
        entity: EntityId,
        body: &PhysicsBody,
        position: &Position,
        velocity: &Velocity,
    ) {
        if self.entity_to_body.contains_key(&entity) {
            return;
        }

        let translation = vector![position.x as Real, position.y as Real];
        let linvel = vector![velocity.dx as Real, velocity.dy as Real];
        let rb = match body.body_type {
            PhysicsBodyType::Dynamic => RigidBodyBuilder::dynamic()
                .translation(translation)
                .linvel(linvel)
                .build(),
            PhysicsBodyType::Kinematic => RigidBodyBuilder::kinematic_velocity_based()
                .translation(translation)
                .linvel(linvel)
                .build(),
            PhysicsBodyType::Static => RigidBodyBuilder::fixed().translation(translation).build(),
        };
        let body_handle = self.rigid_body_set.insert(rb);
        self.entity_to_body.insert(entity, body_handle);

        let shape = match body.collider {
            ColliderShape::Box {
                half_width,
                half_height,
            } => SharedShape::cuboid(half_width as Real, half_height as Real),
            ColliderShape::Circle { radius } => SharedShape::ball(radius as Real),
        };
        let collider = ColliderBuilder::new(shape)
            .restitution(body.restitution as Real)
            .sensor(body.is_sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, body_handle, &mut self.rigid_body_set);
        self.collider_to_entity.insert(collider_handle, entity);

        tracing::trace!(entity = %entity, body_type = ?body.body_type, "created physics body");
    }

    fn remove_body(&mut self, entity: EntityId) -> bool {
        let Some(body_handle) = self.entity_to_body.remove(&entity) else {
            return false;
        };
        self.rigid_body_set.remove(
            body_handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.collider_to_entity.retain(|_, owner| *owner != entity);
        tracing::trace!(entity = %entity, "removed physics body");
        true
    }

    fn has_body(&self, entity: EntityId) -> bool {
        self.entity_to_body.contains_key(&entity)
    }

    fn bodies(&self) -> Vec<EntityId> {
        self.entity_to_body.keys().copied().collect()
    }

    fn get_body(&self, entity: EntityId) -> Option<BodyState> {
        let rb = self.rigid_body_set.get(*self.entity_to_body.get(&entity)?)?;
        let translation = rb.translation();
        let linvel = rb.linvel();
        Some(BodyState {
            position: Position {
                x: translation.x as f64,
                y: translation.y as f64,
            },
            velocity: Velocity {
                dx: linvel.x as f64,
                dy: linvel.y as f64,
            },
            dynamic: rb.is_dynamic(),
        })
    }

    fn set_body_state(&mut self, entity: EntityId, position: &Position, velocity: &Velocity) {
        let Some(&handle) = self.entity_to_body.get(&entity) else {
            return;
        };
        if let Some(rb) = self.rigid_body_set.get_mut(handle) {
            rb.set_translation(vector![position.x as Real, position.y as Real], true);
            rb.set_linvel(vector![velocity.dx as Real, velocity.dy as Real], true);
        }
    }

    fn apply_impulse(&mut self, entity: EntityId, impulse: &Velocity) -> bool {
        let Some(&handle) = self.entity_to_body.get(&entity) else {
            return false;
        };
        match self.rigid_body_set.get_mut(handle) {
            Some(rb) => {
                rb.apply_impulse(vector![impulse.dx as Real, impulse.dy as Real], true);
                true
            }
            None => false,
        }
    }

    fn step(&mut self, dt: f64) -> Vec<Contact> {
        self.integration_params.dt = dt as Real;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &event_handler,
        );

        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            if let CollisionEvent::Started(h1, h2, _flags) = event {
                let a = self.collider_to_entity.get(&h1).copied();
                let b = self.collider_to_entity.get(&h2).copied();
                if let (Some(a), Some(b)) = (a, b) {
                    contacts.push(Contact {
                        entity_a: a.min(b),
                        entity_b: a.max(b),
                    });
                }
            }
        }
        // Channel delivery order is not stable across runs.
        contacts.sort_by_key(|c| (c.entity_a, c.entity_b));
        contacts
    }
}

// ---------------------------------------------------------------------------
// PhysicsSystem
// ---------------------------------------------------------------------------

/// Keeps the attached [`PhysicsAdapter`] in step with the ECS.
///
/// Does nothing when no adapter is attached.
#[derive(Debug, Default)]
pub struct PhysicsSystem;

struct Tracked {
    entity: EntityId,
    body: PhysicsBody,
    position: Position,
    velocity: Velocity,
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn run(&self, dt: f64, ctx: &mut ActionContext<'_>) -> anyhow::Result<()> {
        if ctx.physics().is_none() {
            return Ok(());
        }

        let tracked: Vec<Tracked> = {
            let world = ctx.world();
            world
                .query::<(&PhysicsBody, &Position)>()
                .map(|(entity, (body, position))| Tracked {
                    entity,
                    body: body.clone(),
                    position: *position,
                    velocity: world
                        .get_component::<Velocity>(entity)
                        .copied()
                        .unwrap_or_default(),
                })
                .collect()
        };
        let wanted: BTreeSet<EntityId> = tracked.iter().map(|t| t.entity).collect();

        let Some(physics) = ctx.physics() else {
            return Ok(());
        };

        for stale in physics.bodies() {
            if !wanted.contains(&stale) {
                physics.remove_body(stale);
            }
        }
        for t in &tracked {
            if !physics.has_body(t.entity) {
                physics.create_body(t.entity, &t.body, &t.position, &t.velocity);
            } else if !t.body.is_dynamic() {
                physics.set_body_state(t.entity, &t.position, &t.velocity);
            }
        }

        let contacts = physics.step(dt);

        let updates: Vec<(EntityId, BodyState)> = tracked
            .iter()
            .filter(|t| t.body.is_dynamic())
            .filter_map(|t| physics.get_body(t.entity).map(|state| (t.entity, state)))
            .collect();

        let world = ctx.world_mut();
        for (entity, state) in updates {
            if let Some(position) = world.get_component_mut::<Position>(entity) {
                *position = state.position;
            }
            if let Some(velocity) = world.get_component_mut::<Velocity>(entity) {
                *velocity = state.velocity;
            }
        }

        for contact in contacts {
            tracing::trace!(a = %contact.entity_a, b = %contact.entity_b, "collision started");
            ctx.emit(Collision {
                entity_a: contact.entity_a,
                entity_b: contact.entity_b,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
