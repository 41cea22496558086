//! Render-ready view of the world, handed to an external [`Renderer`].

use std::collections::BTreeMap;

use ark_ecs::component::ComponentKind;
use ark_ecs::entity::EntityId;
use ark_ecs::world::World;
use ark_ecs::EcsError;
use serde::{Deserialize, Serialize};

use crate::context::DisplayContext;

/// Renderable components per entity, by registered component name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub entities: BTreeMap<EntityId, BTreeMap<String, serde_json::Value>>,
}

impl Canvas {
    /// Collect every component of a renderable kind. Entities with none
    /// are left out.
    pub fn capture(world: &World, renderable: &[ComponentKind]) -> Result<Self, EcsError> {
        let mut entities = BTreeMap::new();
        if renderable.is_empty() {
            return Ok(Self { entities });
        }
        for entity in world.entities() {
            let mut drawn = BTreeMap::new();
            for view in world.get_components(entity) {
                if renderable.contains(&view.kind()) {
                    drawn.insert(view.name().to_owned(), view.to_json()?);
                }
            }
            if !drawn.is_empty() {
                entities.insert(entity, drawn);
            }
        }
        Ok(Self { entities })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The renderable components of one entity.
    pub fn get(&self, entity: EntityId) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.entities.get(&entity)
    }
}

/// Draws a [`Canvas`]. Called once after every tick that ran.
pub trait Renderer {
    fn render(&mut self, canvas: &Canvas, display: &DisplayContext);
}
