//! World snapshot and full-state replacement.
//!
//! [`WorldSnapshot`] is a serializable picture of every live entity and its
//! components, keyed by registered component name. A host captures one with
//! [`World::capture_snapshot`]; a participant applies it with
//! [`World::replace_with`] or the lower-level
//! [`World::remove_all_entities_except`] / [`World::bulk_upsert`] pair.
//!
//! Every payload is decoded before the world is touched. A decode failure
//! returns an error and leaves the world exactly as it was.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::component::ComponentKind;
use crate::entity::{EntityAllocator, EntityId};
use crate::storage::DecodedValue;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Serializable snapshot of a single entity's component data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// The entity's id on the capturing side.
    pub entity_id: EntityId,
    /// Component name -> serialized value. `BTreeMap` keeps the encoding
    /// deterministic.
    pub components: BTreeMap<String, serde_json::Value>,
}

/// A complete, serializable snapshot of the ECS world state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Names of all registered component kinds on the capturing side.
    pub component_names: Vec<String>,
    /// All live entities, ascending by id.
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    /// Ids of every entity in the snapshot.
    pub fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.entities.iter().map(|e| e.entity_id).collect()
    }
}

/// An entity whose components have all been decoded but not yet stored.
struct DecodedEntity {
    entity: EntityId,
    components: Vec<(ComponentKind, DecodedValue)>,
}

// ---------------------------------------------------------------------------
// World snapshot/replace impl
// ---------------------------------------------------------------------------

impl World {
    /// Capture every live entity with its components serialized to JSON.
    ///
    /// A component that fails to serialize is skipped with a warning.
    pub fn capture_snapshot(&self) -> WorldSnapshot {
        let component_names = self
            .registry
            .registered_names()
            .into_iter()
            .map(str::to_owned)
            .collect();

        let entities = self
            .allocator
            .iter()
            .map(|entity| {
                let mut components = BTreeMap::new();
                for view in self.get_components(entity) {
                    match view.to_json() {
                        Ok(value) => {
                            components.insert(view.name().to_owned(), value);
                        }
                        Err(err) => {
                            tracing::warn!(
                                %entity,
                                component = view.name(),
                                error = %err,
                                "component failed to serialize, skipping in snapshot"
                            );
                        }
                    }
                }
                EntitySnapshot {
                    entity_id: entity,
                    components,
                }
            })
            .collect();

        WorldSnapshot {
            component_names,
            entities,
        }
    }

    /// Remove every live entity not in `keep`. Returns how many were removed.
    pub fn remove_all_entities_except(&mut self, keep: &BTreeSet<EntityId>) -> usize {
        let doomed: Vec<EntityId> = self
            .allocator
            .iter()
            .filter(|e| !keep.contains(e))
            .collect();
        for &entity in &doomed {
            self.remove_entity(entity);
        }
        doomed.len()
    }

    /// Insert or update entities from snapshot records, keeping their ids.
    ///
    /// Ids not yet live are adopted. Each record is the entity's complete
    /// component set: kinds the record does not list are removed from it.
    /// Nothing is written unless every record decodes.
    pub fn bulk_upsert(&mut self, entities: &[EntitySnapshot]) -> Result<(), EcsError> {
        let decoded = self.decode_entities(entities)?;
        for entry in decoded {
            self.commit_entity(entry)?;
        }
        Ok(())
    }

    /// Make the world hold exactly the entities and components in
    /// `snapshot`.
    ///
    /// Equivalent to [`remove_all_entities_except`](Self::remove_all_entities_except)
    /// with the snapshot's ids followed by [`bulk_upsert`](Self::bulk_upsert),
    /// except that decoding happens before the removal. On error the world is
    /// unchanged.
    pub fn replace_with(&mut self, snapshot: &WorldSnapshot) -> Result<(), EcsError> {
        let decoded = self.decode_entities(&snapshot.entities)?;
        let removed = self.remove_all_entities_except(&snapshot.entity_ids());
        let count = decoded.len();
        for entry in decoded {
            self.commit_entity(entry)?;
        }
        tracing::debug!(entities = count, removed, "world replaced from snapshot");
        Ok(())
    }

    fn decode_entities(&self, entities: &[EntitySnapshot]) -> Result<Vec<DecodedEntity>, EcsError> {
        entities
            .iter()
            .map(|record| -> Result<DecodedEntity, EcsError> {
                EntityAllocator::check_adoptable(record.entity_id)?;
                let components = record
                    .components
                    .iter()
                    .map(|(name, value)| -> Result<(ComponentKind, DecodedValue), EcsError> {
                        let kind = self.registry.lookup_by_name(name).ok_or_else(|| {
                            EcsError::UnknownComponent {
                                name: name.clone(),
                                registered: self.registry.registered_names().join(", "),
                            }
                        })?;
                        let decoded = self.columns[kind.index()].decode(value).map_err(|details| {
                            EcsError::ComponentDeserializationError {
                                component: name.clone(),
                                details,
                            }
                        })?;
                        Ok((kind, decoded))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DecodedEntity {
                    entity: record.entity_id,
                    components,
                })
            })
            .collect()
    }

    /// Store a decoded entity. Its id was checked during decoding, so the
    /// adopt cannot fail part way through a batch.
    fn commit_entity(&mut self, entry: DecodedEntity) -> Result<(), EcsError> {
        let DecodedEntity { entity, components } = entry;
        self.allocator.adopt(entity)?;
        for column in &mut self.columns {
            if !components.iter().any(|(kind, _)| *kind == column.kind()) {
                column.remove(entity);
            }
        }
        for (kind, value) in components {
            self.columns[kind.index()].upsert_decoded(entity, value);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hp(u32);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Name(String);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Hp>("hp");
        world.register_component::<Name>("name");
        world
    }

    fn record(id: u64, components: &[(&str, serde_json::Value)]) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: EntityId::from_raw(id),
            components: components
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn capture_lists_entities_ascending() {
        let mut world = setup_world();
        let a = world.spawn_with(Hp(1)).unwrap();
        let b = world.spawn_with(Name("b".into())).unwrap();
        let snap = world.capture_snapshot();
        let ids: Vec<_> = snap.entities.iter().map(|e| e.entity_id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(snap.entities[0].components["hp"], json!(1));
        assert_eq!(snap.component_names, vec!["hp", "name"]);
    }

    #[test]
    fn remove_all_except_keeps_listed() {
        let mut world = setup_world();
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        let c = world.create_entity().unwrap();
        let keep: BTreeSet<_> = [b].into_iter().collect();
        assert_eq!(world.remove_all_entities_except(&keep), 2);
        assert!(!world.is_alive(a));
        assert!(world.is_alive(b));
        assert!(!world.is_alive(c));
    }

    #[test]
    fn bulk_upsert_adopts_foreign_ids() {
        let mut world = setup_world();
        world
            .bulk_upsert(&[record(50, &[("hp", json!(7))])])
            .unwrap();
        let adopted = EntityId::from_raw(50);
        assert_eq!(world.get_component::<Hp>(adopted), Some(&Hp(7)));
        assert!(world.create_entity().unwrap().to_raw() > 50);
    }

    #[test]
    fn bulk_upsert_is_all_or_nothing() {
        let mut world = setup_world();
        let err = world
            .bulk_upsert(&[
                record(1, &[("hp", json!(1))]),
                record(2, &[("hp", json!("not a number"))]),
            ])
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentDeserializationError { .. }));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn reserved_id_in_records_is_rejected_before_any_write() {
        let mut world = setup_world();
        let kept = world.spawn_with(Hp(1)).unwrap();
        let err = world
            .bulk_upsert(&[
                record(5, &[("hp", json!(2))]),
                record(u64::MAX, &[("hp", json!(3))]),
            ])
            .unwrap_err();
        assert!(matches!(err, EcsError::ReservedEntityId { .. }));
        assert_eq!(world.entities(), vec![kept]);

        let snap = WorldSnapshot {
            component_names: vec![],
            entities: vec![record(u64::MAX, &[])],
        };
        assert!(world.replace_with(&snap).is_err());
        assert_eq!(world.entities(), vec![kept]);

        let fresh = world.create_entity().unwrap();
        assert!(fresh > kept);
    }

    #[test]
    fn replace_with_unknown_component_leaves_world_untouched() {
        let mut world = setup_world();
        let e = world.spawn_with(Hp(3)).unwrap();
        let snap = WorldSnapshot {
            component_names: vec![],
            entities: vec![record(99, &[("mana", json!(1))])],
        };
        let err = world.replace_with(&snap).unwrap_err();
        assert!(matches!(err, EcsError::UnknownComponent { ref name, .. } if name == "mana"));
        assert_eq!(world.entities(), vec![e]);
        assert_eq!(world.get_component::<Hp>(e), Some(&Hp(3)));
    }

    #[test]
    fn replace_with_strips_unlisted_kinds_on_kept_entities() {
        let mut world = setup_world();
        let e = world
            .spawn_bundle(
                crate::world::ComponentBundle::new()
                    .with(Hp(3))
                    .with(Name("x".into())),
            )
            .unwrap();
        let snap = WorldSnapshot {
            component_names: vec![],
            entities: vec![record(e.to_raw(), &[("hp", json!(10))])],
        };
        world.replace_with(&snap).unwrap();
        assert_eq!(world.get_component::<Hp>(e), Some(&Hp(10)));
        assert_eq!(world.get_component::<Name>(e), None);
    }
}
