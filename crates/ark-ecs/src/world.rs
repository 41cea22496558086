//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component registry, and one storage column per registered
//! component kind.

use std::any::{Any, TypeId};

use crate::component::{Component, ComponentKind, ComponentRegistry};
use crate::entity::{EntityAllocator, EntityId};
use crate::query::{Query, QueryIter};
use crate::storage::{Column, ErasedColumn};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// One pending component in a [`ComponentBundle`].
trait BundleEntry {
    fn component_type(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn insert_into(self: Box<Self>, world: &mut World, entity: EntityId);
}

struct Pending<T>(T);

impl<T: Component> BundleEntry for Pending<T> {
    fn component_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn insert_into(self: Box<Self>, world: &mut World, entity: EntityId) {
        if let Some(column) = world.column_mut::<T>() {
            column.upsert(entity, self.0);
        }
    }
}

/// A set of components to attach to a new entity in one call.
///
/// ```
/// use ark_ecs::prelude::*;
///
/// #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// struct Position { x: f32, y: f32 }
///
/// let mut world = World::new();
/// world.register_component::<Position>("position");
/// let e = world
///     .spawn_bundle(ComponentBundle::new().with(Position { x: 1.0, y: 2.0 }))
///     .unwrap();
/// assert!(world.has_component::<Position>(e));
/// ```
#[derive(Default)]
pub struct ComponentBundle {
    entries: Vec<Box<dyn BundleEntry>>,
}

impl ComponentBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component (builder style).
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.add(value);
        self
    }

    /// Add a component.
    ///
    /// Duplicates are accepted here and rejected by
    /// [`World::spawn_bundle`] with [`EcsError::DuplicateComponentInBatch`].
    pub fn add<T: Component>(&mut self, value: T) {
        self.entries.push(Box::new(Pending(value)));
    }

    /// Number of components in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ComponentBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.type_name()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentView
// ---------------------------------------------------------------------------

/// A read-only, type-erased view of one component on one entity.
///
/// Returned by [`World::get_components`] for heterogeneous access.
pub struct ComponentView<'w> {
    kind: ComponentKind,
    name: &'w str,
    entity: EntityId,
    column: &'w dyn ErasedColumn,
}

impl<'w> ComponentView<'w> {
    /// The component's kind tag.
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// The component's registered name.
    pub fn name(&self) -> &'w str {
        self.name
    }

    /// Borrow the value as a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&'w T> {
        self.column
            .get_any(self.entity)
            .and_then(<dyn Any>::downcast_ref::<T>)
    }

    /// Serialize the value to JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, EcsError> {
        match self.column.to_json(self.entity) {
            Some(Ok(value)) => Ok(value),
            Some(Err(details)) => Err(EcsError::ComponentDeserializationError {
                component: self.name.to_owned(),
                details,
            }),
            None => Err(EcsError::UnknownEntity {
                entity: self.entity,
            }),
        }
    }
}

impl std::fmt::Debug for ComponentView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentView")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("entity", &self.entity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level ECS container.
///
/// Owns the entity allocator, component registry, and all component columns.
/// Provides the primary API for entity lifecycle and component access.
///
/// Entity iteration (`entities`, `get_entities`, `query`) is always in
/// ascending [`EntityId`] order.
pub struct World {
    pub(crate) allocator: EntityAllocator,
    pub(crate) registry: ComponentRegistry,
    /// Indexed by `ComponentKind.0`.
    pub(crate) columns: Vec<Box<dyn ErasedColumn>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.allocator.alive_count())
            .field("component_kinds", &self.registry.len())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            columns: Vec::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type under `name` and create its column.
    ///
    /// Registering the same type again returns the existing kind.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentKind {
        let (kind, fresh) = self.registry.register::<T>(name);
        if fresh {
            debug_assert_eq!(kind.index(), self.columns.len());
            self.columns.push(Box::new(Column::<T>::new(kind)));
            tracing::debug!(component = name, ?kind, "registered component kind");
        }
        kind
    }

    /// The kind tag for `T`, if registered.
    pub fn kind_of<T: 'static>(&self) -> Option<ComponentKind> {
        self.registry.lookup::<T>()
    }

    fn unknown_component(&self, name: &str) -> EcsError {
        EcsError::UnknownComponent {
            name: name.to_owned(),
            registered: self.registry.registered_names().join(", "),
        }
    }

    pub(crate) fn column<T: Component>(&self) -> Option<&Column<T>> {
        let kind = self.registry.lookup::<T>()?;
        self.columns[kind.index()].as_any().downcast_ref::<Column<T>>()
    }

    pub(crate) fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        let kind = self.registry.lookup::<T>()?;
        self.columns[kind.index()]
            .as_any_mut()
            .downcast_mut::<Column<T>>()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity with no components.
    ///
    /// Fails only with [`EcsError::EntityIdsExhausted`].
    pub fn create_entity(&mut self) -> Result<EntityId, EcsError> {
        self.allocator.allocate()
    }

    /// Create an entity from a [`ComponentBundle`].
    ///
    /// The bundle is validated before an id is allocated: a repeated
    /// component type fails with [`EcsError::DuplicateComponentInBatch`] and
    /// an unregistered one with [`EcsError::UnknownComponent`]. On error no
    /// entity is created.
    pub fn spawn_bundle(&mut self, bundle: ComponentBundle) -> Result<EntityId, EcsError> {
        let mut seen: Vec<TypeId> = Vec::with_capacity(bundle.entries.len());
        for entry in &bundle.entries {
            if seen.contains(&entry.component_type()) {
                return Err(EcsError::DuplicateComponentInBatch {
                    component: entry.type_name().to_owned(),
                });
            }
            if self.registry.lookup_type_id(entry.component_type()).is_none() {
                return Err(self.unknown_component(entry.type_name()));
            }
            seen.push(entry.component_type());
        }

        let entity = self.allocator.allocate()?;
        for entry in bundle.entries {
            entry.insert_into(self, entity);
        }
        Ok(entity)
    }

    /// Create an entity with a single component.
    pub fn spawn_with<T: Component>(&mut self, component: T) -> Result<EntityId, EcsError> {
        self.spawn_bundle(ComponentBundle::new().with(component))
    }

    /// Remove an entity and every component it owns.
    ///
    /// Removing an entity that does not exist is a no-op. Returns `true` if
    /// the entity was alive.
    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        if !self.allocator.deallocate(entity) {
            return false;
        }
        for column in &mut self.columns {
            column.remove(entity);
        }
        true
    }

    /// Whether `entity` is alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// All live entities, ascending.
    pub fn entities(&self) -> Vec<EntityId> {
        self.allocator.iter().collect()
    }

    // -- component access ---------------------------------------------------

    /// Insert a component, replacing any existing one of the same type.
    pub fn upsert_component<T: Component>(
        &mut self,
        entity: EntityId,
        component: T,
    ) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::UnknownEntity { entity });
        }
        let Some(column) = self.column_mut::<T>() else {
            return Err(self.unknown_component(std::any::type_name::<T>()));
        };
        column.upsert(entity, component);
        Ok(())
    }

    /// Remove a component from an entity, returning it.
    ///
    /// Returns `Ok(None)` if the entity does not have one.
    pub fn remove_component<T: Component>(
        &mut self,
        entity: EntityId,
    ) -> Result<Option<T>, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::UnknownEntity { entity });
        }
        Ok(self.column_mut::<T>().and_then(|c| c.take(entity)))
    }

    /// Borrow a component. Absence is `None`, never an error.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.column::<T>()?.get(entity)
    }

    /// Mutably borrow a component.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.column_mut::<T>()?.get_mut(entity)
    }

    /// Whether an entity has a component of type `T`.
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.column::<T>().is_some_and(|c| c.contains(entity))
    }

    /// The kinds attached to an entity, ascending.
    pub fn kinds_of(&self, entity: EntityId) -> Vec<ComponentKind> {
        self.columns
            .iter()
            .filter(|c| c.contains(entity))
            .map(|c| c.kind())
            .collect()
    }

    /// Every component on an entity. Empty for a dead entity.
    pub fn get_components(&self, entity: EntityId) -> Vec<ComponentView<'_>> {
        self.columns
            .iter()
            .filter(|c| c.contains(entity))
            .filter_map(|c| {
                let info = self.registry.get_info(c.kind())?;
                Some(ComponentView {
                    kind: c.kind(),
                    name: info.name.as_str(),
                    entity,
                    column: &**c,
                })
            })
            .collect()
    }

    /// Iterate all `T` components mutably, in storage order.
    pub fn iter_mut<T: Component>(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.column_mut::<T>().into_iter().flat_map(|c| c.iter_mut())
    }

    // -- queries ------------------------------------------------------------

    /// Entities whose kind set is a superset of `kinds`, ascending.
    ///
    /// An empty `kinds` slice returns every live entity.
    pub fn get_entities(&self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        if kinds.is_empty() {
            return self.entities();
        }
        let Some(columns) = kinds
            .iter()
            .map(|k| self.columns.get(k.index()).map(|c| &**c))
            .collect::<Option<Vec<&dyn ErasedColumn>>>()
        else {
            return Vec::new();
        };

        // Drive the scan from the smallest column.
        let Some(driver) = columns.iter().min_by_key(|c| c.len()) else {
            return Vec::new();
        };
        let mut matches: Vec<EntityId> = driver
            .owners()
            .iter()
            .copied()
            .filter(|&e| columns.iter().all(|c| c.contains(e)))
            .collect();
        matches.sort_unstable();
        matches
    }

    /// Entities matching a typed query, ascending.
    pub fn entities_with<Q: Query>(&self) -> Vec<EntityId> {
        match Q::kinds(self) {
            Some(kinds) => self.get_entities(&kinds),
            None => Vec::new(),
        }
    }

    /// Iterate `(entity, (&A, &B, ...))` for every entity holding all the
    /// queried components, ascending.
    pub fn query<Q: Query>(&self) -> QueryIter<'_, Q> {
        QueryIter::new(self, self.entities_with::<Q>())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
