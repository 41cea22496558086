//! Typed, read-only queries over the world.
//!
//! A query is a tuple of `&T` items: `(&Position,)`, `(&Position, &Velocity)`
//! and so on up to four. Matching is done on kinds first
//! ([`World::get_entities`]), so iteration order is ascending [`EntityId`]
//! regardless of how the columns happen to be laid out.
//!
//! Mutation goes through [`World::get_component_mut`] or
//! [`World::iter_mut`].

use crate::component::{Component, ComponentKind};
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// QueryItem
// ---------------------------------------------------------------------------

/// One element of a query tuple.
pub trait QueryItem {
    /// The output type yielded per entity.
    type Item<'w>;
    /// The component kind this item reads, if registered.
    fn kind(world: &World) -> Option<ComponentKind>;
    /// Fetch the item for one entity.
    fn fetch(world: &World, entity: EntityId) -> Option<Self::Item<'_>>;
}

impl<T: Component> QueryItem for &T {
    type Item<'w> = &'w T;

    fn kind(world: &World) -> Option<ComponentKind> {
        world.kind_of::<T>()
    }

    fn fetch(world: &World, entity: EntityId) -> Option<Self::Item<'_>> {
        world.get_component::<T>(entity)
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A tuple of [`QueryItem`]s.
pub trait Query {
    /// The per-entity output type.
    type Item<'w>;
    /// All kinds the query requires. `None` if any is unregistered, in which
    /// case nothing can match.
    fn kinds(world: &World) -> Option<Vec<ComponentKind>>;
    /// Fetch one entity's items.
    fn fetch(world: &World, entity: EntityId) -> Option<Self::Item<'_>>;
}

macro_rules! impl_query_tuple {
    ($($item:ident),+) => {
        impl<$($item: QueryItem),+> Query for ($($item,)+) {
            type Item<'w> = ($($item::Item<'w>,)+);

            fn kinds(world: &World) -> Option<Vec<ComponentKind>> {
                Some(vec![$($item::kind(world)?),+])
            }

            fn fetch(world: &World, entity: EntityId) -> Option<Self::Item<'_>> {
                Some(($($item::fetch(world, entity)?,)+))
            }
        }
    };
}

impl_query_tuple!(A);
impl_query_tuple!(A, B);
impl_query_tuple!(A, B, C);
impl_query_tuple!(A, B, C, D);

// ---------------------------------------------------------------------------
// QueryIter
// ---------------------------------------------------------------------------

/// Iterator returned by [`World::query`].
pub struct QueryIter<'w, Q: Query> {
    world: &'w World,
    entities: std::vec::IntoIter<EntityId>,
    _marker: std::marker::PhantomData<fn() -> Q>,
}

impl<'w, Q: Query> QueryIter<'w, Q> {
    pub(crate) fn new(world: &'w World, entities: Vec<EntityId>) -> Self {
        Self {
            world,
            entities: entities.into_iter(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let world = self.world;
        self.entities
            .by_ref()
            .find_map(|entity| Q::fetch(world, entity).map(|item| (entity, item)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::world::ComponentBundle;
    use crate::world::World;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos(i32);

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Vel(i32);

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Tag;

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Pos>("pos");
        world.register_component::<Vel>("vel");
        world
    }

    #[test]
    fn single_item_query() {
        let mut world = setup_world();
        let a = world.spawn_with(Pos(1)).unwrap();
        let b = world.spawn_with(Pos(2)).unwrap();
        world.spawn_with(Vel(3)).unwrap();

        let got: Vec<_> = world.query::<(&Pos,)>().map(|(e, (p,))| (e, p.0)).collect();
        assert_eq!(got, vec![(a, 1), (b, 2)]);
    }

    #[test]
    fn pair_query_only_matches_both() {
        let mut world = setup_world();
        world.spawn_with(Pos(1)).unwrap();
        let both = world
            .spawn_bundle(ComponentBundle::new().with(Pos(2)).with(Vel(20)))
            .unwrap();

        let got: Vec<_> = world
            .query::<(&Pos, &Vel)>()
            .map(|(e, (p, v))| (e, p.0, v.0))
            .collect();
        assert_eq!(got, vec![(both, 2, 20)]);
        assert_eq!(world.entities_with::<(&Pos, &Vel)>(), vec![both]);
    }

    #[test]
    fn unregistered_item_matches_nothing() {
        let mut world = setup_world();
        world.spawn_with(Pos(1)).unwrap();
        assert_eq!(world.query::<(&Pos, &Tag)>().count(), 0);
        assert!(world.entities_with::<(&Tag,)>().is_empty());
    }

    #[test]
    fn query_order_is_ascending_after_removal() {
        let mut world = setup_world();
        let ids: Vec<_> = (0..4).map(|i| world.spawn_with(Pos(i)).unwrap()).collect();
        world.remove_component::<Pos>(ids[1]).unwrap();
        world.upsert_component(ids[1], Pos(9)).unwrap();

        let order: Vec<_> = world.query::<(&Pos,)>().map(|(e, _)| e).collect();
        assert_eq!(order, ids);
    }
}
