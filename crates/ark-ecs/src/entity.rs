//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is an opaque 64-bit handle. Ids are issued from a
//! monotonic counter and are never reissued, so a handle to a removed entity
//! can never alias a later one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A unique entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Never issued or adopted, so the counter always has a successor.
    pub const RESERVED: EntityId = EntityId(u64::MAX);

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    ///
    /// The id is not live until a [`World`](crate::world::World) allocates or
    /// adopts it.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Issues [`EntityId`]s and tracks which ones are alive.
///
/// Live ids are kept in a `BTreeSet` so iteration is always in ascending id
/// order.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// The next id to hand out. Always greater than every id seen so far.
    next: u64,
    alive: BTreeSet<EntityId>,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, never-before-issued [`EntityId`].
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityIdsExhausted`] once every id below
    /// [`EntityId::RESERVED`] has been issued or adopted.
    pub fn allocate(&mut self) -> Result<EntityId, EcsError> {
        if self.next == EntityId::RESERVED.0 {
            return Err(EcsError::EntityIdsExhausted);
        }
        let id = EntityId(self.next);
        self.next += 1;
        self.alive.insert(id);
        Ok(id)
    }

    /// Check that `id` may be adopted without touching any state.
    pub fn check_adoptable(id: EntityId) -> Result<(), EcsError> {
        if id == EntityId::RESERVED {
            return Err(EcsError::ReservedEntityId { entity: id });
        }
        Ok(())
    }

    /// Mark an externally issued id as alive.
    ///
    /// Used when a remote authority pushes entities with ids it allocated.
    /// Returns `Ok(false)` if the id was already alive.
    ///
    /// # Errors
    ///
    /// [`EcsError::ReservedEntityId`] for [`EntityId::RESERVED`].
    pub fn adopt(&mut self, id: EntityId) -> Result<bool, EcsError> {
        Self::check_adoptable(id)?;
        self.next = self.next.max(id.0 + 1);
        Ok(self.alive.insert(id))
    }

    /// Release an id. Returns `true` if the entity was alive.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        self.alive.remove(&id)
    }

    /// Returns `true` if `id` refers to a currently alive entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.alive.contains(&id)
    }

    /// Total number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    /// Iterate live ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
