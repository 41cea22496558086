//! Component kind registration and metadata.
//!
//! Every component type used in the ECS must be registered in a
//! [`ComponentRegistry`]. Registration produces a [`ComponentKind`], a small
//! dense integer tag that indexes the component columns and is used as the
//! key in kind-list queries.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Plain data that can be attached to an entity.
///
/// Components must be serializable so the whole simulation state can be
/// captured and pushed to remote participants.
pub trait Component: Clone + Serialize + DeserializeOwned + 'static {}

impl<T> Component for T where T: Clone + Serialize + DeserializeOwned + 'static {}

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Opaque, lightweight tag for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKind(pub(crate) u32);

impl ComponentKind {
    /// Index of this kind's column.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Tag assigned at registration time.
    pub kind: ComponentKind,
    /// Name supplied by the caller. Used as the key in snapshots.
    pub name: String,
    /// Rust type name, for diagnostics.
    pub type_name: &'static str,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types and names to [`ComponentKind`]s.
///
/// A type can only be registered once; subsequent registrations of the same
/// Rust `TypeId` return the existing kind.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentKind>,
    by_name: HashMap<String, ComponentKind>,
    /// Indexed by `ComponentKind.0`.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under the given `name`.
    ///
    /// Returns `(kind, newly_registered)`. If the type is already registered
    /// the existing kind is returned and `name` is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different type. This is a
    /// setup-time programming error.
    pub fn register<T: Component>(&mut self, name: &str) -> (ComponentKind, bool) {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return (existing, false);
        }
        if self.by_name.contains_key(name) {
            panic!("component name '{name}' is already registered for a different type");
        }

        let kind = ComponentKind(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            kind,
            name: name.to_owned(),
            type_name: std::any::type_name::<T>(),
            type_id,
        });
        self.by_type.insert(type_id, kind);
        self.by_name.insert(name.to_owned(), kind);
        (kind, true)
    }

    /// Look up a component kind by its Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentKind> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component kind by `TypeId`.
    pub fn lookup_type_id(&self, type_id: TypeId) -> Option<ComponentKind> {
        self.by_type.get(&type_id).copied()
    }

    /// Look up a component kind by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentKind> {
        self.by_name.get(name).copied()
    }

    /// Metadata for a registered kind.
    pub fn get_info(&self, kind: ComponentKind) -> Option<&ComponentInfo> {
        self.infos.get(kind.index())
    }

    /// Total number of registered component kinds.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component kinds have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Names of all registered component kinds, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
