//! Sparse-set component columns.
//!
//! Each registered [`ComponentKind`] owns one column. A column keeps its
//! values densely packed in a `Vec<T>` next to a parallel vector of owning
//! entities, plus an entity -> row index. Removal swaps the last row into the
//! hole so the dense arrays never contain gaps.
//!
//! Columns are type-erased behind [`ErasedColumn`] so the world can hold all
//! of them in one `Vec` indexed by kind. Typed access goes through
//! [`ErasedColumn::as_any`] and a downcast to [`Column<T>`].

use std::any::Any;
use std::collections::HashMap;

use crate::component::{Component, ComponentKind};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Column<T>
// ---------------------------------------------------------------------------

/// Dense storage for a single component type.
#[derive(Debug)]
pub(crate) struct Column<T> {
    kind: ComponentKind,
    values: Vec<T>,
    owners: Vec<EntityId>,
    rows: HashMap<EntityId, usize>,
}

impl<T: Component> Column<T> {
    pub(crate) fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            values: Vec::new(),
            owners: Vec::new(),
            rows: HashMap::new(),
        }
    }

    /// Insert or replace the value owned by `entity`.
    pub(crate) fn upsert(&mut self, entity: EntityId, value: T) {
        match self.rows.get(&entity) {
            Some(&row) => self.values[row] = value,
            None => {
                self.rows.insert(entity, self.values.len());
                self.values.push(value);
                self.owners.push(entity);
            }
        }
    }

    pub(crate) fn get(&self, entity: EntityId) -> Option<&T> {
        self.rows.get(&entity).map(|&row| &self.values[row])
    }

    pub(crate) fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        let row = *self.rows.get(&entity)?;
        Some(&mut self.values[row])
    }

    /// Remove and return the value owned by `entity`.
    pub(crate) fn take(&mut self, entity: EntityId) -> Option<T> {
        let row = self.rows.remove(&entity)?;
        let value = self.values.swap_remove(row);
        self.owners.swap_remove(row);
        if let Some(&moved) = self.owners.get(row) {
            self.rows.insert(moved, row);
        }
        Some(value)
    }

    /// Iterate `(owner, &mut value)` in row order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.owners.iter().copied().zip(self.values.iter_mut())
    }
}

// ---------------------------------------------------------------------------
// ErasedColumn
// ---------------------------------------------------------------------------

/// A component value decoded from JSON but not yet stored.
///
/// Decoding is split from insertion so that bulk replacement can validate a
/// whole payload before touching the world.
pub(crate) struct DecodedValue(Box<dyn Any>);

/// Type-erased operations every column supports.
pub(crate) trait ErasedColumn {
    fn kind(&self) -> ComponentKind;
    fn contains(&self, entity: EntityId) -> bool;
    /// Drop the value owned by `entity`. Returns `true` if one existed.
    fn remove(&mut self, entity: EntityId) -> bool;
    fn len(&self) -> usize;
    /// Owners in row order.
    fn owners(&self) -> &[EntityId];
    fn get_any(&self, entity: EntityId) -> Option<&dyn Any>;
    fn to_json(&self, entity: EntityId) -> Option<Result<serde_json::Value, String>>;
    fn decode(&self, value: &serde_json::Value) -> Result<DecodedValue, String>;
    /// Store a value produced by [`decode`](Self::decode) on this same column.
    fn upsert_decoded(&mut self, entity: EntityId, value: DecodedValue);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedColumn for Column<T> {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    fn remove(&mut self, entity: EntityId) -> bool {
        self.take(entity).is_some()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn owners(&self) -> &[EntityId] {
        &self.owners
    }

    fn get_any(&self, entity: EntityId) -> Option<&dyn Any> {
        self.get(entity).map(|v| v as &dyn Any)
    }

    fn to_json(&self, entity: EntityId) -> Option<Result<serde_json::Value, String>> {
        self.get(entity)
            .map(|v| serde_json::to_value(v).map_err(|e| e.to_string()))
    }

    fn decode(&self, value: &serde_json::Value) -> Result<DecodedValue, String> {
        let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        Ok(DecodedValue(Box::new(typed)))
    }

    fn upsert_decoded(&mut self, entity: EntityId, value: DecodedValue) {
        // Values only ever come from `decode` on the same column, so the
        // downcast cannot fail.
        if let Ok(typed) = value.0.downcast::<T>() {
            self.upsert(entity, *typed);
        } else {
            tracing::warn!(kind = ?self.kind, %entity, "decoded value has the wrong type for column");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Hp(u32);

    fn e(n: u64) -> EntityId {
        EntityId::from_raw(n)
    }

    #[test]
    fn upsert_replaces_existing_value() {
        let mut col = Column::<Hp>::new(ComponentKind(0));
        col.upsert(e(1), Hp(10));
        col.upsert(e(1), Hp(20));
        assert_eq!(col.len(), 1);
        assert_eq!(col.get(e(1)), Some(&Hp(20)));
    }

    #[test]
    fn take_swaps_last_row_into_hole() {
        let mut col = Column::<Hp>::new(ComponentKind(0));
        col.upsert(e(1), Hp(1));
        col.upsert(e(2), Hp(2));
        col.upsert(e(3), Hp(3));

        assert_eq!(col.take(e(1)), Some(Hp(1)));
        assert_eq!(col.owners(), &[e(3), e(2)]);
        assert_eq!(col.get(e(3)), Some(&Hp(3)));
        assert_eq!(col.get(e(2)), Some(&Hp(2)));
        assert_eq!(col.take(e(1)), None);
    }

    #[test]
    fn take_last_row() {
        let mut col = Column::<Hp>::new(ComponentKind(0));
        col.upsert(e(1), Hp(1));
        col.upsert(e(2), Hp(2));
        assert_eq!(col.take(e(2)), Some(Hp(2)));
        assert_eq!(col.get(e(1)), Some(&Hp(1)));
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn json_roundtrip_through_erased_api() {
        let mut col = Column::<Hp>::new(ComponentKind(0));
        col.upsert(e(4), Hp(7));
        let json = col.to_json(e(4)).unwrap().unwrap();
        assert_eq!(json, serde_json::json!(7));

        let decoded = col.decode(&serde_json::json!(9)).unwrap();
        col.upsert_decoded(e(5), decoded);
        assert_eq!(col.get(e(5)), Some(&Hp(9)));
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let col = Column::<Hp>::new(ComponentKind(0));
        assert!(col.decode(&serde_json::json!({"nope": true})).is_err());
    }
}
