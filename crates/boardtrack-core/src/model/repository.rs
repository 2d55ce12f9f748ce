//! Per-entity repository operations.

use super::{from_row, to_row, Entity};
use crate::error::Error;
use crate::storage::{timestamp_value, Predicate, Row, RowQuery, RowStore};
use chrono::Utc;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::debug;

/// Soft-delete marker column.
const DELETED_AT: &str = "deletedAt";

/// Typed create/find/list/update/destroy/restore for one entity.
///
/// Reads of paranoid entities add `deletedAt IS NULL` to every query; the `*_with_deleted`
/// variants leave it out.
pub struct Repository<'s, S: RowStore + ?Sized, E: Entity> {
    store: &'s S,
    _entity: PhantomData<E>,
}

impl<'s, S: RowStore + ?Sized, E: Entity> Repository<'s, S, E> {
    /// Create a repository over a row store.
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Add the soft-delete filter for paranoid entities.
    pub fn scoped(query: RowQuery) -> RowQuery {
        if E::PARANOID {
            query.filter(Predicate::IsNull(DELETED_AT.to_string()))
        } else {
            query
        }
    }

    /// Insert a new entity. Unset fields take the column defaults.
    pub fn create(&self, entity: &E) -> Result<E, Error> {
        let mut row: Row = to_row(entity)?
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect();
        if E::TIMESTAMPS {
            let now = timestamp_value(Utc::now());
            row.insert("createdAt".to_string(), now.clone());
            row.insert("updatedAt".to_string(), now);
        }
        let stored = self.store.insert(E::TABLE, row)?;
        debug!(table = E::TABLE, id = ?stored.get("id"), "Created row");
        from_row(stored)
    }

    /// Find a live row by id.
    pub fn find(&self, id: i64) -> Result<Option<E>, Error> {
        self.find_one(RowQuery::new().eq("id", id))
    }

    /// Find a row by id, soft-deleted or not.
    pub fn find_with_deleted(&self, id: i64) -> Result<Option<E>, Error> {
        self.store
            .select_one(E::TABLE, &RowQuery::new().eq("id", id))?
            .map(from_row)
            .transpose()
    }

    /// First live row matching a query.
    pub fn find_one(&self, query: RowQuery) -> Result<Option<E>, Error> {
        self.store
            .select_one(E::TABLE, &Self::scoped(query))?
            .map(from_row)
            .transpose()
    }

    /// Live rows matching a query.
    pub fn list(&self, query: RowQuery) -> Result<Vec<E>, Error> {
        self.list_with_deleted(Self::scoped(query))
    }

    /// Rows matching a query, including soft-deleted ones.
    pub fn list_with_deleted(&self, query: RowQuery) -> Result<Vec<E>, Error> {
        self.store
            .select(E::TABLE, &query)?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// Number of live rows matching a query.
    pub fn count(&self, query: RowQuery) -> Result<usize, Error> {
        self.store.count(E::TABLE, &Self::scoped(query))
    }

    /// Write every field of a live entity back to its row.
    pub fn update(&self, entity: &E) -> Result<E, Error> {
        let id = entity
            .id()
            .ok_or_else(|| Error::InvalidData(format!("{} row has no id", E::TABLE)))?;
        if self.find(id)?.is_none() {
            return Err(Error::NotFound);
        }

        let mut changes = to_row(entity)?;
        changes.remove("id");
        changes.remove("createdAt");
        changes.remove(DELETED_AT);
        if E::TIMESTAMPS {
            changes.insert("updatedAt".to_string(), timestamp_value(Utc::now()));
        }
        from_row(self.store.update(E::TABLE, id, changes)?)
    }

    /// Delete a row: soft delete for paranoid entities, physical delete otherwise.
    pub fn destroy(&self, id: i64) -> Result<(), Error> {
        if !E::PARANOID {
            return self.force_destroy(id);
        }
        if self.find(id)?.is_none() {
            return Err(Error::NotFound);
        }
        let mut changes = Row::new();
        changes.insert(DELETED_AT.to_string(), timestamp_value(Utc::now()));
        self.store.update(E::TABLE, id, changes)?;
        debug!(table = E::TABLE, id, "Soft-deleted row");
        Ok(())
    }

    /// Physically delete a row, applying foreign key delete actions.
    pub fn force_destroy(&self, id: i64) -> Result<(), Error> {
        self.store.delete(E::TABLE, id)?;
        debug!(table = E::TABLE, id, "Deleted row");
        Ok(())
    }

    /// Clear the soft-delete marker of a paranoid row.
    pub fn restore(&self, id: i64) -> Result<E, Error> {
        if !E::PARANOID {
            return Err(Error::InvalidData(format!(
                "{} rows cannot be restored",
                E::TABLE
            )));
        }
        if self.find_with_deleted(id)?.is_none() {
            return Err(Error::NotFound);
        }
        let mut changes = Row::new();
        changes.insert(DELETED_AT.to_string(), Value::Null);
        from_row(self.store.update(E::TABLE, id, changes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Board, Ride, User};

    #[test]
    fn test_scoped_filters_only_paranoid_entities() {
        let users = Repository::<crate::storage::EmbeddedStore, User>::scoped(RowQuery::new());
        assert_eq!(
            users.predicates,
            vec![Predicate::IsNull("deletedAt".to_string())]
        );

        let boards =
            Repository::<crate::storage::EmbeddedStore, Board>::scoped(RowQuery::new().eq("id", 1));
        assert_eq!(boards.predicates.len(), 2);

        let rides = Repository::<crate::storage::EmbeddedStore, Ride>::scoped(RowQuery::new());
        assert!(rides.predicates.is_empty());
    }
}
