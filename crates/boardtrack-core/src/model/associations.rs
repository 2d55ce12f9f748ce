//! Association graph between entities.
//!
//! Associations are declarations over foreign keys the catalog already holds; traversal is a
//! plain query against the child or join table. Reads go through [`Repository`], so
//! soft-deleted targets are skipped.

use super::{
    Board, City, CitySubscription, Entity, Event, EventRegistration, MessageInteraction,
    PushToken, Repository, User,
};
use crate::catalog::Schema;
use crate::error::Error;
use crate::storage::{Predicate, RowQuery, RowStore};
use serde_json::Value;

/// One edge of the association graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// `from.foreign_key` references `to.id`.
    BelongsTo {
        from: &'static str,
        foreign_key: &'static str,
        to: &'static str,
    },
    /// Rows of `child` whose `foreign_key` references `owner.id`.
    HasMany {
        owner: &'static str,
        child: &'static str,
        foreign_key: &'static str,
    },
    /// `from` reaches `to` through rows of the join table `through`.
    ManyToMany {
        from: &'static str,
        through: &'static str,
        source_key: &'static str,
        target_key: &'static str,
        to: &'static str,
    },
}

impl Association {
    /// `(table, column, referenced table)` for each foreign key this edge relies on.
    pub fn foreign_keys(&self) -> Vec<(&'static str, &'static str, &'static str)> {
        match *self {
            Association::BelongsTo {
                from,
                foreign_key,
                to,
            } => vec![(from, foreign_key, to)],
            Association::HasMany {
                owner,
                child,
                foreign_key,
            } => vec![(child, foreign_key, owner)],
            Association::ManyToMany {
                from,
                through,
                source_key,
                target_key,
                to,
            } => vec![(through, source_key, from), (through, target_key, to)],
        }
    }
}

const fn has_many(
    owner: &'static str,
    child: &'static str,
    foreign_key: &'static str,
) -> Association {
    Association::HasMany {
        owner,
        child,
        foreign_key,
    }
}

const fn belongs_to(
    from: &'static str,
    foreign_key: &'static str,
    to: &'static str,
) -> Association {
    Association::BelongsTo {
        from,
        foreign_key,
        to,
    }
}

/// Every declared association.
pub const ASSOCIATIONS: &[Association] = &[
    has_many("users", "boards", "userId"),
    has_many("users", "rides", "userId"),
    has_many("users", "mileages", "userId"),
    has_many("users", "refreshTokens", "userId"),
    has_many("users", "pushTokens", "userId"),
    has_many("users", "eventRegistrations", "userId"),
    has_many("users", "subscriptionArns", "userId"),
    has_many("users", "spots", "userId"),
    Association::ManyToMany {
        from: "users",
        through: "citySubscriptions",
        source_key: "userId",
        target_key: "cityId",
        to: "cities",
    },
    Association::ManyToMany {
        from: "users",
        through: "messageInteractions",
        source_key: "userId",
        target_key: "eventId",
        to: "events",
    },
    belongs_to("boards", "userId", "users"),
    has_many("boards", "rides", "boardId"),
    belongs_to("rides", "userId", "users"),
    belongs_to("rides", "boardId", "boards"),
    has_many("rides", "breadcrumbs", "rideId"),
    belongs_to("breadcrumbs", "rideId", "rides"),
    has_many("mileages", "dailyAverages", "mileageId"),
    belongs_to("dailyAverages", "mileageId", "mileages"),
    belongs_to("spots", "userId", "users"),
    has_many("cities", "events", "cityId"),
    Association::ManyToMany {
        from: "cities",
        through: "citySubscriptions",
        source_key: "cityId",
        target_key: "userId",
        to: "users",
    },
    belongs_to("events", "cityId", "cities"),
    has_many("events", "eventRegistrations", "eventId"),
    Association::ManyToMany {
        from: "events",
        through: "messageInteractions",
        source_key: "eventId",
        target_key: "userId",
        to: "users",
    },
    belongs_to("eventRegistrations", "eventId", "events"),
    belongs_to("eventRegistrations", "userId", "users"),
];

/// Check every declared association against the foreign keys of a schema.
pub fn verify(schema: &Schema) -> Result<(), Error> {
    for association in ASSOCIATIONS {
        for (table, column, target) in association.foreign_keys() {
            let references = schema
                .table(table)
                .and_then(|t| t.column(column))
                .and_then(|c| c.references.as_ref());
            match references {
                Some(fk) if fk.table == target && fk.column == "id" => {}
                _ => {
                    return Err(Error::InvalidData(format!(
                        "association {table}.{column} -> {target} has no matching foreign key"
                    )))
                }
            }
        }
    }
    Ok(())
}

/// Live children of `C` pointing at `owner_id` through `foreign_key`.
pub fn children<S, C>(
    store: &S,
    foreign_key: &str,
    owner_id: i64,
    query: RowQuery,
) -> Result<Vec<C>, Error>
where
    S: RowStore + ?Sized,
    C: Entity,
{
    Repository::<S, C>::new(store).list(query.eq(foreign_key, owner_id))
}

/// The live parent `P` a foreign key value points at.
pub fn parent<S, P>(store: &S, foreign_id: Option<i64>) -> Result<Option<P>, Error>
where
    S: RowStore + ?Sized,
    P: Entity,
{
    match foreign_id {
        Some(id) => Repository::<S, P>::new(store).find(id),
        None => Ok(None),
    }
}

/// Live targets `T` reached from `source_id` through join table `J`.
pub fn through<S, J, T>(
    store: &S,
    source_key: &str,
    source_id: i64,
    target_key: &str,
) -> Result<Vec<T>, Error>
where
    S: RowStore + ?Sized,
    J: Entity,
    T: Entity,
{
    let links = store.select(J::TABLE, &RowQuery::new().eq(source_key, source_id))?;
    let ids: Vec<Value> = links
        .into_iter()
        .filter_map(|mut row| row.remove(target_key))
        .filter(|id| !id.is_null())
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Repository::<S, T>::new(store).list(RowQuery::new().filter(Predicate::In("id".into(), ids)))
}

/// A user's boards.
pub fn boards_of<S: RowStore + ?Sized>(store: &S, user: &User) -> Result<Vec<Board>, Error> {
    match user.id {
        Some(id) => children(store, "userId", id, RowQuery::new()),
        None => Ok(Vec::new()),
    }
}

/// The owner of a board, if it still has a live one.
pub fn owner_of<S: RowStore + ?Sized>(store: &S, board: &Board) -> Result<Option<User>, Error> {
    parent(store, board.user_id)
}

/// Every device a user registered for push notifications.
pub fn push_tokens_of<S: RowStore + ?Sized>(
    store: &S,
    user: &User,
) -> Result<Vec<PushToken>, Error> {
    match user.id {
        Some(id) => children(store, "userId", id, RowQuery::new()),
        None => Ok(Vec::new()),
    }
}

/// Registrations for an event.
pub fn registrations_of<S: RowStore + ?Sized>(
    store: &S,
    event: &Event,
) -> Result<Vec<EventRegistration>, Error> {
    match event.id {
        Some(id) => children(store, "eventId", id, RowQuery::new()),
        None => Ok(Vec::new()),
    }
}

/// Cities a user follows.
pub fn cities_of<S: RowStore + ?Sized>(store: &S, user: &User) -> Result<Vec<City>, Error> {
    match user.id {
        Some(id) => through::<S, CitySubscription, City>(store, "userId", id, "cityId"),
        None => Ok(Vec::new()),
    }
}

/// Live users who were messaged about an event.
pub fn messaged_users_of<S: RowStore + ?Sized>(
    store: &S,
    event: &Event,
) -> Result<Vec<User>, Error> {
    match event.id {
        Some(id) => through::<S, MessageInteraction, User>(store, "eventId", id, "userId"),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema_catalog;

    #[test]
    fn test_declarations_follow_foreign_keys() {
        verify(&schema_catalog()).unwrap();
    }

    #[test]
    fn test_verify_rejects_missing_key() {
        let mut schema = schema_catalog();
        schema.tables.remove("citySubscriptions");
        assert!(verify(&schema).is_err());
    }

    #[test]
    fn test_many_to_many_uses_both_keys() {
        let keys = ASSOCIATIONS
            .iter()
            .find(|a| matches!(a, Association::ManyToMany { through: "citySubscriptions", from: "users", .. }))
            .map(Association::foreign_keys)
            .unwrap();
        assert_eq!(
            keys,
            vec![
                ("citySubscriptions", "userId", "users"),
                ("citySubscriptions", "cityId", "cities")
            ]
        );
    }
}
