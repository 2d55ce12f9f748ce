//! Typed model layer.
//!
//! Each entity is a plain serde struct bound to one table. An [`Entity`] declares its
//! table definition, capabilities (paranoid soft delete, timestamps) and its public
//! serialized form. [`Repository`] implements the per-entity operations over any
//! [`crate::storage::RowStore`], and [`associations`] provides the join helpers.
//!
//! The tables declared here must equal the cumulative effect of every migration step; see
//! [`schema_catalog`].

pub mod associations;
pub mod entities;
pub mod geo;
mod repository;

pub use entities::{
    Board, BoardType, Breadcrumb, City, CitySubscription, DailyAverage, Event,
    EventRegistration, MessageInteraction, Mileage, Platform, PurchaseLocation, PushToken,
    RefreshToken, Ride, Role, Spot, SpotType, SubscriptionArn, User,
};
pub use geo::{Coordinates, GeoError, Geography};
pub use repository::Repository;

use crate::catalog::{EnumTypeDef, Schema, TableDef};
use crate::error::Error;
use crate::storage::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed row of one table.
pub trait Entity: Serialize + DeserializeOwned + Clone {
    /// Table name.
    const TABLE: &'static str;

    /// Soft delete through `deletedAt` instead of removing rows.
    const PARANOID: bool = false;

    /// Maintain `createdAt` / `updatedAt`.
    const TIMESTAMPS: bool = true;

    /// The table as the current schema declares it.
    fn table_def() -> TableDef;

    /// Enum types the table's columns use.
    fn enum_types() -> Vec<EnumTypeDef> {
        Vec::new()
    }

    /// Primary key, `None` before the first insert.
    fn id(&self) -> Option<i64>;

    /// Public serialized form handed to API consumers.
    fn to_json(&self) -> Result<Value, Error> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Serialize an entity into a stored row.
pub(crate) fn to_row<E: Entity>(entity: &E) -> Result<Row, Error> {
    match serde_json::to_value(entity)? {
        Value::Object(row) => Ok(row),
        other => Err(Error::Serialization(format!(
            "{} did not serialize to an object: {other}",
            E::TABLE
        ))),
    }
}

/// Deserialize a stored row into an entity.
pub(crate) fn from_row<E: Entity>(row: Row) -> Result<E, Error> {
    serde_json::from_value(Value::Object(row)).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Replace stored geography values in a serialized entity with `[longitude, latitude]`.
pub(crate) fn expose_coordinates(mut value: Value, columns: &[&str]) -> Result<Value, Error> {
    if let Value::Object(map) = &mut value {
        for column in columns {
            let pair = match map.get(*column) {
                Some(Value::String(stored)) => geo::decode(stored)?.to_pair(),
                _ => continue,
            };
            map.insert((*column).to_string(), serde_json::to_value(pair)?);
        }
    }
    Ok(value)
}

fn add_entity<E: Entity>(schema: Schema) -> Schema {
    E::enum_types()
        .into_iter()
        .fold(schema.with_table(E::table_def()), Schema::with_enum)
}

/// The current target schema as declared by the entities.
pub fn schema_catalog() -> Schema {
    let schema = Schema::new();
    let schema = add_entity::<User>(schema);
    let schema = add_entity::<Board>(schema);
    let schema = add_entity::<Ride>(schema);
    let schema = add_entity::<Breadcrumb>(schema);
    let schema = add_entity::<Mileage>(schema);
    let schema = add_entity::<DailyAverage>(schema);
    let schema = add_entity::<RefreshToken>(schema);
    let schema = add_entity::<PushToken>(schema);
    let schema = add_entity::<SubscriptionArn>(schema);
    let schema = add_entity::<Spot>(schema);
    let schema = add_entity::<City>(schema);
    let schema = add_entity::<CitySubscription>(schema);
    let schema = add_entity::<Event>(schema);
    let schema = add_entity::<EventRegistration>(schema);
    add_entity::<MessageInteraction>(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{cumulative_schema, steps};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_matches_migrations() {
        let migrated = cumulative_schema(steps::all()).unwrap();
        assert_eq!(schema_catalog().normalized(), migrated.normalized());
    }

    #[test]
    fn test_paranoid_flags_match_tables() {
        fn check<E: Entity>() {
            assert_eq!(E::PARANOID, E::table_def().is_paranoid(), "{}", E::TABLE);
            assert_eq!(E::table_def().name, E::TABLE);
        }
        check::<User>();
        check::<Board>();
        check::<Ride>();
        check::<Breadcrumb>();
        check::<Mileage>();
        check::<DailyAverage>();
        check::<RefreshToken>();
        check::<PushToken>();
        check::<SubscriptionArn>();
        check::<Spot>();
        check::<City>();
        check::<CitySubscription>();
        check::<Event>();
        check::<EventRegistration>();
        check::<MessageInteraction>();
    }

    #[test]
    fn test_catalog_is_buildable() {
        let mut rebuilt = Schema::new();
        for def in schema_catalog().enums.values() {
            rebuilt
                .apply(&crate::catalog::SchemaOp::CreateEnum(def.clone()))
                .unwrap();
        }
        for table in schema_catalog().tables_in_dependency_order() {
            rebuilt
                .apply(&crate::catalog::SchemaOp::CreateTable(table.clone()))
                .unwrap();
        }
        assert_eq!(rebuilt, schema_catalog());
    }
}
