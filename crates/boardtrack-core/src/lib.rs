//! Boardtrack Core - schema migrations, catalog and model layer.
//!
//! This crate provides the persistence layer of the boardtrack backend: the versioned schema
//! history with its migration engine, the schema catalog both sides describe, the typed
//! entities with soft delete and geography marshaling, and the stores they run against.

pub mod catalog;
pub mod error;
pub mod migration;
pub mod model;
pub mod storage;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use catalog::{
    ColumnDef, ColumnType, DefaultValue, DeleteBehavior, EnumTypeDef, ForeignKey, IndexMethod,
    Schema, SchemaOp, TableDef,
};
pub use error::{ConstraintError, Error};
pub use migration::{
    DownTarget, MigrationConfig, MigrationEngine, MigrationError, MigrationReport,
    MigrationStatus, MigrationStep, MigrationWarning,
};
pub use model::{schema_catalog, Coordinates, Entity, GeoError, Geography, Repository};
pub use storage::{EmbeddedStore, Predicate, Row, RowQuery, RowStore, StoreConfig};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
