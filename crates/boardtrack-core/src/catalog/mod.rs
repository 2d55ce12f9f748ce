//! Schema catalog for boardtrack.
//!
//! The catalog describes tables, columns, enum types, unique constraints, indexes and
//! foreign-key actions. Migration steps mutate a [`Schema`] through [`SchemaOp`]s, and the
//! model layer declares the same structures for the current target schema.

mod column;
mod op;
mod relation;
mod schema;
mod table;
mod types;

pub mod sql;

pub use column::{ColumnDef, DefaultValue};
pub use op::SchemaOp;
pub use relation::{DeleteBehavior, ForeignKey};
pub use schema::Schema;
pub use table::{IndexDef, TableDef, UniqueDef};
pub use types::{ColumnType, EnumTypeDef, IndexMethod, GEOGRAPHY_SRID};
