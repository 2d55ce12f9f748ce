//! Schema operations emitted by migration steps.

use super::column::ColumnDef;
use super::table::{IndexDef, TableDef, UniqueDef};
use super::types::EnumTypeDef;
use serde::{Deserialize, Serialize};

/// One schema change. Every operation applies to the structural [`super::Schema`] model
/// and renders to PostgreSQL through [`super::sql::render_op`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaOp {
    /// Create a named enum type.
    CreateEnum(EnumTypeDef),
    /// Drop a named enum type.
    DropEnum {
        /// Enum type name.
        name: String,
    },
    /// Create a table.
    CreateTable(TableDef),
    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
    },
    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },
    /// Remove a column.
    RemoveColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Current column name.
        from: String,
        /// New column name.
        to: String,
    },
    /// Add a named unique constraint.
    AddUnique {
        /// Table name.
        table: String,
        /// Constraint definition.
        unique: UniqueDef,
    },
    /// Remove a named unique constraint.
    RemoveUnique {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// Add a secondary index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: IndexDef,
    },
    /// Remove a secondary index.
    RemoveIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// Physically delete every row whose `column` is not null.
    PurgeRows {
        /// Table name.
        table: String,
        /// Marker column, usually `deletedAt`.
        column: String,
    },
}

impl SchemaOp {
    /// Enum type operations run outside the step transaction.
    pub fn is_enum_op(&self) -> bool {
        matches!(self, SchemaOp::CreateEnum(_) | SchemaOp::DropEnum { .. })
    }

    /// Whether this operation destroys row data that no later operation can restore.
    pub fn destroys_data(&self) -> bool {
        matches!(
            self,
            SchemaOp::PurgeRows { .. }
                | SchemaOp::DropTable { .. }
                | SchemaOp::RemoveColumn { .. }
        )
    }

    /// Table this operation targets, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            SchemaOp::CreateEnum(_) | SchemaOp::DropEnum { .. } => None,
            SchemaOp::CreateTable(def) => Some(&def.name),
            SchemaOp::DropTable { name } => Some(name),
            SchemaOp::AddColumn { table, .. }
            | SchemaOp::RemoveColumn { table, .. }
            | SchemaOp::RenameColumn { table, .. }
            | SchemaOp::AddUnique { table, .. }
            | SchemaOp::RemoveUnique { table, .. }
            | SchemaOp::AddIndex { table, .. }
            | SchemaOp::RemoveIndex { table, .. }
            | SchemaOp::PurgeRows { table, .. } => Some(table),
        }
    }
}

impl std::fmt::Display for SchemaOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaOp::CreateEnum(def) => write!(f, "create enum {}", def.name),
            SchemaOp::DropEnum { name } => write!(f, "drop enum {name}"),
            SchemaOp::CreateTable(def) => write!(f, "create table {}", def.name),
            SchemaOp::DropTable { name } => write!(f, "drop table {name}"),
            SchemaOp::AddColumn { table, column } => {
                write!(f, "add column {table}.{}", column.name)
            }
            SchemaOp::RemoveColumn { table, column } => write!(f, "remove column {table}.{column}"),
            SchemaOp::RenameColumn { table, from, to } => {
                write!(f, "rename column {table}.{from} to {to}")
            }
            SchemaOp::AddUnique { table, unique } => {
                write!(f, "add unique {} on {table}", unique.name)
            }
            SchemaOp::RemoveUnique { table, name } => write!(f, "remove unique {name} on {table}"),
            SchemaOp::AddIndex { table, index } => write!(f, "add index {} on {table}", index.name),
            SchemaOp::RemoveIndex { table, name } => write!(f, "remove index {name} on {table}"),
            SchemaOp::PurgeRows { table, column } => {
                write!(f, "purge {table} rows where {column} is set")
            }
        }
    }
}
