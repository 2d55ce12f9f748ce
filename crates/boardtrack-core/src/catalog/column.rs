//! Column definitions for tables.

use super::relation::{DeleteBehavior, ForeignKey};
use super::types::ColumnType;
use serde::{Deserialize, Serialize};

/// A column definition within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the column carries its own unique constraint.
    pub unique: bool,
    /// Whether this is the primary key.
    pub primary_key: bool,
    /// Default value if not provided on insert.
    pub default: Option<DefaultValue>,
    /// Foreign key this column holds, if any.
    pub references: Option<ForeignKey>,
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String or enum literal.
    Text(String),
    /// Current timestamp (evaluated at insert time).
    CurrentTimestamp,
}

impl ColumnDef {
    /// Create a new nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            unique: false,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    /// The conventional auto-incrementing `id` primary key.
    pub fn id() -> Self {
        Self::new("id", ColumnType::Serial).primary_key()
    }

    /// The `createdAt` / `updatedAt` pair every timestamped table carries.
    pub fn timestamps() -> [ColumnDef; 2] {
        [
            Self::new("createdAt", ColumnType::Timestamp).not_null(),
            Self::new("updatedAt", ColumnType::Timestamp).not_null(),
        ]
    }

    /// The paranoid soft-delete marker.
    pub fn deleted_at() -> Self {
        Self::new("deletedAt", ColumnType::Timestamp)
    }

    /// A nullable foreign key column referencing `table.id`.
    pub fn foreign_key(
        name: impl Into<String>,
        table: impl Into<String>,
        on_delete: DeleteBehavior,
    ) -> Self {
        Self::new(name, ColumnType::Integer).references(ForeignKey::to_id(table, on_delete))
    }

    /// Disallow NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Add a column-level unique constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the foreign key.
    pub fn references(mut self, fk: ForeignKey) -> Self {
        self.references = Some(fk);
        self
    }

    /// Check if this column has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some() || self.column_type == ColumnType::Serial
    }
}
