//! Foreign key definitions between tables.

use serde::{Deserialize, Serialize};

/// Behavior when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteBehavior {
    /// Delete referencing rows.
    Cascade,
    /// Set the referencing column to null.
    SetNull,
    /// Prevent deletion while referencing rows exist.
    Restrict,
}

impl DeleteBehavior {
    /// SQL keyword for the `ON DELETE` clause.
    pub fn as_sql(&self) -> &'static str {
        match self {
            DeleteBehavior::Cascade => "CASCADE",
            DeleteBehavior::SetNull => "SET NULL",
            DeleteBehavior::Restrict => "RESTRICT",
        }
    }
}

/// A column-level foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced column (usually `id`).
    pub column: String,
    /// Delete behavior.
    pub on_delete: DeleteBehavior,
}

impl ForeignKey {
    /// Reference the `id` column of a table.
    pub fn to_id(table: impl Into<String>, on_delete: DeleteBehavior) -> Self {
        Self {
            table: table.into(),
            column: "id".to_string(),
            on_delete,
        }
    }
}
