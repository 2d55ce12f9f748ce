//! Core error types.

use thiserror::Error;

use crate::model::geo::GeoError;

/// Core errors shared by the catalog, storage and model layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// PostgreSQL driver error.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A schema operation cannot be applied to the current schema.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    /// A row violates a declared constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[from] ConstraintError),

    /// Geography value could not be encoded or decoded.
    #[error("geography error: {0}")]
    Geo(#[from] GeoError),

    /// Record not found.
    #[error("record not found")]
    NotFound,

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Shorthand for building a schema conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Error::SchemaConflict(message.into())
    }

    /// Check if this error is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::ConstraintViolation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Row-level constraint violations surfaced to callers as typed validation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    /// A unique constraint already holds this value.
    #[error("unique constraint {constraint} on {table} violated by value {value}")]
    UniqueViolation {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
        /// Constrained columns.
        columns: Vec<String>,
        /// Offending value(s).
        value: String,
    },

    /// A foreign key points at a missing row.
    #[error("foreign key {table}.{column} references missing {references_table} row {value}")]
    ForeignKeyViolation {
        /// Referencing table.
        table: String,
        /// Referencing column.
        column: String,
        /// Referenced table.
        references_table: String,
        /// Offending value.
        value: String,
    },

    /// A row cannot be removed because other rows still reference it.
    #[error("cannot delete {table} row {id}: still referenced by {referencing_table}")]
    RestrictViolation {
        /// Table of the row being deleted.
        table: String,
        /// Id of the row being deleted.
        id: i64,
        /// Table holding the references.
        referencing_table: String,
    },

    /// A NOT NULL column received no value.
    #[error("column {table}.{column} cannot be null")]
    NotNullViolation {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A value does not fit the column type or enum vocabulary.
    #[error("invalid value for {table}.{column}: {reason}")]
    InvalidValue {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// What was wrong with the value.
        reason: String,
    },
}

impl ConstraintError {
    /// Table the violation was raised on.
    pub fn table(&self) -> &str {
        match self {
            ConstraintError::UniqueViolation { table, .. }
            | ConstraintError::ForeignKeyViolation { table, .. }
            | ConstraintError::RestrictViolation { table, .. }
            | ConstraintError::NotNullViolation { table, .. }
            | ConstraintError::InvalidValue { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_display() {
        let err = ConstraintError::UniqueViolation {
            table: "boards".into(),
            constraint: "boards_serial_key".into(),
            columns: vec!["serial".into()],
            value: "BB-0001".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("boards_serial_key"));
        assert!(msg.contains("on boards"));
        assert!(msg.contains("BB-0001"));
    }

    #[test]
    fn test_constraint_error_converts() {
        let err: Error = ConstraintError::NotNullViolation {
            table: "users".into(),
            column: "email".into(),
        }
        .into();
        assert!(err.is_constraint_violation());
        assert!(!Error::NotFound.is_constraint_violation());
    }
}
