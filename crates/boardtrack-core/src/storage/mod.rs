//! Row storage.
//!
//! Rows are JSON objects keyed by column name. A [`RowStore`] executes inserts, reads,
//! updates and physical deletes against one backend; soft-delete semantics live in the model
//! layer on top of it.

mod config;
mod embedded;
mod query;
mod state;

pub use config::StoreConfig;
pub use embedded::{EmbeddedStore, EmbeddedTransaction};
pub use query::{compare_values, Predicate, RowQuery, SortDirection};
pub use state::{timestamp_value, Changes, DatabaseState, TableRows};

use crate::error::Error;

/// A stored row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Row-level access to one database.
pub trait RowStore {
    /// Insert a row, filling defaults and serial ids. Returns the stored row.
    fn insert(&self, table: &str, row: Row) -> Result<Row, Error>;

    /// Rows matching a query.
    fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, Error>;

    /// Overwrite the given columns of one row. Returns the stored row.
    fn update(&self, table: &str, id: i64, changes: Row) -> Result<Row, Error>;

    /// Physically delete one row, applying foreign key delete actions.
    fn delete(&self, table: &str, id: i64) -> Result<(), Error>;

    /// Number of rows matching a query's predicates.
    fn count(&self, table: &str, query: &RowQuery) -> Result<usize, Error>;

    /// First row matching a query.
    fn select_one(&self, table: &str, query: &RowQuery) -> Result<Option<Row>, Error> {
        let query = query.clone().limit(1);
        Ok(self.select(table, &query)?.into_iter().next())
    }
}
