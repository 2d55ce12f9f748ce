//! PostgreSQL/PostGIS backend.
//!
//! Enabled with the `postgres` feature. [`PostgresStore`] implements the schema backend the
//! migration engine drives (advisory lock, ledger table, transactional DDL) and the row store
//! the model layer reads and writes through.

mod backend;
mod rows;

pub use backend::{PostgresStore, PostgresTransaction};
