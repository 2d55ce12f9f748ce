//! PostgreSQL store.

use super::rows::{self, Statement};
use crate::catalog::sql::{quote_ident, render_op};
use crate::catalog::{Schema, SchemaOp, TableDef};
use crate::error::{ConstraintError, Error};
use crate::migration::{
    LedgerEntry, MigrationConfig, MigrationLedger, SchemaBackend, SchemaTransaction,
};
use crate::model::schema_catalog;
use crate::storage::{Row, RowQuery, RowStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row as _, Transaction};
use tokio::runtime::Runtime;
use tracing::debug;

/// PostgreSQL/PostGIS database driven through a blocking facade.
///
/// The store owns a Tokio runtime and blocks on every query, so the engine and the model
/// layer stay synchronous. The migration lock is a session-level advisory lock held on one
/// pooled connection until [`SchemaBackend::unlock`].
pub struct PostgresStore {
    pool: PgPool,
    rt: Runtime,
    ledger_table: String,
    lock_key: i64,
    lock_conn: Mutex<Option<PoolConnection<Postgres>>>,
    schema: Schema,
}

impl PostgresStore {
    /// Connect and make sure PostGIS and the ledger table exist.
    pub fn connect(database_url: &str, config: &MigrationConfig) -> Result<Self, Error> {
        let rt = Runtime::new()
            .map_err(|e| Error::Transaction(format!("failed to start runtime: {e}")))?;
        let pool = rt.block_on(
            PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url),
        )?;

        let store = Self {
            pool,
            rt,
            ledger_table: config.ledger_table.clone(),
            lock_key: config.lock_key,
            lock_conn: Mutex::new(None),
            schema: schema_catalog(),
        };
        store.ensure_ledger()?;
        debug!(ledger = %store.ledger_table, "Connected to PostgreSQL");
        Ok(store)
    }

    fn ensure_ledger(&self) -> Result<(), Error> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             \"version\" VARCHAR(14) PRIMARY KEY, \
             \"name\" VARCHAR(255) NOT NULL, \
             \"checksum\" VARCHAR(64) NOT NULL, \
             \"appliedAt\" TIMESTAMP WITH TIME ZONE NOT NULL)",
            quote_ident(&self.ledger_table)
        );
        self.rt.block_on(async {
            sqlx::query("CREATE EXTENSION IF NOT EXISTS postgis")
                .execute(&self.pool)
                .await?;
            sqlx::query(&create).execute(&self.pool).await?;
            Ok::<(), sqlx::Error>(())
        })?;
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&TableDef, Error> {
        self.schema
            .table(name)
            .ok_or_else(|| Error::InvalidData(format!("relation {name} does not exist")))
    }

    fn fetch(&self, table: &str, stmt: &Statement) -> Result<Vec<Row>, Error> {
        let rows = self
            .rt
            .block_on(async {
                let mut query = sqlx::query(&stmt.sql);
                for param in &stmt.params {
                    query = query.bind(param.clone());
                }
                query.fetch_all(&self.pool).await
            })
            .map_err(|e| rows::row_error(table, e))?;
        rows.iter().map(decode_row).collect()
    }

    fn fetch_one(&self, table: &str, stmt: &Statement) -> Result<Row, Error> {
        self.fetch(table, stmt)?.into_iter().next().ok_or(Error::NotFound)
    }
}

fn decode_row(row: &PgRow) -> Result<Row, Error> {
    match row.try_get::<Value, _>("row")? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Deserialization(format!("expected a row object, got {other}"))),
    }
}

impl RowStore for PostgresStore {
    fn insert(&self, table: &str, row: Row) -> Result<Row, Error> {
        let stmt = rows::insert(self.table(table)?, row)?;
        self.fetch_one(table, &stmt)
    }

    fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, Error> {
        let stmt = rows::select(self.table(table)?, query)?;
        self.fetch(table, &stmt)
    }

    fn update(&self, table: &str, id: i64, changes: Row) -> Result<Row, Error> {
        let stmt = rows::update(self.table(table)?, id, changes)?;
        self.fetch_one(table, &stmt)
    }

    fn delete(&self, table: &str, id: i64) -> Result<(), Error> {
        let sql = rows::delete(self.table(table)?);
        let result = self
            .rt
            .block_on(sqlx::query(&sql).bind(id).execute(&self.pool))
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.code().as_deref() == Some("23503") {
                        return ConstraintError::RestrictViolation {
                            table: table.to_string(),
                            id,
                            referencing_table: db.table().unwrap_or_default().to_string(),
                        }
                        .into();
                    }
                }
                rows::row_error(table, e)
            })?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn count(&self, table: &str, query: &RowQuery) -> Result<usize, Error> {
        let stmt = rows::count(self.table(table)?, query)?;
        let count: i64 = self
            .rt
            .block_on(async {
                let mut query = sqlx::query_scalar::<_, i64>(&stmt.sql);
                for param in &stmt.params {
                    query = query.bind(param.clone());
                }
                query.fetch_one(&self.pool).await
            })
            .map_err(|e| rows::row_error(table, e))?;
        usize::try_from(count).map_err(|e| Error::InvalidData(e.to_string()))
    }
}

impl SchemaBackend for PostgresStore {
    type Tx<'a> = PostgresTransaction<'a>;

    fn try_lock(&self) -> Result<bool, Error> {
        let mut held = self.lock_conn.lock();
        if held.is_some() {
            return Ok(false);
        }
        let mut conn = self.rt.block_on(self.pool.acquire())?;
        let locked: bool = self.rt.block_on(
            sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
                .bind(self.lock_key)
                .fetch_one(&mut *conn),
        )?;
        if locked {
            *held = Some(conn);
        }
        Ok(locked)
    }

    fn unlock(&self) -> Result<(), Error> {
        if let Some(mut conn) = self.lock_conn.lock().take() {
            self.rt.block_on(
                sqlx::query("SELECT pg_advisory_unlock($1)")
                    .bind(self.lock_key)
                    .execute(&mut *conn),
            )?;
        }
        Ok(())
    }

    fn begin(&self) -> Result<PostgresTransaction<'_>, Error> {
        let mut tx = self.rt.block_on(self.pool.begin())?;
        let select = format!(
            "SELECT \"version\", \"name\", \"checksum\", \"appliedAt\" FROM {} ORDER BY \"version\"",
            quote_ident(&self.ledger_table)
        );
        let rows = self
            .rt
            .block_on(sqlx::query(&select).fetch_all(&mut *tx))?;
        let ledger = rows
            .iter()
            .map(|row| -> Result<LedgerEntry, sqlx::Error> {
                Ok(LedgerEntry {
                    version: row.try_get("version")?,
                    name: row.try_get("name")?,
                    checksum: row.try_get("checksum")?,
                    applied_at: row.try_get::<DateTime<Utc>, _>("appliedAt")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(PostgresTransaction {
            store: self,
            tx,
            ledger,
        })
    }

    fn execute(&self, op: &SchemaOp) -> Result<(), Error> {
        for statement in render_op(op) {
            self.rt
                .block_on(sqlx::query(&statement).execute(&self.pool))
                .map_err(rows::ddl_error)?;
        }
        Ok(())
    }
}

/// An open PostgreSQL transaction carrying DDL and ledger writes.
pub struct PostgresTransaction<'a> {
    store: &'a PostgresStore,
    tx: Transaction<'static, Postgres>,
    ledger: Vec<LedgerEntry>,
}

impl MigrationLedger for PostgresTransaction<'_> {
    fn applied_versions(&self) -> Result<Vec<LedgerEntry>, Error> {
        Ok(self.ledger.clone())
    }

    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), Error> {
        let insert = format!(
            "INSERT INTO {} (\"version\", \"name\", \"checksum\", \"appliedAt\") VALUES ($1, $2, $3, $4)",
            quote_ident(&self.store.ledger_table)
        );
        self.store.rt.block_on(
            sqlx::query(&insert)
                .bind(&entry.version)
                .bind(&entry.name)
                .bind(&entry.checksum)
                .bind(entry.applied_at)
                .execute(&mut *self.tx),
        )?;
        self.ledger.push(entry.clone());
        Ok(())
    }

    fn record_reverted(&mut self, version: &str) -> Result<(), Error> {
        let delete = format!(
            "DELETE FROM {} WHERE \"version\" = $1",
            quote_ident(&self.store.ledger_table)
        );
        let result = self
            .store
            .rt
            .block_on(sqlx::query(&delete).bind(version).execute(&mut *self.tx))?;
        if result.rows_affected() == 0 {
            return Err(Error::Transaction(format!("version {version} is not recorded")));
        }
        self.ledger.retain(|e| e.version != version);
        Ok(())
    }
}

impl SchemaTransaction for PostgresTransaction<'_> {
    fn execute(&mut self, op: &SchemaOp) -> Result<(), Error> {
        for statement in render_op(op) {
            self.store
                .rt
                .block_on(sqlx::query(&statement).execute(&mut *self.tx))
                .map_err(rows::ddl_error)?;
        }
        Ok(())
    }

    fn commit(self) -> Result<(), Error> {
        self.store.rt.block_on(self.tx.commit())?;
        Ok(())
    }

    fn rollback(self) -> Result<(), Error> {
        self.store.rt.block_on(self.tx.rollback())?;
        Ok(())
    }
}
