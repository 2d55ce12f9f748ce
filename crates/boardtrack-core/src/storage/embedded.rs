//! Embedded sled-backed store.
//!
//! Implements both the schema backend driven by the migration engine and the row store used
//! by the model layer, so the whole system runs without a PostgreSQL server.
//!
//! Layout:
//! - `catalog`: the schema under `schema`, and each table's next serial id under
//!   `seq\0<table>` (big-endian `i64`).
//! - `rows`: one entry per row keyed by `<table>\0<id>` (big-endian `i64`).
//! - `schema_migrations`: ledger entries keyed by version.
//!
//! The whole database is loaded into a [`DatabaseState`] on open. Each write or transaction
//! persists only the keys it touched, in one sled transaction across the three trees.

use super::query::RowQuery;
use super::state::{Changes, DatabaseState, TableRows};
use super::{Row, RowStore, StoreConfig};
use crate::catalog::{Schema, SchemaOp};
use crate::error::Error;
use crate::migration::{LedgerEntry, MigrationLedger, SchemaBackend, SchemaTransaction};
use parking_lot::{RwLock, RwLockWriteGuard};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Tree name for the schema and table sequences.
const CATALOG_TREE: &str = "catalog";

/// Tree name for row data.
const ROWS_TREE: &str = "rows";

/// Tree name for the migration ledger.
const LEDGER_TREE: &str = "schema_migrations";

/// Key of the schema within the catalog tree.
const SCHEMA_KEY: &[u8] = b"schema";

/// Prefix for table sequences in the catalog tree.
const SEQUENCE_PREFIX: &[u8] = b"seq\0";

fn sequence_key(table: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(SEQUENCE_PREFIX.len() + table.len());
    key.extend_from_slice(SEQUENCE_PREFIX);
    key.extend_from_slice(table.as_bytes());
    key
}

fn row_key(table: &str, id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 1 + 8);
    key.extend_from_slice(table.as_bytes());
    key.push(0); // Null separator
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn decode_row_key(key: &[u8]) -> Result<(String, i64), Error> {
    let invalid = || Error::Deserialization(format!("invalid row key {}", hex::encode(key)));
    let split = key.iter().position(|b| *b == 0).ok_or_else(invalid)?;
    let table = std::str::from_utf8(&key[..split]).map_err(|_| invalid())?;
    let id: [u8; 8] = key[split + 1..].try_into().map_err(|_| invalid())?;
    Ok((table.to_string(), i64::from_be_bytes(id)))
}

fn decode_sequence(key: &[u8], value: &[u8]) -> Result<(String, i64), Error> {
    let invalid = || Error::Deserialization(format!("invalid sequence {}", hex::encode(key)));
    let table = std::str::from_utf8(&key[SEQUENCE_PREFIX.len()..]).map_err(|_| invalid())?;
    let next_id: [u8; 8] = value.try_into().map_err(|_| invalid())?;
    Ok((table.to_string(), i64::from_be_bytes(next_id)))
}

/// Encoded key writes for one commit; `None` removes the key.
#[derive(Default)]
struct KeyWrites {
    catalog: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    rows: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    ledger: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl KeyWrites {
    fn from_changes(changes: &Changes<'_>) -> Result<Self, Error> {
        let mut writes = KeyWrites::default();
        if let Some(schema) = changes.schema {
            writes.catalog.push((SCHEMA_KEY.to_vec(), Some(serde_json::to_vec(schema)?)));
        }
        for (table, next_id) in &changes.sequences {
            let value = next_id.map(|n| n.to_be_bytes().to_vec());
            writes.catalog.push((sequence_key(table), value));
        }
        for (table, id, row) in &changes.rows {
            let value = row.map(serde_json::to_vec).transpose()?;
            writes.rows.push((row_key(table, *id), value));
        }
        Ok(writes)
    }

    fn is_empty(&self) -> bool {
        self.catalog.is_empty() && self.rows.is_empty() && self.ledger.is_empty()
    }
}

/// The embedded store wrapping sled.
pub struct EmbeddedStore {
    /// The underlying sled database.
    db: Db,

    /// Tree holding the schema and sequences.
    catalog_tree: Tree,

    /// Tree holding rows keyed by table and id.
    rows_tree: Tree,

    /// Tree holding ledger entries keyed by version.
    ledger_tree: Tree,

    /// Loaded schema and rows. The write lock serializes writers within this process.
    state: RwLock<DatabaseState>,

    /// Set while a migration run holds the lock.
    migrating: AtomicBool,

    flush_on_commit: bool,
}

impl EmbeddedStore {
    /// Open or create a store. sled's file lock keeps other processes out.
    pub fn open(config: StoreConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let catalog_tree = db.open_tree(CATALOG_TREE)?;
        let rows_tree = db.open_tree(ROWS_TREE)?;
        let ledger_tree = db.open_tree(LEDGER_TREE)?;
        let state = load_state(&catalog_tree, &rows_tree)?;
        debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            tables = state.tables.len(),
            "Opened embedded store"
        );

        Ok(Self {
            db,
            catalog_tree,
            rows_tree,
            ledger_tree,
            state: RwLock::new(state),
            migrating: AtomicBool::new(false),
            flush_on_commit: config.flush_on_commit,
        })
    }

    /// Open a temporary store, removed on drop.
    pub fn temporary() -> Result<Self, Error> {
        Self::open(StoreConfig::temporary())
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Snapshot of the current schema and rows.
    pub fn state(&self) -> Result<DatabaseState, Error> {
        Ok(self.state.read().clone())
    }

    fn ledger(&self) -> Result<BTreeMap<String, LedgerEntry>, Error> {
        let mut entries = BTreeMap::new();
        for item in self.ledger_tree.iter() {
            let (_, value) = item?;
            let entry: LedgerEntry = serde_json::from_slice(&value)
                .map_err(|e| Error::Deserialization(e.to_string()))?;
            entries.insert(entry.version.clone(), entry);
        }
        Ok(entries)
    }

    /// Run `f` against the loaded state and persist what it touched, or undo it on failure.
    fn write<T>(&self, f: impl FnOnce(&mut DatabaseState) -> Result<T, Error>) -> Result<T, Error> {
        let mut state = self.state.write();
        let result = f(&mut *state).and_then(|value| {
            let writes = KeyWrites::from_changes(&state.changes())?;
            self.persist(&writes)?;
            Ok(value)
        });
        if result.is_ok() {
            state.commit_changes();
        } else {
            state.rollback_changes();
        }
        result
    }

    /// Write encoded keys to all three trees atomically.
    fn persist(&self, writes: &KeyWrites) -> Result<(), Error> {
        if writes.is_empty() {
            return Ok(());
        }
        let result: Result<(), TransactionError<Error>> =
            (&self.catalog_tree, &self.rows_tree, &self.ledger_tree).transaction(
                |(catalog_tx, rows_tx, ledger_tx)| {
                    for (tx, keys) in [
                        (catalog_tx, &writes.catalog),
                        (rows_tx, &writes.rows),
                        (ledger_tx, &writes.ledger),
                    ] {
                        for (key, value) in keys {
                            match value {
                                Some(bytes) => {
                                    tx.insert(key.as_slice(), bytes.as_slice())?;
                                }
                                None => {
                                    tx.remove(key.as_slice())?;
                                }
                            }
                        }
                    }
                    Ok::<(), ConflictableTransactionError<Error>>(())
                },
            );

        match result {
            Ok(()) => self.flush(),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }

    fn flush(&self) -> Result<(), Error> {
        if self.flush_on_commit {
            self.db.flush()?;
        }
        Ok(())
    }
}

/// Read the schema, sequences and rows persisted by earlier commits.
fn load_state(catalog: &Tree, rows: &Tree) -> Result<DatabaseState, Error> {
    let schema = match catalog.get(SCHEMA_KEY)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))?,
        None => Schema::new(),
    };

    let mut tables: BTreeMap<String, TableRows> = BTreeMap::new();
    for item in catalog.scan_prefix(SEQUENCE_PREFIX) {
        let (key, value) = item?;
        let (table, next_id) = decode_sequence(&key, &value)?;
        tables.entry(table).or_default().next_id = next_id;
    }
    for item in rows.iter() {
        let (key, value) = item?;
        let (table, id) = decode_row_key(&key)?;
        let row: Row = serde_json::from_slice(&value)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        tables.entry(table).or_default().rows.insert(id, row);
    }
    Ok(DatabaseState::restore(schema, tables))
}

impl RowStore for EmbeddedStore {
    fn insert(&self, table: &str, row: Row) -> Result<Row, Error> {
        self.write(|state| state.insert_row(table, row))
    }

    fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, Error> {
        self.state.read().select(table, query)
    }

    fn update(&self, table: &str, id: i64, changes: Row) -> Result<Row, Error> {
        self.write(|state| state.update_row(table, id, changes))
    }

    fn delete(&self, table: &str, id: i64) -> Result<(), Error> {
        self.write(|state| state.delete_row(table, id))
    }

    fn count(&self, table: &str, query: &RowQuery) -> Result<usize, Error> {
        self.state.read().count(table, query)
    }
}

impl SchemaBackend for EmbeddedStore {
    type Tx<'a> = EmbeddedTransaction<'a>;

    fn try_lock(&self) -> Result<bool, Error> {
        Ok(self
            .migrating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    fn unlock(&self) -> Result<(), Error> {
        self.migrating.store(false, Ordering::Release);
        Ok(())
    }

    fn begin(&self) -> Result<EmbeddedTransaction<'_>, Error> {
        let state = self.state.write();
        Ok(EmbeddedTransaction {
            store: self,
            ledger: self.ledger()?,
            ledger_writes: Vec::new(),
            state,
        })
    }

    fn execute(&self, op: &SchemaOp) -> Result<(), Error> {
        self.write(|state| state.apply_op(op))
    }
}

enum LedgerWrite {
    Insert(LedgerEntry),
    Remove(String),
}

/// A transaction over the loaded state and a working copy of the ledger.
///
/// Holds the state's write lock. Nothing is persisted until [`SchemaTransaction::commit`]
/// writes the touched keys of all three trees atomically; dropping the transaction without
/// committing undoes its changes.
pub struct EmbeddedTransaction<'a> {
    store: &'a EmbeddedStore,
    state: RwLockWriteGuard<'a, DatabaseState>,
    ledger: BTreeMap<String, LedgerEntry>,
    ledger_writes: Vec<LedgerWrite>,
}

impl MigrationLedger for EmbeddedTransaction<'_> {
    fn applied_versions(&self) -> Result<Vec<LedgerEntry>, Error> {
        Ok(self.ledger.values().cloned().collect())
    }

    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), Error> {
        if self.ledger.contains_key(&entry.version) {
            return Err(Error::Transaction(format!(
                "version {} is already recorded",
                entry.version
            )));
        }
        self.ledger.insert(entry.version.clone(), entry.clone());
        self.ledger_writes.push(LedgerWrite::Insert(entry.clone()));
        Ok(())
    }

    fn record_reverted(&mut self, version: &str) -> Result<(), Error> {
        if self.ledger.remove(version).is_none() {
            return Err(Error::Transaction(format!("version {version} is not recorded")));
        }
        self.ledger_writes.push(LedgerWrite::Remove(version.to_string()));
        Ok(())
    }
}

impl SchemaTransaction for EmbeddedTransaction<'_> {
    fn execute(&mut self, op: &SchemaOp) -> Result<(), Error> {
        self.state.apply_op(op)
    }

    fn commit(mut self) -> Result<(), Error> {
        let mut writes = KeyWrites::from_changes(&self.state.changes())?;
        for write in &self.ledger_writes {
            match write {
                LedgerWrite::Insert(entry) => writes
                    .ledger
                    .push((entry.version.as_bytes().to_vec(), Some(serde_json::to_vec(entry)?))),
                LedgerWrite::Remove(version) => {
                    writes.ledger.push((version.as_bytes().to_vec(), None))
                }
            }
        }

        self.store.persist(&writes)?;
        self.state.commit_changes();
        Ok(())
    }

    fn rollback(self) -> Result<(), Error> {
        Ok(())
    }
}

impl Drop for EmbeddedTransaction<'_> {
    fn drop(&mut self) {
        self.state.rollback_changes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType, TableDef};
    use chrono::Utc;
    use serde_json::json;

    fn users_table() -> SchemaOp {
        SchemaOp::CreateTable(
            TableDef::new("users")
                .with_column(ColumnDef::id())
                .with_column(ColumnDef::new("email", ColumnType::string())),
        )
    }

    fn entry(version: &str) -> LedgerEntry {
        LedgerEntry {
            version: version.into(),
            name: "create-users".into(),
            checksum: "abc".into(),
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_commit_writes_state_and_ledger() {
        let store = EmbeddedStore::temporary().unwrap();

        let mut tx = store.begin().unwrap();
        tx.execute(&users_table()).unwrap();
        tx.record_applied(&entry("20180315090000")).unwrap();
        tx.commit().unwrap();

        assert!(store.state().unwrap().schema.table("users").is_some());
        let tx = store.begin().unwrap();
        assert_eq!(tx.applied_versions().unwrap().len(), 1);
    }

    #[test]
    fn test_rollback_discards_everything() {
        let store = EmbeddedStore::temporary().unwrap();

        let mut tx = store.begin().unwrap();
        tx.execute(&users_table()).unwrap();
        tx.record_applied(&entry("20180315090000")).unwrap();
        tx.rollback().unwrap();

        assert!(store.state().unwrap().schema.is_empty());
        let tx = store.begin().unwrap();
        assert!(tx.applied_versions().unwrap().is_empty());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let store = EmbeddedStore::temporary().unwrap();
        assert!(store.try_lock().unwrap());
        assert!(!store.try_lock().unwrap());
        store.unlock().unwrap();
        assert!(store.try_lock().unwrap());
    }

    #[test]
    fn test_rows_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = EmbeddedStore::open(StoreConfig::new(dir.path())).unwrap();
            store.execute(&users_table()).unwrap();
            let row = json!({"email": "rider@example.com"});
            let row = row.as_object().cloned().unwrap();
            store.insert("users", row).unwrap();
        }

        let store = EmbeddedStore::open(StoreConfig::new(dir.path())).unwrap();
        assert_eq!(store.count("users", &RowQuery::new()).unwrap(), 1);
    }

    fn user(email: &str) -> Row {
        json!({ "email": email }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_rows_are_stored_under_their_own_keys() {
        let store = EmbeddedStore::temporary().unwrap();
        store.execute(&users_table()).unwrap();
        store.insert("users", user("a@x.io")).unwrap();
        store.insert("users", user("b@x.io")).unwrap();

        let keys: Vec<_> = store
            .rows_tree
            .iter()
            .keys()
            .map(|k| decode_row_key(&k.unwrap()).unwrap())
            .collect();
        assert_eq!(keys, vec![("users".to_string(), 1), ("users".to_string(), 2)]);

        let before = store.rows_tree.get(row_key("users", 1)).unwrap();
        store.update("users", 2, user("c@x.io")).unwrap();
        assert_eq!(store.rows_tree.get(row_key("users", 1)).unwrap(), before);

        store.delete("users", 1).unwrap();
        assert!(store.rows_tree.get(row_key("users", 1)).unwrap().is_none());
        assert_eq!(store.rows_tree.len(), 1);
    }

    #[test]
    fn test_sequences_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = EmbeddedStore::open(StoreConfig::new(dir.path())).unwrap();
            store.execute(&users_table()).unwrap();
            store.insert("users", user("a@x.io")).unwrap();
            store.insert("users", user("b@x.io")).unwrap();
            store.delete("users", 2).unwrap();
        }

        let store = EmbeddedStore::open(StoreConfig::new(dir.path())).unwrap();
        let row = store.insert("users", user("c@x.io")).unwrap();
        assert_eq!(row["id"], json!(3));
        assert_eq!(store.count("users", &RowQuery::new()).unwrap(), 2);
    }

    #[test]
    fn test_dropped_table_rows_are_removed() {
        let store = EmbeddedStore::temporary().unwrap();
        store.execute(&users_table()).unwrap();
        store.insert("users", user("a@x.io")).unwrap();

        let mut tx = store.begin().unwrap();
        tx.execute(&SchemaOp::DropTable { name: "users".into() }).unwrap();
        tx.record_applied(&entry("20180315090000")).unwrap();
        tx.commit().unwrap();

        assert!(store.rows_tree.is_empty());
        assert!(store.catalog_tree.get(sequence_key("users")).unwrap().is_none());
    }

    #[test]
    fn test_uncommitted_transaction_is_undone() {
        let store = EmbeddedStore::temporary().unwrap();
        store.execute(&users_table()).unwrap();
        store.insert("users", user("a@x.io")).unwrap();

        {
            let mut tx = store.begin().unwrap();
            tx.execute(&SchemaOp::DropTable { name: "users".into() }).unwrap();
        }

        assert_eq!(store.count("users", &RowQuery::new()).unwrap(), 1);
        assert_eq!(store.rows_tree.len(), 1);
    }

    #[test]
    fn test_failed_insert_is_not_persisted() {
        let store = EmbeddedStore::temporary().unwrap();
        store
            .execute(&SchemaOp::CreateTable(
                TableDef::new("users")
                    .with_column(ColumnDef::id())
                    .with_column(ColumnDef::new("email", ColumnType::string()).unique()),
            ))
            .unwrap();
        store.insert("users", user("a@x.io")).unwrap();
        assert!(store.insert("users", user("a@x.io")).is_err());

        assert_eq!(store.rows_tree.len(), 1);
        assert_eq!(store.insert("users", user("b@x.io")).unwrap()["id"], json!(2));
    }

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let store = EmbeddedStore::temporary().unwrap();
        store.execute(&users_table()).unwrap();
        assert!(store.execute(&users_table()).is_err());
        assert_eq!(store.state().unwrap().schema.tables.len(), 1);
    }
}
