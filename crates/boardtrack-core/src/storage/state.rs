//! In-memory database state held by the embedded store.
//!
//! A [`DatabaseState`] is the schema plus every table's rows. Every mutation first records
//! the original value of what it touches in a journal. The embedded store persists only the
//! journaled keys on commit ([`DatabaseState::changes`]) and restores the originals when a
//! write or transaction fails ([`DatabaseState::rollback_changes`]), so schema changes and row
//! changes either land together or not at all.

use super::query::{compare_values, Predicate, RowQuery};
use super::Row;
use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, Schema, SchemaOp, TableDef};
use crate::error::{ConstraintError, Error};
use crate::model::geo;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Maximum cascade depth to prevent runaway recursion.
const MAX_CASCADE_DEPTH: usize = 100;

/// Rows of one table keyed by primary key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    /// Next value handed out by the serial `id` column.
    pub next_id: i64,
    /// Stored rows.
    pub rows: BTreeMap<i64, Row>,
}

/// Original values of everything changed since the last commit.
#[derive(Debug, Clone, Default, PartialEq)]
struct Journal {
    schema: Option<Schema>,
    /// `None` when the table did not exist.
    sequences: BTreeMap<String, Option<i64>>,
    /// `None` when the row did not exist.
    rows: BTreeMap<(String, i64), Option<Row>>,
}

/// Current values of the keys changed since the last commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Changes<'a> {
    /// The schema, when it changed.
    pub schema: Option<&'a Schema>,
    /// Table sequences; `None` for dropped tables.
    pub sequences: Vec<(&'a str, Option<i64>)>,
    /// Rows; `None` for deleted rows.
    pub rows: Vec<(&'a str, i64, Option<&'a Row>)>,
}

impl Changes<'_> {
    /// Nothing to persist.
    pub fn is_empty(&self) -> bool {
        self.schema.is_none() && self.sequences.is_empty() && self.rows.is_empty()
    }
}

/// Schema and data of the embedded database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseState {
    /// Current structural schema.
    pub schema: Schema,
    /// Rows per table.
    pub tables: BTreeMap<String, TableRows>,
    journal: Journal,
}

/// Canonical timestamp encoding for stored rows.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl DatabaseState {
    /// Empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from persisted parts, with nothing pending.
    pub fn restore(schema: Schema, tables: BTreeMap<String, TableRows>) -> Self {
        Self {
            schema,
            tables,
            journal: Journal::default(),
        }
    }

    /// Keys changed since the last [`DatabaseState::commit_changes`], with their current values.
    pub fn changes(&self) -> Changes<'_> {
        Changes {
            schema: self.journal.schema.as_ref().map(|_| &self.schema),
            sequences: self
                .journal
                .sequences
                .keys()
                .map(|table| (table.as_str(), self.tables.get(table).map(|t| t.next_id)))
                .collect(),
            rows: self
                .journal
                .rows
                .keys()
                .map(|(table, id)| {
                    let row = self.tables.get(table).and_then(|t| t.rows.get(id));
                    (table.as_str(), *id, row)
                })
                .collect(),
        }
    }

    /// Accept every change made since the last commit.
    pub fn commit_changes(&mut self) {
        self.journal = Journal::default();
    }

    /// Undo every change made since the last commit.
    pub fn rollback_changes(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        if let Some(schema) = journal.schema {
            self.schema = schema;
        }
        for (table, original) in &journal.sequences {
            match original {
                Some(next_id) => self.tables.entry(table.clone()).or_default().next_id = *next_id,
                None => {
                    self.tables.remove(table);
                }
            }
        }
        for ((table, id), original) in journal.rows {
            if journal.sequences.get(&table) == Some(&None) {
                continue;
            }
            let rows = &mut self.tables.entry(table).or_default().rows;
            match original {
                Some(row) => {
                    rows.insert(id, row);
                }
                None => {
                    rows.remove(&id);
                }
            }
        }
    }

    fn touch_schema(&mut self) {
        if self.journal.schema.is_none() {
            self.journal.schema = Some(self.schema.clone());
        }
    }

    fn touch_sequence(&mut self, table: &str) {
        if !self.journal.sequences.contains_key(table) {
            let original = self.tables.get(table).map(|t| t.next_id);
            self.journal.sequences.insert(table.to_string(), original);
        }
    }

    fn touch_row(&mut self, table: &str, id: i64) {
        let key = (table.to_string(), id);
        if !self.journal.rows.contains_key(&key) {
            let original = self.tables.get(table).and_then(|t| t.rows.get(&id)).cloned();
            self.journal.rows.insert(key, original);
        }
    }

    fn touch_all_rows(&mut self, table: &str) -> Result<(), Error> {
        let ids: Vec<i64> = self.rows(table)?.rows.keys().copied().collect();
        for id in ids {
            self.touch_row(table, id);
        }
        Ok(())
    }

    fn put_row(&mut self, table: &str, id: i64, row: Row) -> Result<(), Error> {
        self.rows(table)?;
        self.touch_row(table, id);
        self.rows_mut(table)?.rows.insert(id, row);
        Ok(())
    }

    fn remove_row(&mut self, table: &str, id: i64) -> Result<(), Error> {
        self.rows(table)?;
        self.touch_row(table, id);
        self.rows_mut(table)?.rows.remove(&id);
        Ok(())
    }

    /// Apply a schema operation to both the schema and the stored rows.
    ///
    /// A failed operation may leave partial changes; callers roll them back.
    pub fn apply_op(&mut self, op: &SchemaOp) -> Result<(), Error> {
        self.touch_schema();
        self.schema.apply(op)?;

        match op {
            SchemaOp::CreateEnum(_) | SchemaOp::DropEnum { .. } | SchemaOp::RemoveIndex { .. } => {}
            SchemaOp::AddIndex { .. } | SchemaOp::RemoveUnique { .. } => {}
            SchemaOp::CreateTable(def) => {
                self.touch_sequence(&def.name);
                self.tables.insert(
                    def.name.clone(),
                    TableRows {
                        next_id: 1,
                        rows: BTreeMap::new(),
                    },
                );
            }
            SchemaOp::DropTable { name } => {
                self.touch_all_rows(name)?;
                self.touch_sequence(name);
                self.tables.remove(name);
            }
            SchemaOp::AddColumn { table, column } => {
                self.touch_all_rows(table)?;
                let rows = self.rows_mut(table)?;
                if !rows.rows.is_empty() && !column.nullable && column.default.is_none() {
                    return Err(Error::conflict(format!(
                        "column {} of relation {table} contains null values",
                        column.name
                    )));
                }
                let fill = column
                    .default
                    .as_ref()
                    .map(default_value)
                    .unwrap_or(Value::Null);
                for row in rows.rows.values_mut() {
                    row.insert(column.name.clone(), fill.clone());
                }
                if column.unique {
                    self.check_existing_unique(table, &[column.name.clone()])?;
                }
            }
            SchemaOp::RemoveColumn { table, column } => {
                self.touch_all_rows(table)?;
                for row in self.rows_mut(table)?.rows.values_mut() {
                    row.remove(column);
                }
            }
            SchemaOp::RenameColumn { table, from, to } => {
                self.touch_all_rows(table)?;
                for row in self.rows_mut(table)?.rows.values_mut() {
                    if let Some(value) = row.remove(from) {
                        row.insert(to.clone(), value);
                    }
                }
            }
            SchemaOp::AddUnique { table, unique } => {
                self.check_existing_unique(table, &unique.columns)?;
            }
            SchemaOp::PurgeRows { table, column } => {
                let ids: Vec<i64> = self
                    .rows(table)?
                    .rows
                    .iter()
                    .filter(|(_, row)| !row.get(column).unwrap_or(&Value::Null).is_null())
                    .map(|(id, _)| *id)
                    .collect();
                for id in ids {
                    if self.rows(table)?.rows.contains_key(&id) {
                        self.delete_row(table, id)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Insert a row, filling defaults and checking every constraint.
    pub fn insert_row(&mut self, table: &str, row: Row) -> Result<Row, Error> {
        let def = self.table_def(table)?.clone();
        let mut row = self.normalize_row(&def, row)?;

        let mut assigned_id = None;
        for column in &def.columns {
            let missing = row.get(&column.name).map_or(true, Value::is_null);
            if !missing {
                continue;
            }
            if column.column_type == ColumnType::Serial {
                let id = self.rows(table)?.next_id;
                row.insert(column.name.clone(), Value::from(id));
                assigned_id = Some(id);
            } else if let Some(default) = &column.default {
                row.insert(column.name.clone(), default_value(default));
            } else {
                row.insert(column.name.clone(), Value::Null);
            }
        }

        self.check_row(&def, &row, None)?;

        let id = row_id(&row, table)?;
        if self.rows(table)?.rows.contains_key(&id) {
            return Err(ConstraintError::UniqueViolation {
                table: table.to_string(),
                constraint: format!("{table}_pkey"),
                columns: vec!["id".to_string()],
                value: id.to_string(),
            }
            .into());
        }
        self.touch_sequence(table);
        let rows = self.rows_mut(table)?;
        rows.next_id = rows.next_id.max(assigned_id.unwrap_or(id) + 1);
        self.put_row(table, id, row.clone())?;
        Ok(row)
    }

    /// Update a row's columns, checking every constraint.
    pub fn update_row(&mut self, table: &str, id: i64, changes: Row) -> Result<Row, Error> {
        let def = self.table_def(table)?.clone();
        let changes = self.normalize_row(&def, changes)?;
        if changes.contains_key("id") {
            return Err(Error::InvalidData(format!("cannot change id of {table} row")));
        }

        let mut row = self
            .rows(table)?
            .rows
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound)?;
        for (column, value) in changes {
            row.insert(column, value);
        }
        self.check_row(&def, &row, Some(id))?;

        self.put_row(table, id, row.clone())?;
        Ok(row)
    }

    /// Physically delete a row, applying the referencing foreign keys' delete actions.
    pub fn delete_row(&mut self, table: &str, id: i64) -> Result<(), Error> {
        let mut visited = HashSet::new();
        self.delete_recursive(table, id, &mut visited, 0)
    }

    fn delete_recursive(
        &mut self,
        table: &str,
        id: i64,
        visited: &mut HashSet<(String, i64)>,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > MAX_CASCADE_DEPTH {
            return Err(Error::Transaction(format!(
                "cascade depth exceeded while deleting {table} row {id}"
            )));
        }
        if !visited.insert((table.to_string(), id)) {
            return Ok(());
        }

        let row = self
            .rows(table)?
            .rows
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound)?;

        let references: Vec<(String, ColumnDef)> = self
            .schema
            .referencing_columns(table)
            .into_iter()
            .map(|(t, c)| (t.name.clone(), c.clone()))
            .collect();

        for (ref_table, column) in references {
            let Some(fk) = &column.references else {
                continue;
            };
            let key = row.get(&fk.column).cloned().unwrap_or(Value::Null);
            if key.is_null() {
                continue;
            }
            let referencing: Vec<i64> = self
                .rows(&ref_table)?
                .rows
                .iter()
                .filter(|(ref_id, r)| {
                    !(ref_table == table && **ref_id == id)
                        && r.get(&column.name)
                            .is_some_and(|v| !v.is_null() && compare_values(v, &key) == Ordering::Equal)
                })
                .map(|(ref_id, _)| *ref_id)
                .collect();
            if referencing.is_empty() {
                continue;
            }

            match fk.on_delete {
                DeleteBehavior::Restrict => {
                    return Err(ConstraintError::RestrictViolation {
                        table: table.to_string(),
                        id,
                        referencing_table: ref_table,
                    }
                    .into());
                }
                DeleteBehavior::SetNull => {
                    if !column.nullable {
                        return Err(ConstraintError::NotNullViolation {
                            table: ref_table,
                            column: column.name.clone(),
                        }
                        .into());
                    }
                    for ref_id in referencing {
                        let Some(mut r) = self.rows(&ref_table)?.rows.get(&ref_id).cloned() else {
                            continue;
                        };
                        r.insert(column.name.clone(), Value::Null);
                        self.put_row(&ref_table, ref_id, r)?;
                    }
                }
                DeleteBehavior::Cascade => {
                    for ref_id in referencing {
                        if self.rows(&ref_table)?.rows.contains_key(&ref_id) {
                            self.delete_recursive(&ref_table, ref_id, visited, depth + 1)?;
                        }
                    }
                }
            }
        }

        self.remove_row(table, id)
    }

    /// Rows matching a query.
    pub fn select(&self, table: &str, query: &RowQuery) -> Result<Vec<Row>, Error> {
        let query = self.normalize_query(table, query)?;
        let rows = self
            .rows(table)?
            .rows
            .values()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        Ok(query.finish(rows))
    }

    /// Number of rows matching a query's predicates.
    pub fn count(&self, table: &str, query: &RowQuery) -> Result<usize, Error> {
        let query = self.normalize_query(table, query)?;
        Ok(self
            .rows(table)?
            .rows
            .values()
            .filter(|row| query.matches(row))
            .count())
    }

    fn table_def(&self, table: &str) -> Result<&TableDef, Error> {
        self.schema
            .table(table)
            .ok_or_else(|| Error::InvalidData(format!("relation {table} does not exist")))
    }

    fn rows(&self, table: &str) -> Result<&TableRows, Error> {
        self.tables
            .get(table)
            .ok_or_else(|| Error::InvalidData(format!("relation {table} does not exist")))
    }

    fn rows_mut(&mut self, table: &str) -> Result<&mut TableRows, Error> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| Error::InvalidData(format!("relation {table} does not exist")))
    }

    /// Reject unknown columns and coerce compared values to their stored form, so a query
    /// matches the same rows however its timestamps or geography values are spelled.
    fn normalize_query(&self, table: &str, query: &RowQuery) -> Result<RowQuery, Error> {
        let def = self.table_def(table)?;
        let column = |name: &str| def.column(name).ok_or_else(|| unknown_column(def, name));
        let coerce = |name: &str, value: &Value| self.coerce_value(&def.name, column(name)?, value.clone());

        let predicates = query
            .predicates
            .iter()
            .map(|predicate| -> Result<Predicate, Error> {
                Ok(match predicate {
                    Predicate::Eq(name, value) => Predicate::Eq(name.clone(), coerce(name, value)?),
                    Predicate::Lte(name, value) => Predicate::Lte(name.clone(), coerce(name, value)?),
                    Predicate::Gte(name, value) => Predicate::Gte(name.clone(), coerce(name, value)?),
                    Predicate::In(name, values) => Predicate::In(
                        name.clone(),
                        values
                            .iter()
                            .map(|value| coerce(name, value))
                            .collect::<Result<_, Error>>()?,
                    ),
                    Predicate::IsNull(name) | Predicate::IsNotNull(name) => {
                        column(name)?;
                        predicate.clone()
                    }
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        for (name, _) in &query.order_by {
            column(name)?;
        }

        Ok(RowQuery {
            predicates,
            order_by: query.order_by.clone(),
            limit: query.limit,
        })
    }

    /// Reject unknown columns and coerce values to their stored form.
    fn normalize_row(&self, def: &TableDef, row: Row) -> Result<Row, Error> {
        let mut normalized = Row::new();
        for (name, value) in row {
            let column = def.column(&name).ok_or_else(|| unknown_column(def, &name))?;
            let value = self.coerce_value(&def.name, column, value)?;
            normalized.insert(name, value);
        }
        Ok(normalized)
    }

    fn coerce_value(&self, table: &str, column: &ColumnDef, value: Value) -> Result<Value, Error> {
        if value.is_null() {
            return Ok(value);
        }
        let invalid = |reason: String| -> Error {
            ConstraintError::InvalidValue {
                table: table.to_string(),
                column: column.name.clone(),
                reason,
            }
            .into()
        };

        match &column.column_type {
            ColumnType::Serial | ColumnType::Integer => match value.as_i64() {
                Some(n) if i32::try_from(n).is_ok() => Ok(value),
                _ => Err(invalid(format!("expected 32-bit integer, got {value}"))),
            },
            ColumnType::BigInteger => match value.as_i64() {
                Some(_) => Ok(value),
                None => Err(invalid(format!("expected integer, got {value}"))),
            },
            ColumnType::Float | ColumnType::Double => match value.is_number() {
                true => Ok(value),
                false => Err(invalid(format!("expected number, got {value}"))),
            },
            ColumnType::String(max) => match value.as_str() {
                Some(s) if s.chars().count() <= *max as usize => Ok(value),
                Some(_) => Err(invalid(format!("value too long for VARCHAR({max})"))),
                None => Err(invalid(format!("expected string, got {value}"))),
            },
            ColumnType::Text => match value.is_string() {
                true => Ok(value),
                false => Err(invalid(format!("expected string, got {value}"))),
            },
            ColumnType::Boolean => match value.is_boolean() {
                true => Ok(value),
                false => Err(invalid(format!("expected boolean, got {value}"))),
            },
            ColumnType::Timestamp => {
                let parsed = value
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .ok_or_else(|| invalid(format!("expected RFC 3339 timestamp, got {value}")))?;
                Ok(timestamp_value(parsed.with_timezone(&Utc)))
            }
            ColumnType::Date => match value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            {
                Some(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
                None => Err(invalid(format!("expected YYYY-MM-DD date, got {value}"))),
            },
            ColumnType::Enum(name) => {
                let def = self
                    .schema
                    .enum_type(name)
                    .ok_or_else(|| invalid(format!("type {name} does not exist")))?;
                match value.as_str() {
                    Some(s) if def.contains(s) => Ok(value),
                    _ => Err(invalid(format!(
                        "invalid input value for enum {name}: {value}"
                    ))),
                }
            }
            ColumnType::Geography => {
                let stored = value
                    .as_str()
                    .ok_or_else(|| invalid(format!("expected hex EWKB, got {value}")))?;
                geo::decode(stored)?;
                Ok(Value::String(stored.to_ascii_uppercase()))
            }
        }
    }

    /// NOT NULL, unique and foreign key checks for a complete row.
    fn check_row(&self, def: &TableDef, row: &Row, existing_id: Option<i64>) -> Result<(), Error> {
        for column in &def.columns {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !column.nullable {
                    return Err(ConstraintError::NotNullViolation {
                        table: def.name.clone(),
                        column: column.name.clone(),
                    }
                    .into());
                }
                continue;
            }

            if let Some(fk) = &column.references {
                let target = self.rows(&fk.table)?;
                let self_reference = fk.table == def.name
                    && row.get(&fk.column).is_some_and(|v| v == value);
                let found = self_reference
                    || target.rows.values().any(|r| {
                        r.get(&fk.column)
                            .is_some_and(|v| compare_values(v, value) == Ordering::Equal)
                    });
                if !found {
                    return Err(ConstraintError::ForeignKeyViolation {
                        table: def.name.clone(),
                        column: column.name.clone(),
                        references_table: fk.table.clone(),
                        value: value.to_string(),
                    }
                    .into());
                }
            }
        }

        let rows = self.rows(&def.name)?;
        for (constraint, columns) in def.unique_sets() {
            let Some(key) = unique_key(row, &columns) else {
                continue;
            };
            let duplicate = rows
                .rows
                .iter()
                .filter(|(id, _)| Some(**id) != existing_id)
                .any(|(_, other)| unique_key(other, &columns).is_some_and(|k| keys_equal(&k, &key)));
            if duplicate {
                return Err(ConstraintError::UniqueViolation {
                    table: def.name.clone(),
                    constraint,
                    columns,
                    value: display_key(&key),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Fail when existing rows already violate a unique column set.
    fn check_existing_unique(&self, table: &str, columns: &[String]) -> Result<(), Error> {
        let rows = self.rows(table)?;
        let keys: Vec<Vec<Value>> = rows
            .rows
            .values()
            .filter_map(|row| unique_key(row, columns))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].iter().any(|other| keys_equal(key, other)) {
                return Err(Error::conflict(format!(
                    "could not create unique constraint on {table} ({}): key {} is duplicated",
                    columns.join(", "),
                    display_key(key)
                )));
            }
        }
        Ok(())
    }
}

fn unknown_column(def: &TableDef, name: &str) -> Error {
    ConstraintError::InvalidValue {
        table: def.name.clone(),
        column: name.to_string(),
        reason: "unknown column".to_string(),
    }
    .into()
}

fn default_value(default: &DefaultValue) -> Value {
    match default {
        DefaultValue::Bool(b) => Value::Bool(*b),
        DefaultValue::Int(i) => Value::from(*i),
        DefaultValue::Float(f) => Value::from(*f),
        DefaultValue::Text(s) => Value::String(s.clone()),
        DefaultValue::CurrentTimestamp => timestamp_value(Utc::now()),
    }
}

fn row_id(row: &Row, table: &str) -> Result<i64, Error> {
    row.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::InvalidData(format!("{table} row has no integer id")))
}

/// Values of a unique column set; `None` when any is NULL, since NULLs never collide.
fn unique_key(row: &Row, columns: &[String]) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|c| row.get(c).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| compare_values(x, y) == Ordering::Equal)
}

fn display_key(key: &[Value]) -> String {
    key.iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
