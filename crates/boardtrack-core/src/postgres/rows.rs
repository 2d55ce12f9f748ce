//! SQL for row access and error translation.
//!
//! Values travel as one JSONB parameter per statement and are cast to the column types with
//! `jsonb_populate_record`, so the same JSON rows the embedded store keeps can be written
//! without per-type binds. Rows come back through `jsonb_build_object` in the canonical
//! stored form: RFC 3339 UTC timestamps with microseconds and uppercase hex EWKB geography.

use crate::catalog::sql::quote_ident;
use crate::catalog::{ColumnDef, ColumnType, TableDef};
use crate::error::{ConstraintError, Error};
use crate::storage::{Predicate, Row, RowQuery, SortDirection};
use serde_json::Value;
use sqlx::postgres::PgDatabaseError;

/// Expression rendering one column in its stored JSON form.
fn column_expr(column: &ColumnDef) -> String {
    let name = quote_ident(&column.name);
    match column.column_type {
        ColumnType::Timestamp => format!(
            "to_char({name} AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.US\"Z\"')"
        ),
        ColumnType::Date => format!("to_char({name}, 'YYYY-MM-DD')"),
        ColumnType::Geography => format!("upper(encode(ST_AsEWKB({name}::geometry), 'hex'))"),
        _ => name,
    }
}

/// `jsonb_build_object(...)` over every column of a table.
pub(crate) fn row_object(table: &TableDef) -> String {
    let fields: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("'{}', {}", c.name.replace('\'', "''"), column_expr(c)))
        .collect();
    format!("jsonb_build_object({})", fields.join(", "))
}

fn column<'t>(table: &'t TableDef, name: &str) -> Result<&'t ColumnDef, Error> {
    table.column(name).ok_or_else(|| {
        ConstraintError::InvalidValue {
            table: table.name.clone(),
            column: name.to_string(),
            reason: "unknown column".to_string(),
        }
        .into()
    })
}

/// A statement with its JSONB parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

fn populated(table: &TableDef, param: &str) -> String {
    format!("jsonb_populate_record(NULL::{}, {param})", quote_ident(&table.name))
}

fn single(column: &str, value: &Value) -> Value {
    let mut object = Row::new();
    object.insert(column.to_string(), value.clone());
    Value::Object(object)
}

fn where_clause(table: &TableDef, query: &RowQuery, stmt: &mut Statement) -> Result<String, Error> {
    let mut conditions = Vec::with_capacity(query.predicates.len());
    for predicate in &query.predicates {
        let condition = match predicate {
            Predicate::IsNull(name) => format!("{} IS NULL", quote_ident(&column(table, name)?.name)),
            Predicate::IsNotNull(name) => {
                format!("{} IS NOT NULL", quote_ident(&column(table, name)?.name))
            }
            Predicate::Eq(name, value) | Predicate::Lte(name, value) | Predicate::Gte(name, value) => {
                let ident = quote_ident(&column(table, name)?.name);
                let op = match predicate {
                    Predicate::Lte(..) => "<=",
                    Predicate::Gte(..) => ">=",
                    _ => "=",
                };
                let param = stmt.bind(single(name, value));
                format!("{ident} {op} ({}).{ident}", populated(table, &param))
            }
            Predicate::In(name, values) => {
                let ident = quote_ident(&column(table, name)?.name);
                let elements = values.iter().map(|v| single(name, v)).collect();
                let param = stmt.bind(Value::Array(elements));
                format!(
                    "{ident} IN (SELECT ({}).{ident} FROM jsonb_array_elements({param}) AS e)",
                    populated(table, "e")
                )
            }
        };
        conditions.push(condition);
    }
    Ok(if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    })
}

fn order_clause(table: &TableDef, query: &RowQuery) -> Result<String, Error> {
    if query.order_by.is_empty() {
        return Ok(" ORDER BY \"id\" ASC".to_string());
    }
    let keys = query
        .order_by
        .iter()
        .map(|(name, direction)| {
            let ident = quote_ident(&column(table, name)?.name);
            Ok(match direction {
                SortDirection::Asc => format!("{ident} ASC NULLS FIRST"),
                SortDirection::Desc => format!("{ident} DESC NULLS LAST"),
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(format!(" ORDER BY {}", keys.join(", ")))
}

pub(crate) fn select(table: &TableDef, query: &RowQuery) -> Result<Statement, Error> {
    let mut stmt = Statement::new();
    let filter = where_clause(table, query, &mut stmt)?;
    let order = order_clause(table, query)?;
    stmt.sql = format!(
        "SELECT {} AS row FROM {}{filter}{order}",
        row_object(table),
        quote_ident(&table.name)
    );
    if let Some(limit) = query.limit {
        stmt.sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(stmt)
}

pub(crate) fn count(table: &TableDef, query: &RowQuery) -> Result<Statement, Error> {
    let mut stmt = Statement::new();
    let filter = where_clause(table, query, &mut stmt)?;
    stmt.sql = format!("SELECT COUNT(*) FROM {}{filter}", quote_ident(&table.name));
    Ok(stmt)
}

fn column_idents(table: &TableDef, row: &Row) -> Result<Vec<String>, Error> {
    row.keys()
        .map(|name| Ok(quote_ident(&column(table, name)?.name)))
        .collect()
}

/// Insert the given columns; every other column takes its default.
pub(crate) fn insert(table: &TableDef, row: Row) -> Result<Statement, Error> {
    let columns = column_idents(table, &row)?;
    let mut stmt = Statement::new();
    let name = quote_ident(&table.name);
    stmt.sql = if columns.is_empty() {
        format!("INSERT INTO {name} DEFAULT VALUES RETURNING {} AS row", row_object(table))
    } else {
        let param = stmt.bind(Value::Object(row));
        let list = columns.join(", ");
        format!(
            "INSERT INTO {name} ({list}) SELECT {list} FROM {} RETURNING {} AS row",
            populated(table, &param),
            row_object(table)
        )
    };
    Ok(stmt)
}

pub(crate) fn update(table: &TableDef, id: i64, changes: Row) -> Result<Statement, Error> {
    if changes.contains_key("id") {
        return Err(Error::InvalidData(format!("{} ids cannot change", table.name)));
    }
    let columns = column_idents(table, &changes)?;
    let mut stmt = Statement::new();
    let name = quote_ident(&table.name);
    if columns.is_empty() {
        let param = stmt.bind(Value::from(id));
        stmt.sql = format!(
            "SELECT {} AS row FROM {name} WHERE \"id\" = ({param})::int",
            row_object(table)
        );
        return Ok(stmt);
    }
    let list = columns.join(", ");
    let param = stmt.bind(Value::Object(changes));
    let id_param = stmt.bind(Value::from(id));
    stmt.sql = format!(
        "UPDATE {name} SET ({list}) = (SELECT {list} FROM {}) WHERE \"id\" = ({id_param})::int RETURNING {} AS row",
        populated(table, &param),
        row_object(table)
    );
    Ok(stmt)
}

pub(crate) fn delete(table: &TableDef) -> String {
    format!(
        "DELETE FROM {} WHERE \"id\" = ($1)::int",
        quote_ident(&table.name)
    )
}

/// Translate a failed row statement into a typed constraint error where possible.
pub(crate) fn row_error(table: &str, e: sqlx::Error) -> Error {
    let sqlx::Error::Database(db) = &e else {
        return Error::Postgres(e);
    };
    let table = db.table().unwrap_or(table).to_string();
    let column = db
        .try_downcast_ref::<PgDatabaseError>()
        .and_then(|pg| pg.column())
        .unwrap_or_default()
        .to_string();
    let constraint = db.constraint().unwrap_or_default().to_string();
    let message = db.message().to_string();
    let code = db.code().map(|c| c.into_owned());

    match code.as_deref() {
        Some("23505") => ConstraintError::UniqueViolation {
            table,
            constraint,
            columns: Vec::new(),
            value: message,
        }
        .into(),
        Some("23503") => ConstraintError::ForeignKeyViolation {
            table,
            column: constraint,
            references_table: String::new(),
            value: message,
        }
        .into(),
        Some("23502") => ConstraintError::NotNullViolation { table, column }.into(),
        Some("22P02") | Some("22001") | Some("22003") | Some("22007") | Some("22008") => {
            ConstraintError::InvalidValue {
                table,
                column,
                reason: message,
            }
            .into()
        }
        _ => Error::Postgres(e),
    }
}

/// Translate a failed DDL statement into a schema conflict where PostgreSQL rejected it.
pub(crate) fn ddl_error(e: sqlx::Error) -> Error {
    let sqlx::Error::Database(db) = &e else {
        return Error::Postgres(e);
    };
    let code = db.code().map(|c| c.into_owned());
    match code.as_deref() {
        // duplicate/undefined objects, dependent objects, duplicate data under a new unique
        Some("42P07") | Some("42710") | Some("42701") | Some("42P01") | Some("42703")
        | Some("42704") | Some("2BP01") | Some("23505") | Some("23502") => {
            Error::conflict(db.message().to_string())
        }
        _ => Error::Postgres(e),
    }
}
