//! Row queries for the row stores.

use super::Row;
use serde_json::Value;
use std::cmp::Ordering;

/// A filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column equals value.
    Eq(String, Value),
    /// Column is NULL (or absent).
    IsNull(String),
    /// Column is not NULL.
    IsNotNull(String),
    /// Column is less than or equal to value.
    Lte(String, Value),
    /// Column is greater than or equal to value.
    Gte(String, Value),
    /// Column equals any of the values.
    In(String, Vec<Value>),
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// A filtered, ordered, limited read of one table.
///
/// Every predicate must match. Soft-delete filtering is just another predicate; the stores
/// never add one on their own.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowQuery {
    /// Conjunction of filters.
    pub predicates: Vec<Predicate>,
    /// Sort keys, applied in order. Rows are returned by ascending `id` when empty.
    pub order_by: Vec<(String, SortDirection)>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl RowQuery {
    /// Query matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Shorthand for an equality filter.
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Predicate::Eq(column.into(), value.into()))
    }

    /// Shorthand for an `IS NULL` filter.
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(Predicate::IsNull(column.into()))
    }

    /// Add a sort key.
    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    /// Limit the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a row against every predicate.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// Sort and truncate rows already filtered by [`RowQuery::matches`].
    pub fn finish(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if !self.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for (column, direction) in &self.order_by {
                    let ord = compare_values(
                        a.get(column).unwrap_or(&Value::Null),
                        b.get(column).unwrap_or(&Value::Null),
                    );
                    let ord = match direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

impl Predicate {
    /// Check a single row.
    pub fn matches(&self, row: &Row) -> bool {
        let value = |column: &str| row.get(column).unwrap_or(&Value::Null);
        match self {
            Predicate::Eq(column, expected) => {
                let actual = value(column);
                !actual.is_null() && compare_values(actual, expected) == Ordering::Equal
            }
            Predicate::IsNull(column) => value(column).is_null(),
            Predicate::IsNotNull(column) => !value(column).is_null(),
            Predicate::Lte(column, bound) => {
                let actual = value(column);
                !actual.is_null() && compare_values(actual, bound) != Ordering::Greater
            }
            Predicate::Gte(column, bound) => {
                let actual = value(column);
                !actual.is_null() && compare_values(actual, bound) != Ordering::Less
            }
            Predicate::In(column, options) => {
                let actual = value(column);
                !actual.is_null()
                    && options
                        .iter()
                        .any(|o| compare_values(actual, o) == Ordering::Equal)
            }
        }
    }
}

/// Total order over JSON scalars: nulls first, then booleans, numbers and strings.
///
/// Timestamps are stored as RFC 3339 strings in UTC, so string order is time order.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
