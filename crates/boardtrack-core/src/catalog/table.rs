//! Table definitions.

use super::column::ColumnDef;
use super::types::IndexMethod;
use serde::{Deserialize, Serialize};

/// A table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name (unique within the schema).
    pub name: String,
    /// Columns in creation order.
    pub columns: Vec<ColumnDef>,
    /// Named unique constraints (single or composite).
    pub uniques: Vec<UniqueDef>,
    /// Named secondary indexes.
    pub indexes: Vec<IndexDef>,
}

/// A named unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueDef {
    /// Constraint name.
    pub name: String,
    /// Columns that must be unique together.
    pub columns: Vec<String>,
}

/// A named secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// Access method.
    pub method: IndexMethod,
}

impl TableDef {
    /// Create an empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            uniques: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add multiple columns.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a unique constraint named after the table and columns.
    pub fn with_unique(mut self, columns: &[&str]) -> Self {
        self.uniques.push(UniqueDef::for_columns(&self.name, columns));
        self
    }

    /// Add an index named after the table and columns.
    pub fn with_index(mut self, columns: &[&str], method: IndexMethod) -> Self {
        self.indexes
            .push(IndexDef::for_columns(&self.name, columns, method));
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get a column by name (mutable).
    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Check if the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Get the primary key column.
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Check if the table carries the paranoid `deletedAt` marker.
    pub fn is_paranoid(&self) -> bool {
        self.has_column("deletedAt")
    }

    /// All unique column sets, including column-level uniques, keyed by constraint name.
    pub fn unique_sets(&self) -> Vec<(String, Vec<String>)> {
        let mut sets: Vec<(String, Vec<String>)> = self
            .columns
            .iter()
            .filter(|c| c.unique)
            .map(|c| (format!("{}_{}_key", self.name, c.name), vec![c.name.clone()]))
            .collect();
        sets.extend(
            self.uniques
                .iter()
                .map(|u| (u.name.clone(), u.columns.clone())),
        );
        sets
    }

    /// Names of every constraint and index this table owns.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.uniques
            .iter()
            .map(|u| u.name.as_str())
            .chain(self.indexes.iter().map(|i| i.name.as_str()))
    }

    /// Copy with columns, constraints and indexes sorted by name.
    pub fn normalized(&self) -> Self {
        let mut table = self.clone();
        table.columns.sort_by(|a, b| a.name.cmp(&b.name));
        table.uniques.sort_by(|a, b| a.name.cmp(&b.name));
        table.indexes.sort_by(|a, b| a.name.cmp(&b.name));
        table
    }
}

impl UniqueDef {
    /// Create a named unique constraint.
    pub fn new(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Unique constraint named `<table>_<col>_<col>_key`.
    pub fn for_columns(table: &str, columns: &[&str]) -> Self {
        Self::new(format!("{}_{}_key", table, columns.join("_")), columns.iter().copied())
    }
}

impl IndexDef {
    /// Create a named index.
    pub fn new(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
        method: IndexMethod,
    ) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            method,
        }
    }

    /// Index named `<table>_<col>_<col>_idx`.
    pub fn for_columns(table: &str, columns: &[&str], method: IndexMethod) -> Self {
        Self::new(format!("{}_{}_idx", table, columns.join("_")), columns.iter().copied(), method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;

    fn boards() -> TableDef {
        TableDef::new("boards")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("serial", ColumnType::string()).not_null())
            .with_column(ColumnDef::new("name", ColumnType::string()))
            .with_column(ColumnDef::deleted_at())
            .with_unique(&["serial"])
    }

    #[test]
    fn test_table_builder() {
        let table = boards();
        assert_eq!(table.columns.len(), 4);
        assert!(table.has_column("serial"));
        assert!(table.is_paranoid());
        assert_eq!(table.primary_key().map(|c| c.name.as_str()), Some("id"));
        assert_eq!(table.uniques[0].name, "boards_serial_key");
    }

    #[test]
    fn test_unique_sets_include_column_uniques() {
        let table = TableDef::new("users")
            .with_column(ColumnDef::new("email", ColumnType::string()).unique())
            .with_unique(&["facebookId"]);
        let sets = table.unique_sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].0, "users_email_key");
        assert_eq!(sets[1].1, vec!["facebookId".to_string()]);
    }

    #[test]
    fn test_normalized_ignores_column_order() {
        let a = TableDef::new("t")
            .with_column(ColumnDef::new("b", ColumnType::Text))
            .with_column(ColumnDef::new("a", ColumnType::Text));
        let b = TableDef::new("t")
            .with_column(ColumnDef::new("a", ColumnType::Text))
            .with_column(ColumnDef::new("b", ColumnType::Text));
        assert_ne!(a, b);
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_index_naming() {
        let index = IndexDef::for_columns("spots", &["location"], IndexMethod::Gist);
        assert_eq!(index.name, "spots_location_idx");
        assert_eq!(index.method, IndexMethod::Gist);
    }
}
