//! Structural schema model.

use super::column::ColumnDef;
use super::op::SchemaOp;
use super::table::TableDef;
use super::types::EnumTypeDef;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The structural shape of a database: tables and enum types.
///
/// Applying every migration step to an empty schema must produce the schema declared by
/// the model layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Tables keyed by name.
    pub tables: BTreeMap<String, TableDef>,
    /// Enum types keyed by name.
    pub enums: BTreeMap<String, EnumTypeDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table.
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Add an enum type.
    pub fn with_enum(mut self, def: EnumTypeDef) -> Self {
        self.enums.insert(def.name.clone(), def);
        self
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Get an enum type by name.
    pub fn enum_type(&self, name: &str) -> Option<&EnumTypeDef> {
        self.enums.get(name)
    }

    /// True when there are no tables and no enum types.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty()
    }

    /// Total number of indexes and constraints across all tables.
    pub fn relation_count(&self) -> usize {
        self.tables.values().map(|t| t.relation_names().count()).sum()
    }

    /// Copy with every table normalized, for order-insensitive comparison.
    pub fn normalized(&self) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), table.normalized()))
                .collect(),
            enums: self.enums.clone(),
        }
    }

    /// Columns in other tables that reference `table`, as `(table, column)` pairs.
    pub fn referencing_columns(&self, table: &str) -> Vec<(&TableDef, &ColumnDef)> {
        self.tables
            .values()
            .flat_map(|t| t.columns.iter().map(move |c| (t, c)))
            .filter(|(_, c)| c.references.as_ref().is_some_and(|fk| fk.table == table))
            .collect()
    }

    /// Apply a schema operation, rejecting anything PostgreSQL would reject.
    pub fn apply(&mut self, op: &SchemaOp) -> Result<(), Error> {
        match op {
            SchemaOp::CreateEnum(def) => {
                if self.enums.contains_key(&def.name) {
                    return Err(Error::conflict(format!("type {} already exists", def.name)));
                }
                self.enums.insert(def.name.clone(), def.clone());
            }
            SchemaOp::DropEnum { name } => {
                if !self.enums.contains_key(name) {
                    return Err(Error::conflict(format!("type {name} does not exist")));
                }
                if let Some((table, column)) = self.enum_user(name) {
                    return Err(Error::conflict(format!(
                        "type {name} is still used by {table}.{column}"
                    )));
                }
                self.enums.remove(name);
            }
            SchemaOp::CreateTable(def) => {
                if self.tables.contains_key(&def.name) {
                    return Err(Error::conflict(format!(
                        "relation {} already exists",
                        def.name
                    )));
                }
                let mut seen = std::collections::HashSet::new();
                for column in &def.columns {
                    if !seen.insert(column.name.as_str()) {
                        return Err(Error::conflict(format!(
                            "column {} specified more than once in {}",
                            column.name, def.name
                        )));
                    }
                    self.check_column_dependencies(&def.name, column)?;
                }
                for name in def.relation_names() {
                    self.check_relation_name_free(name)?;
                }
                for columns in def
                    .uniques
                    .iter()
                    .map(|u| &u.columns)
                    .chain(def.indexes.iter().map(|i| &i.columns))
                {
                    for column in columns {
                        if !def.has_column(column) {
                            return Err(Error::conflict(format!(
                                "column {column} does not exist in {}",
                                def.name
                            )));
                        }
                    }
                }
                self.tables.insert(def.name.clone(), def.clone());
            }
            SchemaOp::DropTable { name } => {
                self.table_or_conflict(name)?;
                if let Some((other, column)) = self
                    .referencing_columns(name)
                    .into_iter()
                    .find(|(t, _)| t.name != *name)
                {
                    return Err(Error::conflict(format!(
                        "cannot drop {name}: {}.{} depends on it",
                        other.name, column.name
                    )));
                }
                self.tables.remove(name);
            }
            SchemaOp::AddColumn { table, column } => {
                let existing = self.table_or_conflict(table)?;
                if existing.has_column(&column.name) {
                    return Err(Error::conflict(format!(
                        "column {} of relation {table} already exists",
                        column.name
                    )));
                }
                self.check_column_dependencies(table, column)?;
                self.table_mut(table)?.columns.push(column.clone());
            }
            SchemaOp::RemoveColumn { table, column } => {
                let existing = self.table_or_conflict(table)?;
                if !existing.has_column(column) {
                    return Err(Error::conflict(format!(
                        "column {column} of relation {table} does not exist"
                    )));
                }
                if let Some((other, fk_column)) = self
                    .referencing_columns(table)
                    .into_iter()
                    .find(|(_, c)| c.references.as_ref().is_some_and(|fk| fk.column == *column))
                {
                    return Err(Error::conflict(format!(
                        "cannot drop {table}.{column}: {}.{} depends on it",
                        other.name, fk_column.name
                    )));
                }
                let def = self.table_mut(table)?;
                def.columns.retain(|c| c.name != *column);
                // PostgreSQL drops dependent constraints and indexes with the column.
                def.uniques.retain(|u| !u.columns.contains(column));
                def.indexes.retain(|i| !i.columns.contains(column));
            }
            SchemaOp::RenameColumn { table, from, to } => {
                let existing = self.table_or_conflict(table)?;
                if !existing.has_column(from) {
                    return Err(Error::conflict(format!(
                        "column {from} of relation {table} does not exist"
                    )));
                }
                if existing.has_column(to) {
                    return Err(Error::conflict(format!(
                        "column {to} of relation {table} already exists"
                    )));
                }
                let def = self.table_mut(table)?;
                if let Some(col) = def.column_mut(from) {
                    col.name = to.clone();
                }
                for columns in def
                    .uniques
                    .iter_mut()
                    .map(|u| &mut u.columns)
                    .chain(def.indexes.iter_mut().map(|i| &mut i.columns))
                {
                    for column in columns.iter_mut().filter(|c| *c == from) {
                        *column = to.clone();
                    }
                }
                for other in self.tables.values_mut() {
                    for col in other.columns.iter_mut() {
                        if let Some(fk) = col.references.as_mut() {
                            if fk.table == *table && fk.column == *from {
                                fk.column = to.clone();
                            }
                        }
                    }
                }
            }
            SchemaOp::AddUnique { table, unique } => {
                self.check_relation_name_free(&unique.name)?;
                let existing = self.table_or_conflict(table)?;
                if let Some(missing) = unique.columns.iter().find(|c| !existing.has_column(c)) {
                    return Err(Error::conflict(format!(
                        "column {missing} of relation {table} does not exist"
                    )));
                }
                self.table_mut(table)?.uniques.push(unique.clone());
            }
            SchemaOp::RemoveUnique { table, name } => {
                let def = self.table_mut(table)?;
                let before = def.uniques.len();
                def.uniques.retain(|u| u.name != *name);
                if def.uniques.len() == before {
                    return Err(Error::conflict(format!(
                        "constraint {name} of relation {table} does not exist"
                    )));
                }
            }
            SchemaOp::AddIndex { table, index } => {
                self.check_relation_name_free(&index.name)?;
                let existing = self.table_or_conflict(table)?;
                if let Some(missing) = index.columns.iter().find(|c| !existing.has_column(c)) {
                    return Err(Error::conflict(format!(
                        "column {missing} of relation {table} does not exist"
                    )));
                }
                self.table_mut(table)?.indexes.push(index.clone());
            }
            SchemaOp::RemoveIndex { table, name } => {
                let def = self.table_mut(table)?;
                let before = def.indexes.len();
                def.indexes.retain(|i| i.name != *name);
                if def.indexes.len() == before {
                    return Err(Error::conflict(format!("index {name} does not exist")));
                }
            }
            SchemaOp::PurgeRows { table, column } => {
                if !self.table_or_conflict(table)?.has_column(column) {
                    return Err(Error::conflict(format!(
                        "column {column} of relation {table} does not exist"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply a sequence of operations, stopping at the first conflict.
    pub fn apply_all<'a>(&mut self, ops: impl IntoIterator<Item = &'a SchemaOp>) -> Result<(), Error> {
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    /// Tables ordered so that every referenced table comes before the tables referencing it.
    pub fn tables_in_dependency_order(&self) -> Vec<&TableDef> {
        let mut ordered: Vec<&TableDef> = Vec::with_capacity(self.tables.len());
        let mut remaining: Vec<&TableDef> = self.tables.values().collect();

        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|table| {
                let ready = table.columns.iter().all(|c| match &c.references {
                    Some(fk) => {
                        fk.table == table.name || ordered.iter().any(|t| t.name == fk.table)
                    }
                    None => true,
                });
                if ready {
                    ordered.push(*table);
                }
                !ready
            });
            if remaining.len() == before {
                // Reference cycle; emit the rest in name order.
                ordered.append(&mut remaining);
            }
        }
        ordered
    }

    fn table_or_conflict(&self, name: &str) -> Result<&TableDef, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::conflict(format!("relation {name} does not exist")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableDef, Error> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::conflict(format!("relation {name} does not exist")))
    }

    fn enum_user(&self, name: &str) -> Option<(&str, &str)> {
        self.tables.values().find_map(|t| {
            t.columns
                .iter()
                .find(|c| c.column_type.enum_name() == Some(name))
                .map(|c| (t.name.as_str(), c.name.as_str()))
        })
    }

    fn check_relation_name_free(&self, name: &str) -> Result<(), Error> {
        if self
            .tables
            .values()
            .any(|t| t.name == name || t.relation_names().any(|n| n == name))
        {
            return Err(Error::conflict(format!("relation {name} already exists")));
        }
        Ok(())
    }

    fn check_column_dependencies(&self, table: &str, column: &ColumnDef) -> Result<(), Error> {
        if let Some(enum_name) = column.column_type.enum_name() {
            if !self.enums.contains_key(enum_name) {
                return Err(Error::conflict(format!("type {enum_name} does not exist")));
            }
        }
        if let Some(fk) = &column.references {
            if fk.table != table && !self.tables.contains_key(&fk.table) {
                return Err(Error::conflict(format!(
                    "relation {} referenced by {table}.{} does not exist",
                    fk.table, column.name
                )));
            }
        }
        Ok(())
    }
}
