//! Versioned migration steps and the builder they describe their changes with.

use crate::catalog::sql::render_op;
use crate::catalog::{
    ColumnDef, EnumTypeDef, IndexDef, IndexMethod, SchemaOp, TableDef, UniqueDef,
};

/// Collects the schema operations of one direction of a step.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    ops: Vec<SchemaOp>,
}

impl SchemaBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arbitrary operation.
    pub fn push(&mut self, op: SchemaOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Create a named enum type.
    pub fn create_enum(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.push(SchemaOp::CreateEnum(EnumTypeDef::new(name, values)))
    }

    /// Drop a named enum type.
    pub fn drop_enum(&mut self, name: &str) -> &mut Self {
        self.push(SchemaOp::DropEnum {
            name: name.to_string(),
        })
    }

    /// Create a table.
    pub fn create_table(&mut self, table: TableDef) -> &mut Self {
        self.push(SchemaOp::CreateTable(table))
    }

    /// Drop a table.
    pub fn drop_table(&mut self, name: &str) -> &mut Self {
        self.push(SchemaOp::DropTable {
            name: name.to_string(),
        })
    }

    /// Add a column.
    pub fn add_column(&mut self, table: &str, column: ColumnDef) -> &mut Self {
        self.push(SchemaOp::AddColumn {
            table: table.to_string(),
            column,
        })
    }

    /// Remove a column.
    pub fn remove_column(&mut self, table: &str, column: &str) -> &mut Self {
        self.push(SchemaOp::RemoveColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    /// Rename a column.
    pub fn rename_column(&mut self, table: &str, from: &str, to: &str) -> &mut Self {
        self.push(SchemaOp::RenameColumn {
            table: table.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Add a unique constraint named `<table>_<columns>_key`.
    pub fn add_unique(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        self.push(SchemaOp::AddUnique {
            table: table.to_string(),
            unique: UniqueDef::for_columns(table, columns),
        })
    }

    /// Remove the unique constraint [`SchemaBuilder::add_unique`] would add.
    pub fn remove_unique(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        self.push(SchemaOp::RemoveUnique {
            table: table.to_string(),
            name: UniqueDef::for_columns(table, columns).name,
        })
    }

    /// Add an index named `<table>_<columns>_idx`.
    pub fn add_index(&mut self, table: &str, columns: &[&str], method: IndexMethod) -> &mut Self {
        self.push(SchemaOp::AddIndex {
            table: table.to_string(),
            index: IndexDef::for_columns(table, columns, method),
        })
    }

    /// Remove the index [`SchemaBuilder::add_index`] would add.
    pub fn remove_index(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        self.push(SchemaOp::RemoveIndex {
            table: table.to_string(),
            name: IndexDef::for_columns(table, columns, IndexMethod::BTree).name,
        })
    }

    /// Physically delete rows whose `column` is set.
    pub fn purge_rows(&mut self, table: &str, column: &str) -> &mut Self {
        self.push(SchemaOp::PurgeRows {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    /// The recorded operations.
    pub fn into_ops(self) -> Vec<SchemaOp> {
        self.ops
    }
}

/// One reversible, versioned schema change.
///
/// `apply` and `revert` only describe operations; they never touch a database.
#[derive(Clone, Copy)]
pub struct MigrationStep {
    /// Sortable version, a `YYYYMMDDHHMMSS` timestamp.
    pub version: &'static str,
    /// Short kebab-case name.
    pub name: &'static str,
    apply: fn(&mut SchemaBuilder),
    revert: fn(&mut SchemaBuilder),
    lossy_revert: Option<&'static str>,
}

impl MigrationStep {
    /// Create a step.
    pub const fn new(
        version: &'static str,
        name: &'static str,
        apply: fn(&mut SchemaBuilder),
        revert: fn(&mut SchemaBuilder),
    ) -> Self {
        Self {
            version,
            name,
            apply,
            revert,
            lossy_revert: None,
        }
    }

    /// Mark the revert as unable to restore everything `apply` destroys.
    pub const fn lossy(mut self, detail: &'static str) -> Self {
        self.lossy_revert = Some(detail);
        self
    }

    /// `<version>-<name>`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.version, self.name)
    }

    /// Forward operations.
    pub fn apply_ops(&self) -> Vec<SchemaOp> {
        let mut builder = SchemaBuilder::new();
        (self.apply)(&mut builder);
        builder.into_ops()
    }

    /// Backward operations.
    pub fn revert_ops(&self) -> Vec<SchemaOp> {
        let mut builder = SchemaBuilder::new();
        (self.revert)(&mut builder);
        builder.into_ops()
    }

    /// What a revert cannot restore, if anything.
    pub fn lossy_revert(&self) -> Option<&'static str> {
        self.lossy_revert
    }

    /// Forward SQL statements.
    pub fn apply_sql(&self) -> Vec<String> {
        self.apply_ops().iter().flat_map(render_op).collect()
    }

    /// Backward SQL statements.
    pub fn revert_sql(&self) -> Vec<String> {
        self.revert_ops().iter().flat_map(render_op).collect()
    }

    /// blake3 hex digest of both directions' rendered SQL.
    pub fn checksum(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.version.as_bytes());
        for statement in self.apply_sql() {
            hasher.update(b"\n+");
            hasher.update(statement.as_bytes());
        }
        for statement in self.revert_sql() {
            hasher.update(b"\n-");
            hasher.update(statement.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("lossy_revert", &self.lossy_revert)
            .finish()
    }
}

/// Check that versions are unique and strictly ascending.
pub fn validate_sequence(steps: &[MigrationStep]) -> Result<(), String> {
    for pair in steps.windows(2) {
        if pair[0].version >= pair[1].version {
            return Err(format!(
                "{} must sort before {}",
                pair[0].id(),
                pair[1].id()
            ));
        }
    }
    if let Some(step) = steps.iter().find(|s| {
        s.version.len() != 14 || !s.version.bytes().all(|b| b.is_ascii_digit())
    }) {
        return Err(format!("{} is not a YYYYMMDDHHMMSS version", step.id()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;

    fn up(s: &mut SchemaBuilder) {
        s.create_enum("enum_boards_type", ["street", "offroad"])
            .add_column("boards", ColumnDef::new("type", ColumnType::enum_type("enum_boards_type")));
    }

    fn down(s: &mut SchemaBuilder) {
        s.remove_column("boards", "type").drop_enum("enum_boards_type");
    }

    const STEP: MigrationStep = MigrationStep::new("20180401100000", "add-type-to-boards", up, down);

    #[test]
    fn test_step_ops() {
        assert_eq!(STEP.id(), "20180401100000-add-type-to-boards");
        assert_eq!(STEP.apply_ops().len(), 2);
        assert!(STEP.apply_ops()[0].is_enum_op());
        assert!(STEP.revert_ops()[1].is_enum_op());
        assert!(STEP.lossy_revert().is_none());
        assert_eq!(
            STEP.apply_sql()[1],
            "ALTER TABLE \"boards\" ADD COLUMN \"type\" \"enum_boards_type\";"
        );
    }

    #[test]
    fn test_checksum_is_stable_and_distinct() {
        assert_eq!(STEP.checksum(), STEP.checksum());
        assert_eq!(STEP.checksum().len(), 64);

        let swapped = MigrationStep::new("20180401100000", "add-type-to-boards", down, up);
        assert_ne!(STEP.checksum(), swapped.checksum());
    }

    #[test]
    fn test_lossy_marker() {
        let step = STEP.lossy("rows are gone");
        assert_eq!(step.lossy_revert(), Some("rows are gone"));
    }

    #[test]
    fn test_validate_sequence() {
        let later = MigrationStep::new("20180402100000", "later", up, down);
        assert!(validate_sequence(&[STEP, later]).is_ok());
        assert!(validate_sequence(&[later, STEP]).is_err());
        assert!(validate_sequence(&[STEP, STEP]).is_err());

        let malformed = MigrationStep::new("2018", "short", up, down);
        assert!(validate_sequence(&[malformed]).is_err());
    }
}
