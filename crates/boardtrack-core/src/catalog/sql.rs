//! PostgreSQL rendering of schema operations.

use super::column::{ColumnDef, DefaultValue};
use super::op::SchemaOp;
use super::schema::Schema;
use super::table::TableDef;
use super::types::{ColumnType, IndexMethod, GEOGRAPHY_SRID};

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL type name for a column type.
pub fn column_type_sql(column_type: &ColumnType) -> String {
    match column_type {
        ColumnType::Serial => "SERIAL".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInteger => "BIGINT".to_string(),
        ColumnType::Float => "FLOAT".to_string(),
        ColumnType::Double => "DOUBLE PRECISION".to_string(),
        ColumnType::String(len) => format!("VARCHAR({len})"),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Enum(name) => quote_ident(name),
        ColumnType::Geography => format!("GEOGRAPHY(POINT, {GEOGRAPHY_SRID})"),
    }
}

fn default_sql(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Bool(b) => b.to_string(),
        DefaultValue::Int(i) => i.to_string(),
        DefaultValue::Float(f) => f.to_string(),
        DefaultValue::Text(s) => quote_literal(s),
        DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
    }
}

/// Column definition as it appears in `CREATE TABLE` / `ADD COLUMN`.
pub fn column_sql(column: &ColumnDef) -> String {
    let mut sql = format!(
        "{} {}",
        quote_ident(&column.name),
        column_type_sql(&column.column_type)
    );
    if !column.nullable && !column.primary_key {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default_sql(default));
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(fk) = &column.references {
        sql.push_str(&format!(
            " REFERENCES {} ({}) ON DELETE {} ON UPDATE CASCADE",
            quote_ident(&fk.table),
            quote_ident(&fk.column),
            fk.on_delete.as_sql()
        ));
    }
    sql
}

fn create_table_sql(table: &TableDef) -> Vec<String> {
    let mut parts: Vec<String> = table.columns.iter().map(column_sql).collect();
    let keys: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    let mut statements = vec![format!(
        "CREATE TABLE {} ({});",
        quote_ident(&table.name),
        parts.join(", ")
    )];
    for unique in &table.uniques {
        statements.push(add_unique_sql(&table.name, &unique.name, &unique.columns));
    }
    for index in &table.indexes {
        statements.push(create_index_sql(&table.name, &index.name, &index.columns, index.method));
    }
    statements
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn add_unique_sql(table: &str, name: &str, columns: &[String]) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
        quote_ident(table),
        quote_ident(name),
        column_list(columns)
    )
}

fn create_index_sql(table: &str, name: &str, columns: &[String], method: IndexMethod) -> String {
    let using = match method {
        IndexMethod::BTree => "",
        IndexMethod::Gist => " USING gist",
    };
    format!(
        "CREATE INDEX {} ON {}{} ({});",
        quote_ident(name),
        quote_ident(table),
        using,
        column_list(columns)
    )
}

/// Render one operation as the PostgreSQL statements that perform it.
pub fn render_op(op: &SchemaOp) -> Vec<String> {
    match op {
        SchemaOp::CreateEnum(def) => {
            let values: Vec<String> = def.values.iter().map(|v| quote_literal(v)).collect();
            vec![format!(
                "CREATE TYPE {} AS ENUM ({});",
                quote_ident(&def.name),
                values.join(", ")
            )]
        }
        SchemaOp::DropEnum { name } => vec![format!("DROP TYPE {};", quote_ident(name))],
        SchemaOp::CreateTable(def) => create_table_sql(def),
        SchemaOp::DropTable { name } => vec![format!("DROP TABLE {};", quote_ident(name))],
        SchemaOp::AddColumn { table, column } => vec![format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote_ident(table),
            column_sql(column)
        )],
        SchemaOp::RemoveColumn { table, column } => vec![format!(
            "ALTER TABLE {} DROP COLUMN {};",
            quote_ident(table),
            quote_ident(column)
        )],
        SchemaOp::RenameColumn { table, from, to } => vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {};",
            quote_ident(table),
            quote_ident(from),
            quote_ident(to)
        )],
        SchemaOp::AddUnique { table, unique } => {
            vec![add_unique_sql(table, &unique.name, &unique.columns)]
        }
        SchemaOp::RemoveUnique { table, name } => vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            quote_ident(table),
            quote_ident(name)
        )],
        SchemaOp::AddIndex { table, index } => vec![create_index_sql(
            table,
            &index.name,
            &index.columns,
            index.method,
        )],
        SchemaOp::RemoveIndex { name, .. } => vec![format!("DROP INDEX {};", quote_ident(name))],
        SchemaOp::PurgeRows { table, column } => vec![format!(
            "DELETE FROM {} WHERE {} IS NOT NULL;",
            quote_ident(table),
            quote_ident(column)
        )],
    }
}

/// Render a whole schema as DDL: enum types first, then tables in dependency order.
pub fn render_schema(schema: &Schema) -> Vec<String> {
    let mut statements: Vec<String> = schema
        .enums
        .values()
        .flat_map(|def| render_op(&SchemaOp::CreateEnum(def.clone())))
        .collect();
    for table in schema.tables_in_dependency_order() {
        statements.extend(create_table_sql(table));
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DeleteBehavior, EnumTypeDef, IndexDef, UniqueDef};

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("userId"), "\"userId\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_create_table_sql() {
        let table = TableDef::new("boards")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("serial", ColumnType::string()).not_null())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::SetNull));

        let sql = render_op(&SchemaOp::CreateTable(table));
        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"boards\" (\"id\" SERIAL, \"serial\" VARCHAR(255) NOT NULL, \
             \"userId\" INTEGER REFERENCES \"users\" (\"id\") ON DELETE SET NULL ON UPDATE CASCADE, \
             PRIMARY KEY (\"id\"));"
        );
    }

    #[test]
    fn test_enum_sql() {
        let sql = render_op(&SchemaOp::CreateEnum(EnumTypeDef::new(
            "enum_spots_type",
            ["charging", "hazard"],
        )));
        assert_eq!(
            sql,
            vec!["CREATE TYPE \"enum_spots_type\" AS ENUM ('charging', 'hazard');".to_string()]
        );
        assert_eq!(
            render_op(&SchemaOp::DropEnum {
                name: "enum_spots_type".into()
            }),
            vec!["DROP TYPE \"enum_spots_type\";".to_string()]
        );
    }

    #[test]
    fn test_column_with_default() {
        let role = ColumnDef::new("role", ColumnType::enum_type("enum_users_role"))
            .not_null()
            .with_default(DefaultValue::Text("user".into()));
        assert_eq!(
            column_sql(&role),
            "\"role\" \"enum_users_role\" NOT NULL DEFAULT 'user'"
        );
        assert_eq!(
            column_type_sql(&ColumnType::Geography),
            "GEOGRAPHY(POINT, 4326)"
        );
    }

    #[test]
    fn test_constraint_and_index_sql() {
        let unique = render_op(&SchemaOp::AddUnique {
            table: "mileages".into(),
            unique: UniqueDef::for_columns("mileages", &["boardId", "differenceSince"]),
        });
        assert_eq!(
            unique[0],
            "ALTER TABLE \"mileages\" ADD CONSTRAINT \"mileages_boardId_differenceSince_key\" \
             UNIQUE (\"boardId\", \"differenceSince\");"
        );

        let gist = render_op(&SchemaOp::AddIndex {
            table: "spots".into(),
            index: IndexDef::for_columns("spots", &["location"], IndexMethod::Gist),
        });
        assert_eq!(
            gist[0],
            "CREATE INDEX \"spots_location_idx\" ON \"spots\" USING gist (\"location\");"
        );
    }

    #[test]
    fn test_purge_sql() {
        let sql = render_op(&SchemaOp::PurgeRows {
            table: "citySubscriptions".into(),
            column: "deletedAt".into(),
        });
        assert_eq!(
            sql[0],
            "DELETE FROM \"citySubscriptions\" WHERE \"deletedAt\" IS NOT NULL;"
        );
    }
}
