//! Core type definitions for the catalog.

use serde::{Deserialize, Serialize};

/// Spatial reference id used for every geography column (WGS 84).
pub const GEOGRAPHY_SRID: u32 = 4326;

/// Column data types supported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Auto-incrementing 32-bit integer (primary keys).
    Serial,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    BigInteger,
    /// Floating point.
    Float,
    /// Double precision floating point.
    Double,
    /// Variable length string with a maximum length.
    String(u32),
    /// Unbounded text.
    Text,
    /// Boolean value.
    Boolean,
    /// Timestamp with time zone.
    Timestamp,
    /// Calendar date without time.
    Date,
    /// A named enum type that must exist in the schema.
    Enum(String),
    /// PostGIS geography point in [`GEOGRAPHY_SRID`].
    Geography,
}

impl ColumnType {
    /// Sequelize-style default string column.
    pub fn string() -> Self {
        ColumnType::String(255)
    }

    /// Reference a named enum type.
    pub fn enum_type(name: impl Into<String>) -> Self {
        ColumnType::Enum(name.into())
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Serial
                | ColumnType::Integer
                | ColumnType::BigInteger
                | ColumnType::Float
                | ColumnType::Double
        )
    }

    /// Check if this type only holds whole numbers.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Serial | ColumnType::Integer | ColumnType::BigInteger
        )
    }

    /// Name of the enum type this column depends on, if any.
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            ColumnType::Enum(name) => Some(name),
            _ => None,
        }
    }
}

/// A named enumerated type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTypeDef {
    /// Type name, e.g. `enum_boards_type`.
    pub name: String,
    /// Allowed values in declaration order.
    pub values: Vec<String>,
}

impl EnumTypeDef {
    /// Create a new enum type.
    pub fn new(
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Enum type name for a column, following the `enum_<table>_<column>` convention.
    pub fn name_for(table: &str, column: &str) -> String {
        format!("enum_{table}_{column}")
    }

    /// Check if a value belongs to this enum.
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Index access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexMethod {
    /// Default b-tree index.
    BTree,
    /// GiST index, used for spatial proximity queries.
    Gist,
}
