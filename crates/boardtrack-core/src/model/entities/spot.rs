use crate::catalog::{ColumnDef, ColumnType, DeleteBehavior, EnumTypeDef, IndexMethod, TableDef};
use crate::error::Error;
use crate::model::geo::{Coordinates, Geography};
use crate::model::{expose_coordinates, Entity};
use crate::storage::RowQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of point of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotType {
    /// A place to charge a board.
    Charging,
    /// A road hazard.
    Hazard,
}

impl SpotType {
    /// PostgreSQL enum type name.
    pub const TYPE_NAME: &'static str = "enum_spots_type";

    /// The enum type declaration.
    pub fn enum_type() -> EnumTypeDef {
        EnumTypeDef::new(Self::TYPE_NAME, ["charging", "hazard"])
    }

    fn as_str(self) -> &'static str {
        match self {
            SpotType::Charging => "charging",
            SpotType::Hazard => "hazard",
        }
    }
}

/// A user-reported charging spot or hazard. Soft-deleted through `deletedAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spot {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Spot kind, stored in the `type` column.
    #[serde(rename = "type")]
    pub kind: SpotType,
    /// Stored position.
    pub location: Geography,
    /// Free-form description.
    pub description: Option<String>,
    /// Reporting user.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
    /// Set when soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Spot {
    /// Create an unsaved Spot.
    pub fn new(kind: SpotType, coordinates: Coordinates) -> Self {
        Self {
            id: None,
            kind,
            location: Geography::from_coordinates(coordinates),
            description: None,
            user_id: None,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Decoded `[longitude, latitude]` of the location.
    pub fn coordinates(&self) -> Result<Coordinates, Error> {
        Ok(self.location.coordinates()?)
    }

    /// Replace the location.
    pub fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.location = Geography::from_coordinates(coordinates);
    }

    /// Spots of one kind.
    pub fn of_type(kind: SpotType) -> RowQuery {
        RowQuery::new().eq("type", kind.as_str())
    }
}

impl Entity for Spot {
    const TABLE: &'static str = "spots";
    const PARANOID: bool = true;

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(
                ColumnDef::new("type", ColumnType::enum_type(SpotType::TYPE_NAME)).not_null(),
            )
            .with_column(ColumnDef::new("location", ColumnType::Geography).not_null())
            .with_column(ColumnDef::new("description", ColumnType::Text))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps())
            .with_column(ColumnDef::deleted_at())
            .with_index(&["location"], IndexMethod::Gist)
    }

    fn enum_types() -> Vec<EnumTypeDef> {
        vec![SpotType::enum_type()]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn to_json(&self) -> Result<Value, Error> {
        expose_coordinates(serde_json::to_value(self)?, &["location"])
    }
}
