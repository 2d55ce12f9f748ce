use crate::catalog::{ColumnDef, ColumnType, DeleteBehavior, EnumTypeDef, TableDef};
use crate::model::Entity;
use crate::storage::RowQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a board was bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseLocation {
    /// Bought in a shop.
    Retail,
    /// Bought from a web store.
    Online,
    /// Bought used.
    Secondhand,
}

impl PurchaseLocation {
    /// PostgreSQL enum type name.
    pub const TYPE_NAME: &'static str = "enum_boards_purchaseLocation";

    /// The enum type declaration.
    pub fn enum_type() -> EnumTypeDef {
        EnumTypeDef::new(Self::TYPE_NAME, ["retail", "online", "secondhand"])
    }
}

/// Board model line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardType {
    /// Street wheels.
    Street,
    /// All-terrain wheels.
    Offroad,
}

impl BoardType {
    /// PostgreSQL enum type name.
    pub const TYPE_NAME: &'static str = "enum_boards_type";

    /// The enum type declaration.
    pub fn enum_type() -> EnumTypeDef {
        EnumTypeDef::new(Self::TYPE_NAME, ["street", "offroad"])
    }
}

/// A registered board. Soft-deleted through `deletedAt`; orphaned when its owner is removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Manufacturer serial number, unique.
    pub serial: String,
    /// Name the owner gave the board.
    pub name: Option<String>,
    /// Motor serial number.
    pub motor_serial: Option<String>,
    /// Battery serial number.
    pub battery_serial: Option<String>,
    /// Where the board was bought.
    pub purchase_location: Option<PurchaseLocation>,
    /// Model line, stored in the `type` column.
    #[serde(rename = "type")]
    pub kind: Option<BoardType>,
    /// Owner; cleared when the owner is removed.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
    /// Set when soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Board {
    /// A new board with the given serial.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            ..Self::default()
        }
    }

    /// Assign an owner.
    pub fn owned_by(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Boards owned by a user.
    pub fn for_user(user_id: i64) -> RowQuery {
        RowQuery::new().eq("userId", user_id)
    }
}

impl Entity for Board {
    const TABLE: &'static str = "boards";
    const PARANOID: bool = true;

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("serial", ColumnType::string()).not_null())
            .with_column(ColumnDef::new("name", ColumnType::string()))
            .with_column(ColumnDef::new("motorSerial", ColumnType::string()))
            .with_column(ColumnDef::new("batterySerial", ColumnType::string()))
            .with_column(ColumnDef::new(
                "purchaseLocation",
                ColumnType::enum_type(PurchaseLocation::TYPE_NAME),
            ))
            .with_column(ColumnDef::new("type", ColumnType::enum_type(BoardType::TYPE_NAME)))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps())
            .with_column(ColumnDef::deleted_at())
            .with_unique(&["serial"])
    }

    fn enum_types() -> Vec<EnumTypeDef> {
        vec![PurchaseLocation::enum_type(), BoardType::enum_type()]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_type() {
        let board = Board {
            kind: Some(BoardType::Offroad),
            purchase_location: Some(PurchaseLocation::Secondhand),
            ..Board::new("BB-0001").owned_by(7)
        };
        let json = board.to_json().unwrap();
        assert_eq!(json["type"], "offroad");
        assert_eq!(json["purchaseLocation"], "secondhand");
        assert_eq!(json["userId"], 7);
    }
}
