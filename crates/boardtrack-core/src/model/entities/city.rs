use crate::catalog::{ColumnDef, ColumnType, DeleteBehavior, IndexMethod, TableDef};
use crate::error::Error;
use crate::model::geo::{Coordinates, Geography};
use crate::model::{expose_coordinates, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A city with a riding community, described by a center point and radius in kilometers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Center point.
    pub center: Geography,
    /// Radius in kilometers.
    pub radius: f64,
    /// IANA time zone name.
    pub timezone: String,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl City {
    /// Create an unsaved City.
    pub fn new(
        name: impl Into<String>,
        center: Coordinates,
        radius: f64,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            center: Geography::from_coordinates(center),
            radius,
            timezone: timezone.into(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Decoded `[longitude, latitude]` of the center.
    pub fn center(&self) -> Result<Coordinates, Error> {
        Ok(self.center.coordinates()?)
    }

    /// Replace the center point.
    pub fn set_center(&mut self, center: Coordinates) {
        self.center = Geography::from_coordinates(center);
    }
}

impl Entity for City {
    const TABLE: &'static str = "cities";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("name", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::new("center", ColumnType::Geography).not_null())
            .with_column(ColumnDef::new("radius", ColumnType::Float).not_null())
            .with_column(ColumnDef::new("timezone", ColumnType::string()).not_null())
            .with_columns(ColumnDef::timestamps())
            .with_index(&["center"], IndexMethod::Gist)
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn to_json(&self) -> Result<Value, Error> {
        expose_coordinates(serde_json::to_value(self)?, &["center"])
    }
}

/// Join row between a user and a city they follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitySubscription {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Subscribed user.
    pub user_id: Option<i64>,
    /// Followed city.
    pub city_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CitySubscription {
    /// Create an unsaved CitySubscription.
    pub fn new(user_id: i64, city_id: i64) -> Self {
        Self {
            id: None,
            user_id: Some(user_id),
            city_id: Some(city_id),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for CitySubscription {
    const TABLE: &'static str = "citySubscriptions";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("cityId", "cities", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}
