use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, TableDef};
use crate::error::Error;
use crate::model::geo::{Coordinates, Geography};
use crate::model::{expose_coordinates, Entity};
use crate::storage::{RowQuery, SortDirection};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded ride.
///
/// `mapDistance` / `mapAverageSpeed` come from the phone's GPS track, `boardDistance` /
/// `boardAverageSpeed` from the board's own odometer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// When the ride started.
    pub start_time: DateTime<Utc>,
    /// When the ride ended.
    pub end_time: Option<DateTime<Utc>>,
    /// Distance from the GPS track, in kilometers.
    pub map_distance: Option<f64>,
    /// Average speed from the GPS track, in km/h.
    pub map_average_speed: Option<f64>,
    /// Distance from the board odometer, in kilometers.
    pub board_distance: Option<f64>,
    /// Average speed from the board, in km/h.
    pub board_average_speed: Option<f64>,
    /// Visible to other riders.
    #[serde(default)]
    pub shared: bool,
    /// Rider; rides go with their user.
    pub user_id: Option<i64>,
    /// Board ridden, if known.
    pub board_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ride {
    /// A ride starting at `start_time` with nothing else recorded.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            start_time,
            end_time: None,
            map_distance: None,
            map_average_speed: None,
            board_distance: None,
            board_average_speed: None,
            shared: false,
            user_id: None,
            board_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// A user's rides, newest first.
    pub fn for_user(user_id: i64) -> RowQuery {
        RowQuery::new()
            .eq("userId", user_id)
            .order_by("startTime", SortDirection::Desc)
    }
}

impl Entity for Ride {
    const TABLE: &'static str = "rides";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("startTime", ColumnType::Timestamp).not_null())
            .with_column(ColumnDef::new("endTime", ColumnType::Timestamp))
            .with_column(ColumnDef::new("mapDistance", ColumnType::Float))
            .with_column(ColumnDef::new("mapAverageSpeed", ColumnType::Float))
            .with_column(ColumnDef::new("boardDistance", ColumnType::Float))
            .with_column(ColumnDef::new("boardAverageSpeed", ColumnType::Float))
            .with_column(
                ColumnDef::new("shared", ColumnType::Boolean)
                    .not_null()
                    .with_default(DefaultValue::Bool(false)),
            )
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("boardId", "boards", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// A single GPS sample of a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Stored position.
    pub location: Geography,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Speed in km/h.
    pub speed: Option<f64>,
    /// Board battery level.
    pub battery_percent: Option<i32>,
    /// Motor power draw in watts.
    pub power: Option<f64>,
    /// Riding mode reported by the board.
    pub mode: Option<String>,
    /// Sample recorded while not riding the board.
    #[serde(default)]
    pub alternative_move: bool,
    /// Ride the sample belongs to.
    pub ride_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Breadcrumb {
    /// Create an unsaved Breadcrumb.
    pub fn new(timestamp: DateTime<Utc>, coordinates: Coordinates) -> Self {
        Self {
            id: None,
            timestamp,
            location: Geography::from_coordinates(coordinates),
            altitude: None,
            speed: None,
            battery_percent: None,
            power: None,
            mode: None,
            alternative_move: false,
            ride_id: None,
            created_at: None,
            updated_at: None,
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

    /// Samples of one ride in time order.
    pub fn for_ride(ride_id: i64) -> RowQuery {
        RowQuery::new()
            .eq("rideId", ride_id)
            .order_by("timestamp", SortDirection::Asc)
    }
}

impl Entity for Breadcrumb {
    const TABLE: &'static str = "breadcrumbs";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("timestamp", ColumnType::Timestamp).not_null())
            .with_column(ColumnDef::new("location", ColumnType::Geography).not_null())
            .with_column(ColumnDef::new("altitude", ColumnType::Float))
            .with_column(ColumnDef::new("speed", ColumnType::Float))
            .with_column(ColumnDef::new("batteryPercent", ColumnType::Integer))
            .with_column(ColumnDef::new("power", ColumnType::Float))
            .with_column(ColumnDef::new("mode", ColumnType::string()))
            .with_column(
                ColumnDef::new("alternativeMove", ColumnType::Boolean)
                    .not_null()
                    .with_default(DefaultValue::Bool(false)),
            )
            .with_column(ColumnDef::foreign_key("rideId", "rides", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn to_json(&self) -> Result<Value, Error> {
        expose_coordinates(serde_json::to_value(self)?, &["location"])
    }
}

/// An odometer reading reported by a board.
///
/// `boardId` holds the board's own identifier as reported over Bluetooth, not a `boards.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mileage {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Board identifier as reported by the board.
    pub board_id: String,
    /// Odometer total in kilometers.
    pub total: f64,
    /// Kilometers since `difference_since`.
    pub difference: Option<f64>,
    /// Baseline of `difference`; unique per board when set.
    pub difference_since: Option<DateTime<Utc>>,
    /// Reporting user.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Mileage {
    /// Create an unsaved Mileage.
    pub fn new(board_id: impl Into<String>, total: f64) -> Self {
        Self {
            id: None,
            board_id: board_id.into(),
            total,
            difference: None,
            difference_since: None,
            user_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Readings of one board, latest first.
    pub fn for_board(board_id: &str) -> RowQuery {
        RowQuery::new()
            .eq("boardId", board_id)
            .order_by("createdAt", SortDirection::Desc)
    }
}

impl Entity for Mileage {
    const TABLE: &'static str = "mileages";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("boardId", ColumnType::string()).not_null())
            .with_column(ColumnDef::new("total", ColumnType::Float).not_null())
            .with_column(ColumnDef::new("difference", ColumnType::Float))
            .with_column(ColumnDef::new("differenceSince", ColumnType::Timestamp))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
            .with_unique(&["boardId", "differenceSince"])
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// Distance covered on one calendar day, derived from mileage readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAverage {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Calendar day.
    pub date: NaiveDate,
    /// Kilometers covered that day.
    pub distance: f64,
    /// Reading the value was derived from.
    pub mileage_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl DailyAverage {
    /// Create an unsaved DailyAverage.
    pub fn new(date: NaiveDate, distance: f64) -> Self {
        Self {
            id: None,
            date,
            distance,
            mileage_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for DailyAverage {
    const TABLE: &'static str = "dailyAverages";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("date", ColumnType::Date).not_null())
            .with_column(ColumnDef::new("distance", ColumnType::Float).not_null())
            .with_column(ColumnDef::foreign_key("mileageId", "mileages", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}
