//! Rides, breadcrumbs and mileage tracking.

use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, TableDef};
use crate::migration::{MigrationStep, SchemaBuilder};

pub const CREATE_RIDES: MigrationStep =
    MigrationStep::new("20180315090200", "create-rides", create_rides, drop_rides);

fn create_rides(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("rides")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("startTime", ColumnType::Timestamp).not_null())
            .with_column(ColumnDef::new("endTime", ColumnType::Timestamp))
            .with_column(ColumnDef::new("distance", ColumnType::Float))
            .with_column(ColumnDef::new("averageSpeed", ColumnType::Float))
            .with_column(
                ColumnDef::new("shared", ColumnType::Boolean)
                    .not_null()
                    .with_default(DefaultValue::Bool(false)),
            )
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("boardId", "boards", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_rides(s: &mut SchemaBuilder) {
    s.drop_table("rides");
}

pub const CREATE_BREADCRUMBS: MigrationStep = MigrationStep::new(
    "20180315090300",
    "create-breadcrumbs",
    create_breadcrumbs,
    drop_breadcrumbs,
);

fn create_breadcrumbs(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("breadcrumbs")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("timestamp", ColumnType::Timestamp).not_null())
            .with_column(ColumnDef::new("location", ColumnType::Geography).not_null())
            .with_column(ColumnDef::new("altitude", ColumnType::Float))
            .with_column(ColumnDef::foreign_key("rideId", "rides", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_breadcrumbs(s: &mut SchemaBuilder) {
    s.drop_table("breadcrumbs");
}

pub const CREATE_MILEAGES: MigrationStep =
    MigrationStep::new("20180322101500", "create-mileages", create_mileages, drop_mileages);

fn create_mileages(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("mileages")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("boardId", ColumnType::string()).not_null())
            .with_column(ColumnDef::new("total", ColumnType::Float).not_null())
            .with_column(ColumnDef::new("difference", ColumnType::Float))
            .with_column(ColumnDef::new("differenceSince", ColumnType::Timestamp))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_mileages(s: &mut SchemaBuilder) {
    s.drop_table("mileages");
}

pub const RENAME_RIDE_MAP_MEASUREMENTS: MigrationStep = MigrationStep::new(
    "20180607150000",
    "rename-ride-map-measurements",
    rename_to_map,
    rename_from_map,
);

fn rename_to_map(s: &mut SchemaBuilder) {
    s.rename_column("rides", "distance", "mapDistance")
        .rename_column("rides", "averageSpeed", "mapAverageSpeed");
}

fn rename_from_map(s: &mut SchemaBuilder) {
    s.rename_column("rides", "mapAverageSpeed", "averageSpeed")
        .rename_column("rides", "mapDistance", "distance");
}

pub const ADD_BOARD_MEASUREMENTS_TO_RIDES: MigrationStep = MigrationStep::new(
    "20180607151500",
    "add-board-measurements-to-rides",
    add_board_measurements,
    remove_board_measurements,
);

fn add_board_measurements(s: &mut SchemaBuilder) {
    s.add_column("rides", ColumnDef::new("boardDistance", ColumnType::Float))
        .add_column("rides", ColumnDef::new("boardAverageSpeed", ColumnType::Float));
}

fn remove_board_measurements(s: &mut SchemaBuilder) {
    s.remove_column("rides", "boardAverageSpeed")
        .remove_column("rides", "boardDistance");
}

pub const ADD_TELEMETRY_TO_BREADCRUMBS: MigrationStep = MigrationStep::new(
    "20180711100000",
    "add-telemetry-to-breadcrumbs",
    add_telemetry,
    remove_telemetry,
);

fn add_telemetry(s: &mut SchemaBuilder) {
    s.add_column("breadcrumbs", ColumnDef::new("speed", ColumnType::Float))
        .add_column("breadcrumbs", ColumnDef::new("batteryPercent", ColumnType::Integer))
        .add_column("breadcrumbs", ColumnDef::new("power", ColumnType::Float))
        .add_column("breadcrumbs", ColumnDef::new("mode", ColumnType::string()))
        .add_column(
            "breadcrumbs",
            ColumnDef::new("alternativeMove", ColumnType::Boolean)
                .not_null()
                .with_default(DefaultValue::Bool(false)),
        );
}

fn remove_telemetry(s: &mut SchemaBuilder) {
    s.remove_column("breadcrumbs", "alternativeMove")
        .remove_column("breadcrumbs", "mode")
        .remove_column("breadcrumbs", "power")
        .remove_column("breadcrumbs", "batteryPercent")
        .remove_column("breadcrumbs", "speed");
}

pub const CREATE_DAILY_AVERAGES: MigrationStep = MigrationStep::new(
    "20181114160000",
    "create-daily-averages",
    create_daily_averages,
    drop_daily_averages,
);

fn create_daily_averages(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("dailyAverages")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("date", ColumnType::Date).not_null())
            .with_column(ColumnDef::new("distance", ColumnType::Float).not_null())
            .with_column(ColumnDef::foreign_key("mileageId", "mileages", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_daily_averages(s: &mut SchemaBuilder) {
    s.drop_table("dailyAverages");
}

pub const MILEAGES_BOARD_SINCE_UNIQUE: MigrationStep = MigrationStep::new(
    "20181205104500",
    "mileages-board-since-unique",
    add_board_since_unique,
    remove_board_since_unique,
);

fn add_board_since_unique(s: &mut SchemaBuilder) {
    s.add_unique("mileages", &["boardId", "differenceSince"]);
}

fn remove_board_since_unique(s: &mut SchemaBuilder) {
    s.remove_unique("mileages", &["boardId", "differenceSince"]);
}
