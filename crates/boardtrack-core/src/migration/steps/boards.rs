//! Boards and their enumerated attributes.

use crate::catalog::{ColumnDef, ColumnType, DeleteBehavior, TableDef};
use crate::migration::{MigrationStep, SchemaBuilder};

pub const CREATE_BOARDS: MigrationStep =
    MigrationStep::new("20180315090100", "create-boards", create_boards, drop_boards);

fn create_boards(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("boards")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("serial", ColumnType::string()).not_null())
            .with_column(ColumnDef::new("name", ColumnType::string()))
            .with_column(ColumnDef::new("motorSerial", ColumnType::string()))
            .with_column(ColumnDef::new("batterySerial", ColumnType::string()))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::SetNull))
            .with_columns(ColumnDef::timestamps())
            .with_column(ColumnDef::deleted_at()),
    );
}

fn drop_boards(s: &mut SchemaBuilder) {
    s.drop_table("boards");
}

pub const ADD_PURCHASE_LOCATION_TO_BOARDS: MigrationStep = MigrationStep::new(
    "20180502093000",
    "add-purchase-location-to-boards",
    add_purchase_location,
    remove_purchase_location,
);

fn add_purchase_location(s: &mut SchemaBuilder) {
    s.create_enum(
        "enum_boards_purchaseLocation",
        ["retail", "online", "secondhand"],
    )
    .add_column(
        "boards",
        ColumnDef::new(
            "purchaseLocation",
            ColumnType::enum_type("enum_boards_purchaseLocation"),
        ),
    );
}

fn remove_purchase_location(s: &mut SchemaBuilder) {
    s.remove_column("boards", "purchaseLocation")
        .drop_enum("enum_boards_purchaseLocation");
}

pub const ADD_TYPE_TO_BOARDS: MigrationStep =
    MigrationStep::new("20180502094500", "add-type-to-boards", add_type, remove_type);

fn add_type(s: &mut SchemaBuilder) {
    s.create_enum("enum_boards_type", ["street", "offroad"])
        .add_column(
            "boards",
            ColumnDef::new("type", ColumnType::enum_type("enum_boards_type")),
        );
}

fn remove_type(s: &mut SchemaBuilder) {
    s.remove_column("boards", "type").drop_enum("enum_boards_type");
}

pub const BOARDS_SERIAL_UNIQUE: MigrationStep = MigrationStep::new(
    "20180516120000",
    "boards-serial-unique",
    add_serial_unique,
    remove_serial_unique,
);

fn add_serial_unique(s: &mut SchemaBuilder) {
    s.add_unique("boards", &["serial"]);
}

fn remove_serial_unique(s: &mut SchemaBuilder) {
    s.remove_unique("boards", &["serial"]);
}
