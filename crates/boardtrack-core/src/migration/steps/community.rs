//! Spots, cities, city subscriptions and events.

use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, IndexMethod, TableDef};
use crate::migration::{MigrationStep, SchemaBuilder};

pub const CREATE_SPOTS: MigrationStep =
    MigrationStep::new("20181003091500", "create-spots", create_spots, drop_spots);

fn create_spots(s: &mut SchemaBuilder) {
    s.create_enum("enum_spots_type", ["charging", "hazard"])
        .create_table(
            TableDef::new("spots")
                .with_column(ColumnDef::id())
                .with_column(
                    ColumnDef::new("type", ColumnType::enum_type("enum_spots_type")).not_null(),
                )
                .with_column(ColumnDef::new("location", ColumnType::Geography).not_null())
                .with_column(ColumnDef::new("description", ColumnType::Text))
                .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::SetNull))
                .with_columns(ColumnDef::timestamps())
                .with_column(ColumnDef::deleted_at()),
        )
        .add_index("spots", &["location"], IndexMethod::Gist);
}

fn drop_spots(s: &mut SchemaBuilder) {
    s.drop_table("spots").drop_enum("enum_spots_type");
}

pub const CREATE_CITIES: MigrationStep =
    MigrationStep::new("20190306094500", "create-cities", create_cities, drop_cities);

fn create_cities(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("cities")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("name", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::new("center", ColumnType::Geography).not_null())
            .with_column(ColumnDef::new("radius", ColumnType::Float).not_null())
            .with_column(ColumnDef::new("timezone", ColumnType::string()).not_null())
            .with_columns(ColumnDef::timestamps()),
    )
    .add_index("cities", &["center"], IndexMethod::Gist);
}

fn drop_cities(s: &mut SchemaBuilder) {
    s.drop_table("cities");
}

pub const CREATE_CITY_SUBSCRIPTIONS: MigrationStep = MigrationStep::new(
    "20190306100000",
    "create-city-subscriptions",
    create_city_subscriptions,
    drop_city_subscriptions,
);

fn create_city_subscriptions(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("citySubscriptions")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("cityId", "cities", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
            .with_column(ColumnDef::deleted_at()),
    );
}

fn drop_city_subscriptions(s: &mut SchemaBuilder) {
    s.drop_table("citySubscriptions");
}

pub const CREATE_EVENTS: MigrationStep =
    MigrationStep::new("20190410140000", "create-events", create_events, drop_events);

fn create_events(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("events")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("name", ColumnType::string()).not_null())
            .with_column(ColumnDef::new("description", ColumnType::Text))
            .with_column(ColumnDef::new("startDate", ColumnType::Timestamp).not_null())
            .with_column(ColumnDef::new("endDate", ColumnType::Timestamp))
            .with_column(ColumnDef::new("publishedAt", ColumnType::Timestamp))
            .with_column(
                ColumnDef::new("published", ColumnType::Boolean)
                    .not_null()
                    .with_default(DefaultValue::Bool(false)),
            )
            .with_column(ColumnDef::foreign_key("cityId", "cities", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_events(s: &mut SchemaBuilder) {
    s.drop_table("events");
}

pub const CREATE_EVENT_REGISTRATIONS: MigrationStep = MigrationStep::new(
    "20190410141500",
    "create-event-registrations",
    create_event_registrations,
    drop_event_registrations,
);

fn create_event_registrations(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("eventRegistrations")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::foreign_key("eventId", "events", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
            .with_unique(&["eventId", "userId"]),
    );
}

fn drop_event_registrations(s: &mut SchemaBuilder) {
    s.drop_table("eventRegistrations");
}

pub const CREATE_MESSAGE_INTERACTIONS: MigrationStep = MigrationStep::new(
    "20190522093000",
    "create-message-interactions",
    create_message_interactions,
    drop_message_interactions,
);

fn create_message_interactions(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("messageInteractions")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::foreign_key("eventId", "events", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_column(ColumnDef::new("openedAt", ColumnType::Timestamp))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_message_interactions(s: &mut SchemaBuilder) {
    s.drop_table("messageInteractions");
}

pub const REMOVE_DELETED_AT_FROM_CITY_SUBSCRIPTIONS: MigrationStep = MigrationStep::new(
    "20190904160000",
    "remove-deleted-at-from-city-subscriptions",
    purge_and_drop_deleted_at,
    restore_deleted_at,
)
.lossy("soft-deleted citySubscriptions rows purged on apply are not restored");

fn purge_and_drop_deleted_at(s: &mut SchemaBuilder) {
    s.purge_rows("citySubscriptions", "deletedAt")
        .remove_column("citySubscriptions", "deletedAt");
}

fn restore_deleted_at(s: &mut SchemaBuilder) {
    s.add_column("citySubscriptions", ColumnDef::deleted_at());
}
