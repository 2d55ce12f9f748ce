//! Users and the credentials and device registrations hanging off them.

use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, TableDef};
use crate::migration::{MigrationStep, SchemaBuilder};

pub const CREATE_USERS: MigrationStep =
    MigrationStep::new("20180315090000", "create-users", create_users, drop_users);

fn create_users(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("users")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("email", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::new("password", ColumnType::string()))
            .with_column(ColumnDef::new("firstName", ColumnType::string()))
            .with_column(ColumnDef::new("lastName", ColumnType::string()))
            .with_column(ColumnDef::new("weight", ColumnType::Float))
            .with_column(ColumnDef::new("height", ColumnType::Float))
            .with_column(ColumnDef::new("gender", ColumnType::string()))
            .with_columns(ColumnDef::timestamps())
            .with_column(ColumnDef::deleted_at()),
    );
}

fn drop_users(s: &mut SchemaBuilder) {
    s.drop_table("users");
}

pub const CREATE_REFRESH_TOKENS: MigrationStep = MigrationStep::new(
    "20180404143000",
    "create-refresh-tokens",
    create_refresh_tokens,
    drop_refresh_tokens,
);

fn create_refresh_tokens(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("refreshTokens")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("token", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_refresh_tokens(s: &mut SchemaBuilder) {
    s.drop_table("refreshTokens");
}

pub const ADD_OAUTH_IDS_TO_USERS: MigrationStep = MigrationStep::new(
    "20180418110000",
    "add-oauth-ids-to-users",
    add_oauth_ids,
    remove_oauth_ids,
);

fn add_oauth_ids(s: &mut SchemaBuilder) {
    s.add_column("users", ColumnDef::new("facebookId", ColumnType::string()).unique())
        .add_column("users", ColumnDef::new("googleId", ColumnType::string()).unique());
}

fn remove_oauth_ids(s: &mut SchemaBuilder) {
    s.remove_column("users", "googleId")
        .remove_column("users", "facebookId");
}

pub const CREATE_PUSH_TOKENS: MigrationStep = MigrationStep::new(
    "20180829133000",
    "create-push-tokens",
    create_push_tokens,
    drop_push_tokens,
);

fn create_push_tokens(s: &mut SchemaBuilder) {
    s.create_enum("enum_pushTokens_platform", ["ios", "android"])
        .create_table(
            TableDef::new("pushTokens")
                .with_column(ColumnDef::id())
                .with_column(ColumnDef::new("token", ColumnType::string()).not_null().unique())
                .with_column(
                    ColumnDef::new("platform", ColumnType::enum_type("enum_pushTokens_platform"))
                        .not_null(),
                )
                .with_column(
                    ColumnDef::new("enabled", ColumnType::Boolean)
                        .not_null()
                        .with_default(DefaultValue::Bool(true)),
                )
                .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
                .with_columns(ColumnDef::timestamps()),
        );
}

fn drop_push_tokens(s: &mut SchemaBuilder) {
    s.drop_table("pushTokens")
        .drop_enum("enum_pushTokens_platform");
}

pub const ADD_ROLE_TO_USERS: MigrationStep =
    MigrationStep::new("20190123113000", "add-role-to-users", add_role, remove_role);

fn add_role(s: &mut SchemaBuilder) {
    s.create_enum("enum_users_role", ["user", "admin"]).add_column(
        "users",
        ColumnDef::new("role", ColumnType::enum_type("enum_users_role"))
            .not_null()
            .with_default(DefaultValue::Text("user".into())),
    );
}

fn remove_role(s: &mut SchemaBuilder) {
    s.remove_column("users", "role").drop_enum("enum_users_role");
}

pub const CREATE_SUBSCRIPTION_ARNS: MigrationStep = MigrationStep::new(
    "20190619111500",
    "create-subscription-arns",
    create_subscription_arns,
    drop_subscription_arns,
);

fn create_subscription_arns(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("subscriptionArns")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("arn", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps()),
    );
}

fn drop_subscription_arns(s: &mut SchemaBuilder) {
    s.drop_table("subscriptionArns");
}
