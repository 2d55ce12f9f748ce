use super::without;
use crate::catalog::{ColumnDef, ColumnType, DefaultValue, EnumTypeDef, TableDef};
use crate::error::Error;
use crate::model::Entity;
use crate::storage::RowQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular rider.
    #[default]
    User,
    /// Can manage cities and events.
    Admin,
}

impl Role {
    /// PostgreSQL enum type name.
    pub const TYPE_NAME: &'static str = "enum_users_role";

    /// The enum type declaration.
    pub fn enum_type() -> EnumTypeDef {
        EnumTypeDef::new(Self::TYPE_NAME, ["user", "admin"])
    }
}

/// A rider account. Soft-deleted through `deletedAt`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Login email, unique across live and soft-deleted users.
    pub email: String,
    /// Password hash.
    pub password: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Body weight in kilograms.
    pub weight: Option<f64>,
    /// Height in centimeters.
    pub height: Option<f64>,
    /// Self-described gender.
    pub gender: Option<String>,
    /// Facebook account id for OAuth sign-in.
    pub facebook_id: Option<String>,
    /// Google account id for OAuth sign-in.
    pub google_id: Option<String>,
    /// Account role, `user` unless set.
    #[serde(default)]
    pub role: Role,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
    /// Set when soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// A new user with the given email and every other field unset.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    /// Live or deleted user by email.
    pub fn by_email(email: &str) -> RowQuery {
        RowQuery::new().eq("email", email)
    }

    /// Whether the user has the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const PARANOID: bool = true;

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("email", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::new("password", ColumnType::string()))
            .with_column(ColumnDef::new("firstName", ColumnType::string()))
            .with_column(ColumnDef::new("lastName", ColumnType::string()))
            .with_column(ColumnDef::new("weight", ColumnType::Float))
            .with_column(ColumnDef::new("height", ColumnType::Float))
            .with_column(ColumnDef::new("gender", ColumnType::string()))
            .with_column(ColumnDef::new("facebookId", ColumnType::string()).unique())
            .with_column(ColumnDef::new("googleId", ColumnType::string()).unique())
            .with_column(
                ColumnDef::new("role", ColumnType::enum_type(Role::TYPE_NAME))
                    .not_null()
                    .with_default(DefaultValue::Text("user".into())),
            )
            .with_columns(ColumnDef::timestamps())
            .with_column(ColumnDef::deleted_at())
    }

    fn enum_types() -> Vec<EnumTypeDef> {
        vec![Role::enum_type()]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn to_json(&self) -> Result<Value, Error> {
        Ok(without(serde_json::to_value(self)?, &["password"]))
    }
}
