use super::without;
use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, EnumTypeDef, TableDef};
use crate::error::Error;
use crate::model::Entity;
use crate::storage::RowQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A long-lived token exchanged for new access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Token value; never part of the public form.
    pub token: String,
    /// Owning user.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Create an unsaved RefreshToken.
    pub fn new(token: impl Into<String>, user_id: i64) -> Self {
        Self {
            id: None,
            token: token.into(),
            user_id: Some(user_id),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for RefreshToken {
    const TABLE: &'static str = "refreshTokens";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("token", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn to_json(&self) -> Result<Value, Error> {
        Ok(without(serde_json::to_value(self)?, &["token"]))
    }
}

/// Push notification platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Apple Push Notification service.
    Ios,
    /// Firebase Cloud Messaging.
    Android,
}

impl Platform {
    /// PostgreSQL enum type name.
    pub const TYPE_NAME: &'static str = "enum_pushTokens_platform";

    /// The enum type declaration.
    pub fn enum_type() -> EnumTypeDef {
        EnumTypeDef::new(Self::TYPE_NAME, ["ios", "android"])
    }
}

/// A device registered for push notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushToken {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Device token issued by the platform.
    pub token: String,
    /// Platform the token was issued by.
    pub platform: Platform,
    /// Whether notifications are sent to this device.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Owning user.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

fn enabled_by_default() -> bool {
    true
}

impl PushToken {
    /// An enabled device token.
    pub fn new(token: impl Into<String>, platform: Platform, user_id: i64) -> Self {
        Self {
            id: None,
            token: token.into(),
            platform,
            enabled: true,
            user_id: Some(user_id),
            created_at: None,
            updated_at: None,
        }
    }

    /// Devices a user can currently be notified on.
    pub fn enabled_for_user(user_id: i64) -> RowQuery {
        RowQuery::new().eq("userId", user_id).eq("enabled", true)
    }
}

impl Entity for PushToken {
    const TABLE: &'static str = "pushTokens";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("token", ColumnType::string()).not_null().unique())
            .with_column(
                ColumnDef::new("platform", ColumnType::enum_type(Platform::TYPE_NAME)).not_null(),
            )
            .with_column(
                ColumnDef::new("enabled", ColumnType::Boolean)
                    .not_null()
                    .with_default(DefaultValue::Bool(true)),
            )
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
    }

    fn enum_types() -> Vec<EnumTypeDef> {
        vec![Platform::enum_type()]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// A notification-service endpoint subscription for a user's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionArn {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Endpoint ARN.
    pub arn: String,
    /// Owning user.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionArn {
    /// Create an unsaved SubscriptionArn.
    pub fn new(arn: impl Into<String>, user_id: i64) -> Self {
        Self {
            id: None,
            arn: arn.into(),
            user_id: Some(user_id),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for SubscriptionArn {
    const TABLE: &'static str = "subscriptionArns";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("arn", ColumnType::string()).not_null().unique())
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_is_never_exposed() {
        let json = RefreshToken::new("secret", 1).to_json().unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["userId"], 1);
    }

    #[test]
    fn test_push_token_enabled_default() {
        let token: PushToken = serde_json::from_value(serde_json::json!({
            "token": "abc",
            "platform": "android",
        }))
        .unwrap();
        assert!(token.enabled);
        assert_eq!(token.platform, Platform::Android);
    }
}
