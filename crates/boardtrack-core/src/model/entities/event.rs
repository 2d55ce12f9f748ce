use crate::catalog::{ColumnDef, ColumnType, DefaultValue, DeleteBehavior, TableDef};
use crate::model::Entity;
use crate::storage::{timestamp_value, Predicate, RowQuery, SortDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A community event in a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// When the event starts.
    pub start_date: DateTime<Utc>,
    /// When the event ends, if known.
    pub end_date: Option<DateTime<Utc>>,
    /// When the event becomes visible.
    pub published_at: Option<DateTime<Utc>>,
    /// Whether the event is published at all.
    #[serde(default)]
    pub published: bool,
    /// City hosting the event.
    pub city_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    /// An unpublished event.
    pub fn new(name: impl Into<String>, start_date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            start_date,
            end_date: None,
            published_at: None,
            published: false,
            city_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Publish at a given time. The event stays hidden until then.
    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published = true;
        self.published_at = Some(at);
        self
    }

    /// Events clients may see at `now`: published with a publish date already reached.
    pub fn visible(now: DateTime<Utc>) -> RowQuery {
        RowQuery::new()
            .eq("published", true)
            .filter(Predicate::IsNotNull("publishedAt".into()))
            .filter(Predicate::Lte("publishedAt".into(), timestamp_value(now)))
            .order_by("startDate", SortDirection::Asc)
    }

    /// Whether [`Event::visible`] would return this event at `now`.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.published && self.published_at.is_some_and(|at| at <= now)
    }
}

impl Entity for Event {
    const TABLE: &'static str = "events";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
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
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// A user's registration for an event. One per user and event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistration {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Registered event.
    pub event_id: Option<i64>,
    /// Registered user.
    pub user_id: Option<i64>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl EventRegistration {
    /// Create an unsaved EventRegistration.
    pub fn new(event_id: i64, user_id: i64) -> Self {
        Self {
            id: None,
            event_id: Some(event_id),
            user_id: Some(user_id),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for EventRegistration {
    const TABLE: &'static str = "eventRegistrations";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::foreign_key("eventId", "events", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_columns(ColumnDef::timestamps())
            .with_unique(&["eventId", "userId"])
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}

/// Records that a user was sent (and possibly opened) a message about an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInteraction {
    /// Primary key, `None` until inserted.
    pub id: Option<i64>,
    /// Event the message was about.
    pub event_id: Option<i64>,
    /// Recipient.
    pub user_id: Option<i64>,
    /// When the recipient opened the message.
    pub opened_at: Option<DateTime<Utc>>,
    /// Set on insert.
    pub created_at: Option<DateTime<Utc>>,
    /// Set on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MessageInteraction {
    /// An unopened message.
    pub fn new(event_id: i64, user_id: i64) -> Self {
        Self {
            id: None,
            event_id: Some(event_id),
            user_id: Some(user_id),
            opened_at: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for MessageInteraction {
    const TABLE: &'static str = "messageInteractions";

    fn table_def() -> TableDef {
        TableDef::new(Self::TABLE)
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::foreign_key("eventId", "events", DeleteBehavior::Cascade))
            .with_column(ColumnDef::foreign_key("userId", "users", DeleteBehavior::Cascade))
            .with_column(ColumnDef::new("openedAt", ColumnType::Timestamp))
            .with_columns(ColumnDef::timestamps())
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
}
