//! Entity definitions, one table each.
//!
//! Field names serialize in camelCase to match the column names. Every `table_def` must
//! describe the table exactly as the migration history leaves it.

mod board;
mod city;
mod event;
mod ride;
mod spot;
mod tokens;
mod user;

pub use board::{Board, BoardType, PurchaseLocation};
pub use city::{City, CitySubscription};
pub use event::{Event, EventRegistration, MessageInteraction};
pub use ride::{Breadcrumb, DailyAverage, Mileage, Ride};
pub use spot::{Spot, SpotType};
pub use tokens::{Platform, PushToken, RefreshToken, SubscriptionArn};
pub use user::{Role, User};

use serde_json::Value;

/// Remove private columns from a serialized entity.
fn without(mut value: Value, columns: &[&str]) -> Value {
    if let Value::Object(map) = &mut value {
        for column in columns {
            map.remove(*column);
        }
    }
    value
}
