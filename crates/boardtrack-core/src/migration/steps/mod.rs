//! The boardtrack schema history, oldest first.

mod accounts;
mod boards;
mod community;
mod rides;

use super::MigrationStep;

static STEPS: [MigrationStep; 25] = [
    accounts::CREATE_USERS,
    boards::CREATE_BOARDS,
    rides::CREATE_RIDES,
    rides::CREATE_BREADCRUMBS,
    rides::CREATE_MILEAGES,
    accounts::CREATE_REFRESH_TOKENS,
    accounts::ADD_OAUTH_IDS_TO_USERS,
    boards::ADD_PURCHASE_LOCATION_TO_BOARDS,
    boards::ADD_TYPE_TO_BOARDS,
    boards::BOARDS_SERIAL_UNIQUE,
    rides::RENAME_RIDE_MAP_MEASUREMENTS,
    rides::ADD_BOARD_MEASUREMENTS_TO_RIDES,
    rides::ADD_TELEMETRY_TO_BREADCRUMBS,
    accounts::CREATE_PUSH_TOKENS,
    community::CREATE_SPOTS,
    rides::CREATE_DAILY_AVERAGES,
    rides::MILEAGES_BOARD_SINCE_UNIQUE,
    accounts::ADD_ROLE_TO_USERS,
    community::CREATE_CITIES,
    community::CREATE_CITY_SUBSCRIPTIONS,
    community::CREATE_EVENTS,
    community::CREATE_EVENT_REGISTRATIONS,
    community::CREATE_MESSAGE_INTERACTIONS,
    accounts::CREATE_SUBSCRIPTION_ARNS,
    community::REMOVE_DELETED_AT_FROM_CITY_SUBSCRIPTIONS,
];

/// Every step in version order.
pub fn all() -> &'static [MigrationStep] {
    &STEPS
}

/// Look up a step by version or by `<version>-<name>` id.
pub fn find(version: &str) -> Option<&'static MigrationStep> {
    STEPS
        .iter()
        .find(|s| s.version == version || s.id() == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Schema, SchemaOp};
    use crate::migration::{cumulative_schema, validate_sequence};

    #[test]
    fn test_sequence_is_ordered() {
        assert!(validate_sequence(all()).is_ok());
        assert_eq!(all().len(), 25);
    }

    #[test]
    fn test_every_prefix_reverts_to_baseline() {
        for n in 1..=all().len() {
            let mut schema = cumulative_schema(&all()[..n]).unwrap();
            for step in all()[..n].iter().rev() {
                schema
                    .apply_all(&step.revert_ops())
                    .unwrap_or_else(|e| panic!("reverting {} failed: {e}", step.id()));
            }
            assert_eq!(schema, Schema::new(), "prefix of {n} steps");
        }
    }

    #[test]
    fn test_enum_columns_drop_their_types_on_revert() {
        for step in all() {
            let created: Vec<_> = step
                .apply_ops()
                .into_iter()
                .filter_map(|op| match op {
                    SchemaOp::CreateEnum(def) => Some(def.name),
                    _ => None,
                })
                .collect();
            for name in created {
                assert!(
                    step.revert_ops()
                        .iter()
                        .any(|op| matches!(op, SchemaOp::DropEnum { name: n } if *n == name)),
                    "{} does not drop {name}",
                    step.id()
                );
            }
        }
    }

    #[test]
    fn test_destructive_steps_are_lossy() {
        let lossy: Vec<_> = all()
            .iter()
            .filter(|s| s.lossy_revert().is_some())
            .map(|s| s.name)
            .collect();
        assert_eq!(lossy, vec!["remove-deleted-at-from-city-subscriptions"]);
        assert!(all()
            .iter()
            .filter(|s| s.apply_ops().iter().any(SchemaOp::destroys_data))
            .all(|s| s.lossy_revert().is_some()));
    }

    #[test]
    fn test_find() {
        assert_eq!(find("20180516120000").map(|s| s.name), Some("boards-serial-unique"));
        assert_eq!(
            find("20180516120000-boards-serial-unique").map(|s| s.version),
            Some("20180516120000")
        );
        assert!(find("19700101000000").is_none());
    }
}
