//! Integration tests for the model layer on a fully migrated embedded store.

use boardtrack_core::error::{ConstraintError, Error};
use boardtrack_core::migration::{steps, DownTarget, MigrationEngine, MigrationError};
use boardtrack_core::model::associations;
use boardtrack_core::model::{
    Board, BoardType, City, CitySubscription, Coordinates, Entity, Event, EventRegistration,
    MessageInteraction, Mileage, Platform, PushToken, Repository, Ride, Spot, SpotType, User,
};
use boardtrack_core::storage::{EmbeddedStore, Predicate, RowQuery, RowStore};
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

struct TestContext {
    store: EmbeddedStore,
}

impl TestContext {
    fn migrated() -> Self {
        let store = EmbeddedStore::temporary().unwrap();
        MigrationEngine::new(&store, steps::all()).up(None).unwrap();
        Self { store }
    }

    fn repo<E: Entity>(&self) -> Repository<'_, EmbeddedStore, E> {
        Repository::new(&self.store)
    }

    fn user(&self, email: &str) -> User {
        self.repo::<User>().create(&User::new(email)).unwrap()
    }
}

fn unique_violation(result: Result<impl std::fmt::Debug, Error>) -> bool {
    matches!(
        result,
        Err(Error::ConstraintViolation(ConstraintError::UniqueViolation { .. }))
    )
}

#[test]
fn test_spot_location_round_trip() {
    let ctx = TestContext::migrated();
    let spots = ctx.repo::<Spot>();

    let coordinates = Coordinates::from_pair([-122.42, 37.77]).unwrap();
    let created = spots.create(&Spot::new(SpotType::Charging, coordinates)).unwrap();
    assert!(created.location.as_stored().starts_with("0101000020E6100000"));

    let found = spots.find(created.id.unwrap()).unwrap().unwrap();
    assert_eq!(found.coordinates().unwrap().to_pair(), [-122.42, 37.77]);

    let public = found.to_json().unwrap();
    assert_eq!(public["location"], json!([-122.42, 37.77]));
    assert_eq!(public["type"], json!("charging"));
}

#[test]
fn test_spots_by_type() {
    let ctx = TestContext::migrated();
    let spots = ctx.repo::<Spot>();
    let here = Coordinates::new(13.4, 52.52).unwrap();

    spots.create(&Spot::new(SpotType::Charging, here)).unwrap();
    let hazard = spots.create(&Spot::new(SpotType::Hazard, here)).unwrap();
    spots.create(&Spot::new(SpotType::Hazard, here)).unwrap();

    assert_eq!(spots.list(Spot::of_type(SpotType::Hazard)).unwrap().len(), 2);
    spots.destroy(hazard.id.unwrap()).unwrap();
    assert_eq!(spots.list(Spot::of_type(SpotType::Hazard)).unwrap().len(), 1);
}

#[test]
fn test_user_soft_delete_and_restore() {
    let ctx = TestContext::migrated();
    let users = ctx.repo::<User>();
    let user = ctx.user("rider@example.com");
    let id = user.id.unwrap();

    users.destroy(id).unwrap();
    assert!(users.find(id).unwrap().is_none());
    assert!(users.find_one(User::by_email("rider@example.com")).unwrap().is_none());
    assert_eq!(users.count(RowQuery::new()).unwrap(), 0);

    let deleted = users.find_with_deleted(id).unwrap().unwrap();
    assert!(deleted.deleted_at.is_some());
    assert_eq!(ctx.store.count("users", &RowQuery::new()).unwrap(), 1);

    // a soft-deleted email still holds its unique slot
    assert!(unique_violation(users.create(&User::new("rider@example.com"))));

    let restored = users.restore(id).unwrap();
    assert!(restored.deleted_at.is_none());
    assert_eq!(users.find(id).unwrap().map(|u| u.email), Some("rider@example.com".into()));
}

#[test]
fn test_destroy_missing_user() {
    let ctx = TestContext::migrated();
    assert!(matches!(ctx.repo::<User>().destroy(42), Err(Error::NotFound)));
    assert!(matches!(ctx.repo::<User>().restore(42), Err(Error::NotFound)));
}

#[test]
fn test_user_defaults_and_public_form() {
    let ctx = TestContext::migrated();
    let mut user = User::new("admin@example.com");
    user.password = Some("$2b$10$hash".into());
    let user = ctx.repo::<User>().create(&user).unwrap();

    assert!(!user.is_admin());
    assert!(user.created_at.is_some());
    assert_eq!(user.created_at, user.updated_at);

    let public = user.to_json().unwrap();
    assert!(public.get("password").is_none());
    assert_eq!(public["role"], json!("user"));
}

#[test]
fn test_update_live_and_deleted_rows() {
    let ctx = TestContext::migrated();
    let users = ctx.repo::<User>();
    let mut user = ctx.user("update@example.com");

    user.first_name = Some("Ada".into());
    user.weight = Some(61.5);
    let updated = users.update(&user).unwrap();
    assert_eq!(updated.first_name.as_deref(), Some("Ada"));
    assert_eq!(updated.weight, Some(61.5));
    assert_eq!(updated.created_at, user.created_at);

    users.destroy(user.id.unwrap()).unwrap();
    assert!(matches!(users.update(&updated), Err(Error::NotFound)));
    assert!(matches!(users.update(&User::new("x@example.com")), Err(Error::InvalidData(_))));
}

#[test]
fn test_restore_needs_paranoid_entity() {
    let ctx = TestContext::migrated();
    let rides = ctx.repo::<Ride>();
    let ride = rides.create(&Ride::new(Utc::now())).unwrap();

    assert!(matches!(rides.restore(ride.id.unwrap()), Err(Error::InvalidData(_))));
    rides.destroy(ride.id.unwrap()).unwrap();
    assert_eq!(ctx.store.count("rides", &RowQuery::new()).unwrap(), 0);
}

#[test]
fn test_board_serial_unique_and_its_revert() {
    let store = EmbeddedStore::temporary().unwrap();
    let engine = MigrationEngine::new(&store, steps::all());
    engine.up(Some("20180516120000")).unwrap();

    let boards = Repository::<EmbeddedStore, Board>::new(&store);
    boards.create(&Board::new("SN-1")).unwrap();
    assert!(unique_violation(boards.create(&Board::new("SN-1"))));

    engine.down(DownTarget::Last).unwrap();
    boards.create(&Board::new("SN-1")).unwrap();
    assert_eq!(boards.count(RowQuery::new()).unwrap(), 2);

    let err = engine.up(None).unwrap_err();
    assert!(
        matches!(&err, MigrationError::SchemaConflict { version, .. } if version == "20180516120000"),
        "{err}"
    );
    assert_eq!(
        engine.status().unwrap().current_version(),
        Some("20180502094500")
    );
}

#[test]
fn test_force_destroy_user_applies_delete_actions() {
    let ctx = TestContext::migrated();
    let user = ctx.user("owner@example.com");
    let user_id = user.id.unwrap();

    let mut board = Board::new("SN-7").owned_by(user_id);
    board.kind = Some(BoardType::Street);
    let board = ctx.repo::<Board>().create(&board).unwrap();

    let mut ride = Ride::new(Utc::now());
    ride.user_id = Some(user_id);
    ride.board_id = board.id;
    ctx.repo::<Ride>().create(&ride).unwrap();
    ctx.repo::<PushToken>()
        .create(&PushToken::new("apns-1", Platform::Ios, user_id))
        .unwrap();

    assert_eq!(associations::boards_of(&ctx.store, &user).unwrap().len(), 1);
    assert_eq!(
        associations::owner_of(&ctx.store, &board).unwrap().map(|u| u.id),
        Some(Some(user_id))
    );

    ctx.repo::<User>().force_destroy(user_id).unwrap();

    let board = ctx.repo::<Board>().find(board.id.unwrap()).unwrap().unwrap();
    assert_eq!(board.user_id, None);
    assert_eq!(board.kind, Some(BoardType::Street));
    assert_eq!(ctx.store.count("rides", &RowQuery::new()).unwrap(), 0);
    assert_eq!(ctx.store.count("pushTokens", &RowQuery::new()).unwrap(), 0);
    assert!(associations::owner_of(&ctx.store, &board).unwrap().is_none());
}

#[test]
fn test_soft_deleted_owner_is_hidden() {
    let ctx = TestContext::migrated();
    let user = ctx.user("ghost@example.com");
    let board = ctx
        .repo::<Board>()
        .create(&Board::new("SN-9").owned_by(user.id.unwrap()))
        .unwrap();

    ctx.repo::<User>().destroy(user.id.unwrap()).unwrap();
    assert!(associations::owner_of(&ctx.store, &board).unwrap().is_none());
    assert_eq!(board.user_id, user.id);
}

#[test]
fn test_mileage_board_since_unique() {
    let ctx = TestContext::migrated();
    let mileages = ctx.repo::<Mileage>();
    let since = Utc.with_ymd_and_hms(2018, 12, 1, 8, 0, 0).unwrap();

    let mut reading = Mileage::new("BT-0042", 120.5);
    reading.difference = Some(3.2);
    reading.difference_since = Some(since);
    mileages.create(&reading).unwrap();
    assert!(unique_violation(mileages.create(&reading)));

    // readings without a baseline never collide
    mileages.create(&Mileage::new("BT-0042", 121.0)).unwrap();
    mileages.create(&Mileage::new("BT-0042", 122.0)).unwrap();

    let readings = mileages.list(Mileage::for_board("BT-0042")).unwrap();
    assert_eq!(readings.len(), 3);
    assert_eq!(readings.iter().filter(|m| m.difference_since == Some(since)).count(), 1);
}

#[test]
fn test_mileage_filter_by_serialized_timestamp() {
    let ctx = TestContext::migrated();
    let mileages = ctx.repo::<Mileage>();
    let since = Utc.with_ymd_and_hms(2018, 12, 1, 8, 0, 0).unwrap();

    let mut reading = Mileage::new("BT-0042", 120.5);
    reading.difference_since = Some(since);
    mileages.create(&reading).unwrap();
    mileages.create(&Mileage::new("BT-0042", 121.0)).unwrap();

    let by_serde = RowQuery::new().eq("differenceSince", serde_json::to_value(since).unwrap());
    assert_eq!(mileages.list(by_serde).unwrap().len(), 1);

    let by_rfc3339 = RowQuery::new().eq("differenceSince", since.to_rfc3339());
    assert_eq!(mileages.count(by_rfc3339).unwrap(), 1);

    let later = RowQuery::new().filter(Predicate::Gte(
        "differenceSince".into(),
        json!("2018-12-01T09:00:00+01:00"),
    ));
    assert_eq!(mileages.count(later).unwrap(), 1);
}

#[test]
fn test_spot_filter_by_lowercase_location() {
    let ctx = TestContext::migrated();
    let spots = ctx.repo::<Spot>();
    let coordinates = Coordinates::from_pair([13.4, 52.52]).unwrap();
    let created = spots.create(&Spot::new(SpotType::Hazard, coordinates)).unwrap();

    let lowercase = created.location.as_stored().to_ascii_lowercase();
    let found = spots.list(RowQuery::new().eq("location", lowercase)).unwrap();
    assert_eq!(found, vec![created]);
}

#[test]
fn test_rides_newest_first() {
    let ctx = TestContext::migrated();
    let user = ctx.user("commuter@example.com");
    let rides = ctx.repo::<Ride>();
    let start = Utc.with_ymd_and_hms(2018, 6, 7, 8, 0, 0).unwrap();

    for day in 0..3 {
        let mut ride = Ride::new(start + Duration::days(day));
        ride.user_id = user.id;
        rides.create(&ride).unwrap();
    }

    let listed = rides.list(Ride::for_user(user.id.unwrap())).unwrap();
    let starts: Vec<_> = listed.iter().map(|r| r.start_time).collect();
    assert_eq!(
        starts,
        vec![start + Duration::days(2), start + Duration::days(1), start]
    );
}

#[test]
fn test_visible_events() {
    let ctx = TestContext::migrated();
    let events = ctx.repo::<Event>();
    let now = Utc.with_ymd_and_hms(2019, 5, 1, 12, 0, 0).unwrap();

    events
        .create(&Event::new("Group ride", now + Duration::days(7)).published_at(now - Duration::hours(1)))
        .unwrap();
    events
        .create(&Event::new("Night ride", now + Duration::days(3)).published_at(now - Duration::days(2)))
        .unwrap();
    events
        .create(&Event::new("Embargoed", now + Duration::days(1)).published_at(now + Duration::hours(1)))
        .unwrap();
    events.create(&Event::new("Draft", now)).unwrap();

    let visible = events.list(Event::visible(now)).unwrap();
    let names: Vec<_> = visible.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Night ride", "Group ride"]);
    assert!(visible.iter().all(|e| e.is_visible(now)));
    assert_eq!(events.count(RowQuery::new()).unwrap(), 4);
}

#[test]
fn test_enabled_push_tokens() {
    let ctx = TestContext::migrated();
    let user = ctx.user("phones@example.com");
    let user_id = user.id.unwrap();
    let tokens = ctx.repo::<PushToken>();

    tokens.create(&PushToken::new("apns-a", Platform::Ios, user_id)).unwrap();
    let mut disabled = PushToken::new("fcm-b", Platform::Android, user_id);
    disabled.enabled = false;
    tokens.create(&disabled).unwrap();

    let enabled = tokens.list(PushToken::enabled_for_user(user_id)).unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].token, "apns-a");
    assert_eq!(associations::push_tokens_of(&ctx.store, &user).unwrap().len(), 2);
    assert!(unique_violation(
        tokens.create(&PushToken::new("apns-a", Platform::Ios, user_id))
    ));
}

#[test]
fn test_city_subscriptions() {
    let ctx = TestContext::migrated();
    let user = ctx.user("local@example.com");
    let cities = ctx.repo::<City>();

    let berlin = cities
        .create(&City::new("Berlin", Coordinates::new(13.4, 52.52).unwrap(), 25.0, "Europe/Berlin"))
        .unwrap();
    cities
        .create(&City::new("Paris", Coordinates::new(2.35, 48.86).unwrap(), 20.0, "Europe/Paris"))
        .unwrap();
    ctx.repo::<CitySubscription>()
        .create(&CitySubscription::new(user.id.unwrap(), berlin.id.unwrap()))
        .unwrap();

    let followed = associations::cities_of(&ctx.store, &user).unwrap();
    assert_eq!(followed.len(), 1);
    assert_eq!(followed[0].name, "Berlin");
    assert_eq!(followed[0].center().unwrap().to_pair(), [13.4, 52.52]);
    assert_eq!(followed[0].to_json().unwrap()["center"], json!([13.4, 52.52]));

    assert!(unique_violation(cities.create(&City::new(
        "Berlin",
        Coordinates::new(13.4, 52.52).unwrap(),
        5.0,
        "Europe/Berlin"
    ))));
}

#[test]
fn test_event_registrations_and_messages() {
    let ctx = TestContext::migrated();
    let alice = ctx.user("alice@example.com");
    let bob = ctx.user("bob@example.com");
    let event = ctx
        .repo::<Event>()
        .create(&Event::new("Meetup", Utc::now()))
        .unwrap();
    let event_id = event.id.unwrap();

    let registrations = ctx.repo::<EventRegistration>();
    registrations
        .create(&EventRegistration::new(event_id, alice.id.unwrap()))
        .unwrap();
    registrations
        .create(&EventRegistration::new(event_id, bob.id.unwrap()))
        .unwrap();
    assert!(unique_violation(
        registrations.create(&EventRegistration::new(event_id, alice.id.unwrap()))
    ));
    assert_eq!(associations::registrations_of(&ctx.store, &event).unwrap().len(), 2);

    let messages = ctx.repo::<MessageInteraction>();
    messages
        .create(&MessageInteraction::new(event_id, alice.id.unwrap()))
        .unwrap();
    messages
        .create(&MessageInteraction::new(event_id, bob.id.unwrap()))
        .unwrap();
    ctx.repo::<User>().destroy(bob.id.unwrap()).unwrap();

    let messaged = associations::messaged_users_of(&ctx.store, &event).unwrap();
    assert_eq!(messaged.len(), 1);
    assert_eq!(messaged[0].email, "alice@example.com");

    // deleting the event removes its join rows
    ctx.repo::<Event>().force_destroy(event_id).unwrap();
    assert_eq!(ctx.store.count("eventRegistrations", &RowQuery::new()).unwrap(), 0);
    assert_eq!(ctx.store.count("messageInteractions", &RowQuery::new()).unwrap(), 0);
}

#[test]
fn test_invalid_values_are_rejected() {
    let ctx = TestContext::migrated();
    let now = "2019-05-01T12:00:00Z";

    let row = json!({"serial": "SN-3", "type": "hover", "createdAt": now, "updatedAt": now});
    let err = ctx
        .store
        .insert("boards", row.as_object().cloned().unwrap())
        .unwrap_err();
    assert!(
        matches!(&err, Error::ConstraintViolation(ConstraintError::InvalidValue { column, .. }) if column == "type"),
        "{err}"
    );

    let row = json!({"email": "a@example.com", "nickname": "a", "createdAt": now, "updatedAt": now});
    assert!(ctx
        .store
        .insert("users", row.as_object().cloned().unwrap())
        .is_err());

    let row = json!({"serial": "SN-4", "userId": 99, "createdAt": now, "updatedAt": now});
    let err = ctx
        .store
        .insert("boards", row.as_object().cloned().unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ConstraintViolation(ConstraintError::ForeignKeyViolation { .. })
    ));
}
