//! Integration tests for the migration engine against the embedded store.

use boardtrack_core::catalog::{ColumnDef, ColumnType, DeleteBehavior, Schema, TableDef};
use boardtrack_core::migration::{
    steps, DownTarget, MigrationConfig, MigrationEngine, MigrationError, MigrationStep,
    MigrationWarning, SchemaBackend, SchemaBuilder, StepState,
};
use boardtrack_core::schema_catalog;
use boardtrack_core::storage::{EmbeddedStore, Row, RowQuery, RowStore, StoreConfig};
use pretty_assertions::assert_eq;
use serde_json::json;

fn store() -> EmbeddedStore {
    EmbeddedStore::temporary().unwrap()
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn version_of(name: &str) -> &'static str {
    steps::all()
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.version)
        .unwrap()
}

#[test]
fn test_full_round_trip_returns_to_baseline() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());

    let up = engine.up(None).unwrap();
    assert_eq!(up.steps.len(), 25);
    assert_eq!(
        store.state().unwrap().schema.normalized(),
        schema_catalog().normalized()
    );

    let down = engine.down(DownTarget::Baseline).unwrap();
    assert_eq!(down.steps.len(), 25);
    assert_eq!(down.versions().first(), Some(&"20190904160000"));
    assert_eq!(down.versions().last(), Some(&"20180315090000"));

    let state = store.state().unwrap();
    assert_eq!(state.schema, Schema::new());
    assert!(state.tables.is_empty());
    assert_eq!(engine.status().unwrap().pending_count(), 25);
}

#[test]
fn test_up_is_idempotent() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());

    engine.up(None).unwrap();
    let again = engine.up(None).unwrap();
    assert!(again.is_empty());
    assert_eq!(
        engine.status().unwrap().current_version(),
        Some("20190904160000")
    );
}

#[test]
fn test_up_to_target_and_continue() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());

    let report = engine.up(Some("20180502094500")).unwrap();
    assert_eq!(report.steps.len(), 9);
    assert_eq!(
        engine.status().unwrap().current_version(),
        Some("20180502094500")
    );
    assert!(store.state().unwrap().schema.enum_type("enum_boards_type").is_some());

    let report = engine.up(Some("20180516120000-boards-serial-unique")).unwrap();
    assert_eq!(report.versions(), vec!["20180516120000"]);

    let report = engine.up(None).unwrap();
    assert_eq!(report.steps.len(), 15);
}

#[test]
fn test_unknown_target_is_rejected() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());

    let err = engine.up(Some("19990101000000")).unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTarget(v) if v == "19990101000000"));
    let err = engine
        .down(DownTarget::Version("nope".into()))
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownTarget(_)));
    assert!(store.state().unwrap().schema.is_empty());
}

#[test]
fn test_down_targets() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());
    engine.up(None).unwrap();

    let last = engine.down(DownTarget::Last).unwrap();
    assert_eq!(last.versions(), vec!["20190904160000"]);

    let partial = engine
        .down(DownTarget::Version(version_of("add-role-to-users").to_string()))
        .unwrap();
    assert_eq!(
        partial.versions(),
        vec![
            "20190619111500",
            "20190522093000",
            "20190410141500",
            "20190410140000",
            "20190306100000",
            "20190306094500",
        ]
    );
    assert_eq!(
        engine.status().unwrap().current_version(),
        Some("20190123113000")
    );
    let schema = store.state().unwrap().schema;
    assert!(schema.table("cities").is_none());
    assert!(schema.table("users").unwrap().has_column("role"));
}

#[test]
fn test_down_on_empty_ledger_does_nothing() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());
    assert!(engine.down(DownTarget::Last).unwrap().is_empty());
    assert!(engine.down(DownTarget::Baseline).unwrap().is_empty());
}

#[test]
fn test_enum_types_follow_their_columns() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());

    engine.up(Some("20180502093000")).unwrap();
    assert!(store
        .state()
        .unwrap()
        .schema
        .enum_type("enum_boards_purchaseLocation")
        .is_some());

    engine.down(DownTarget::Last).unwrap();
    let schema = store.state().unwrap().schema;
    assert!(schema.enums.is_empty());
    assert!(!schema.table("boards").unwrap().has_column("purchaseLocation"));
}

#[test]
fn test_dry_run_executes_nothing() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all())
        .with_config(MigrationConfig::default().dry_run(true));

    // dry runs do not take the lock
    assert!(store.try_lock().unwrap());
    let report = engine.up(None).unwrap();
    store.unlock().unwrap();

    assert!(report.dry_run);
    assert_eq!(report.steps.len(), 25);
    assert!(report.steps[0].statements[0].starts_with("CREATE TABLE \"users\""));
    assert!(report.steps[7].statements[0]
        .starts_with("CREATE TYPE \"enum_boards_purchaseLocation\" AS ENUM"));
    assert!(store.state().unwrap().schema.is_empty());
    assert_eq!(engine.status().unwrap().pending_count(), 25);
}

#[test]
fn test_dry_run_down_renders_revert_plan() {
    let store = store();
    MigrationEngine::new(&store, steps::all()).up(None).unwrap();

    let engine = MigrationEngine::new(&store, steps::all())
        .with_config(MigrationConfig::default().dry_run(true));
    let report = engine.down(DownTarget::Last).unwrap();
    assert_eq!(
        report.steps[0].statements,
        vec!["ALTER TABLE \"citySubscriptions\" ADD COLUMN \"deletedAt\" TIMESTAMP WITH TIME ZONE;"]
    );
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(engine.status().unwrap().pending_count(), 0);
}

#[test]
fn test_lock_held_by_another_run() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());

    assert!(store.try_lock().unwrap());
    assert!(matches!(engine.up(None), Err(MigrationError::Locked)));
    assert!(matches!(
        engine.down(DownTarget::Baseline),
        Err(MigrationError::Locked)
    ));
    assert!(store.state().unwrap().schema.is_empty());

    store.unlock().unwrap();
    assert_eq!(engine.up(None).unwrap().steps.len(), 25);
    // the engine released its own lock
    assert!(store.try_lock().unwrap());
}

#[test]
fn test_lossy_revert_warns_and_purges() {
    let store = store();
    let engine = MigrationEngine::new(&store, steps::all());
    engine.up(Some("20190619111500")).unwrap();

    let now = "2019-08-01T12:00:00Z";
    store
        .insert(
            "citySubscriptions",
            row(json!({"createdAt": now, "updatedAt": now})),
        )
        .unwrap();
    store
        .insert(
            "citySubscriptions",
            row(json!({"createdAt": now, "updatedAt": now, "deletedAt": now})),
        )
        .unwrap();

    let up = engine.up(None).unwrap();
    assert!(up.warnings.is_empty());
    assert_eq!(store.count("citySubscriptions", &RowQuery::new()).unwrap(), 1);

    let down = engine.down(DownTarget::Last).unwrap();
    assert_eq!(
        down.warnings,
        vec![MigrationWarning::LossyRevert {
            version: "20190904160000".into(),
            detail: "soft-deleted citySubscriptions rows purged on apply are not restored".into(),
        }]
    );
    let rows = store.select("citySubscriptions", &RowQuery::new()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("deletedAt"), Some(&serde_json::Value::Null));
}

fn create_widgets(s: &mut SchemaBuilder) {
    s.create_enum("enum_widgets_kind", ["small", "large"])
        .create_table(
            TableDef::new("widgets")
                .with_column(ColumnDef::id())
                .with_column(ColumnDef::new("kind", ColumnType::enum_type("enum_widgets_kind")))
                .with_column(ColumnDef::foreign_key("gadgetId", "gadgets", DeleteBehavior::Cascade)),
        );
}

fn drop_widgets(s: &mut SchemaBuilder) {
    s.drop_table("widgets").drop_enum("enum_widgets_kind");
}

#[test]
fn test_failed_step_drops_created_enum() {
    let store = store();
    let broken = [MigrationStep::new(
        "20200101000000",
        "create-widgets",
        create_widgets,
        drop_widgets,
    )];
    let engine = MigrationEngine::new(&store, &broken);

    let err = engine.up(None).unwrap_err();
    assert!(
        matches!(&err, MigrationError::SchemaConflict { version, .. } if version == "20200101000000"),
        "{err}"
    );

    let schema = store.state().unwrap().schema;
    assert!(schema.enums.is_empty());
    assert!(schema.tables.is_empty());
    assert_eq!(engine.status().unwrap().pending_count(), 1);
}

#[test]
fn test_failure_stops_at_last_recorded_step() {
    let store = store();
    let mut sequence: Vec<MigrationStep> = steps::all()[..2].to_vec();
    sequence.push(MigrationStep::new(
        "20180315090150",
        "create-widgets",
        create_widgets,
        drop_widgets,
    ));
    sequence.extend_from_slice(&steps::all()[2..4]);
    let engine = MigrationEngine::new(&store, &sequence);

    assert!(engine.up(None).is_err());
    let status = engine.status().unwrap();
    assert_eq!(status.current_version(), Some("20180315090100"));
    assert_eq!(status.pending_count(), 3);
    assert!(store.state().unwrap().schema.table("rides").is_none());
}

fn create_kinds(s: &mut SchemaBuilder) {
    s.create_enum("enum_widgets_kind", ["small", "large"]).create_table(
        TableDef::new("widgets")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("kind", ColumnType::enum_type("enum_widgets_kind"))),
    );
}

fn drop_kinds(s: &mut SchemaBuilder) {
    s.drop_table("widgets").drop_enum("enum_widgets_kind");
}

fn create_sized_gadgets(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("gadgets")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("size", ColumnType::enum_type("enum_widgets_kind"))),
    );
}

#[test]
fn test_enum_left_behind_after_commit_is_reported() {
    let store = store();
    let sequence = [
        MigrationStep::new("20200101000000", "create-widgets", create_kinds, drop_kinds),
        MigrationStep::new("20200102000000", "create-gadgets", create_sized_gadgets, drop_gadgets),
        MigrationStep::new("20200103000000", "retire-widgets", drop_kinds, create_kinds),
    ];
    let engine = MigrationEngine::new(&store, &sequence);

    let err = engine.up(None).unwrap_err();
    match &err {
        MigrationError::EnumDropFailed {
            version, type_name, ..
        } => {
            assert_eq!(version, "20200103000000");
            assert_eq!(type_name, "enum_widgets_kind");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("DROP TYPE \"enum_widgets_kind\""));

    let status = engine.status().unwrap();
    assert_eq!(status.current_version(), Some("20200103000000"));
    let schema = store.state().unwrap().schema;
    assert!(schema.table("widgets").is_none());
    assert!(schema.enum_type("enum_widgets_kind").is_some());
}

fn create_users_differently(s: &mut SchemaBuilder) {
    s.create_table(
        TableDef::new("users")
            .with_column(ColumnDef::id())
            .with_column(ColumnDef::new("email", ColumnType::Text)),
    );
}

fn drop_users(s: &mut SchemaBuilder) {
    s.drop_table("users");
}

fn create_gadgets(s: &mut SchemaBuilder) {
    s.create_table(TableDef::new("gadgets").with_column(ColumnDef::id()));
}

fn drop_gadgets(s: &mut SchemaBuilder) {
    s.drop_table("gadgets");
}

#[test]
fn test_changed_step_is_a_desync() {
    let store = store();
    MigrationEngine::new(&store, steps::all())
        .up(Some("20180315090100"))
        .unwrap();

    let mut edited: Vec<MigrationStep> = steps::all().to_vec();
    edited[0] = MigrationStep::new(
        "20180315090000",
        "create-users",
        create_users_differently,
        drop_users,
    );
    let engine = MigrationEngine::new(&store, &edited);

    assert!(matches!(
        engine.up(None),
        Err(MigrationError::LedgerDesync(_))
    ));
    let status = engine.status().unwrap();
    assert!(matches!(status.steps[0].state, StepState::ChecksumMismatch(_)));
    assert!(matches!(status.steps[1].state, StepState::Applied(_)));
}

#[test]
fn test_orphaned_ledger_version_is_a_desync() {
    let store = store();
    MigrationEngine::new(&store, steps::all()).up(None).unwrap();

    let engine = MigrationEngine::new(&store, &steps::all()[..24]);
    let status = engine.status().unwrap();
    assert_eq!(status.orphaned.len(), 1);
    assert_eq!(status.orphaned[0].version, "20190904160000");
    assert!(matches!(
        engine.down(DownTarget::Last),
        Err(MigrationError::LedgerDesync(_))
    ));
}

#[test]
fn test_missing_step_below_applied_is_a_desync() {
    let store = store();
    MigrationEngine::new(&store, steps::all())
        .up(Some("20180315090200"))
        .unwrap();

    let mut sequence: Vec<MigrationStep> = steps::all().to_vec();
    sequence.insert(
        1,
        MigrationStep::new("20180315090050", "create-gadgets", create_gadgets, drop_gadgets),
    );
    let engine = MigrationEngine::new(&store, &sequence);
    assert!(matches!(engine.up(None), Err(MigrationError::LedgerDesync(_))));
}

#[test]
fn test_unordered_sequence_is_rejected() {
    let store = store();
    let mut sequence: Vec<MigrationStep> = steps::all()[..3].to_vec();
    sequence.swap(0, 2);
    let engine = MigrationEngine::new(&store, &sequence);
    assert!(matches!(
        engine.up(None),
        Err(MigrationError::InvalidSequence(_))
    ));
}

#[test]
fn test_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = EmbeddedStore::open(StoreConfig::new(dir.path())).unwrap();
        MigrationEngine::new(&store, steps::all())
            .up(Some("20180711100000"))
            .unwrap();
    }

    let store = EmbeddedStore::open(StoreConfig::new(dir.path())).unwrap();
    let engine = MigrationEngine::new(&store, steps::all());
    let status = engine.status().unwrap();
    assert_eq!(status.current_version(), Some("20180711100000"));
    assert_eq!(status.pending_count(), 12);
    assert_eq!(engine.up(None).unwrap().steps.len(), 12);
}
