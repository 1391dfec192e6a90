//! Loading files written at older schema versions.

use crate::common::*;

#[test]
fn v1_file_loads_as_v2_with_empty_unlocked_items() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.sav");
    write_document(
        &path,
        &SaveDocument::new(1)
            .with_field(LEVEL, 3i64)
            .with_field(EXPERIENCE, 150i64),
    );

    let c = open(dir.path(), Player::default());
    let completion = finish(&c, &c.load("slot1").unwrap());

    let report = completion.load_report().expect("load succeeded");
    assert_eq!(report.loaded_from_version, 1);
    assert_eq!(report.schema_version, 2);
    assert_eq!(report.steps_applied, 1);
    assert!(report.migrated());

    c.with_state(|p| {
        assert_eq!(p.level, 3);
        assert_eq!(p.experience, 150);
        assert!(p.unlocked.is_empty());
        assert_eq!(p.loads, 1);
    });
}

#[test]
fn migrated_load_does_not_rewrite_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.sav");
    write_document(&path, &SaveDocument::new(1).with_field(LEVEL, 5i64));
    let before = std::fs::read(&path).unwrap();

    let c = open(dir.path(), Player::default());
    assert!(finish(&c, &c.load("slot1").unwrap()).is_success());

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn v1_file_missing_experience_gets_default() {
    let dir = TempDir::new().unwrap();
    write_document(
        &dir.path().join("slot1.sav"),
        &SaveDocument::new(1).with_field(LEVEL, 8i64),
    );

    let c = open(dir.path(), Player::new(0, 999));
    assert!(finish(&c, &c.load("slot1").unwrap()).is_success());
    c.with_state(|p| {
        assert_eq!(p.level, 8);
        assert_eq!(p.experience, 0);
    });
}

#[test]
fn resave_after_migration_stamps_current_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slot1.sav");
    write_document(&path, &SaveDocument::new(1).with_field(LEVEL, 2i64));

    let c = open(dir.path(), Player::default());
    assert!(finish(&c, &c.load("slot1").unwrap()).is_success());
    assert!(finish(&c, &c.save("slot1").unwrap()).is_success());

    let doc = read_document(&path);
    assert_eq!(doc.schema_version(), 2);
    assert_eq!(doc.get(LEVEL), Some(&Value::Int(2)));
    assert_eq!(doc.get(UNLOCKED), Some(&Value::empty_sequence()));
}

#[test]
fn file_from_unknown_future_version_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    write_document(
        &dir.path().join("slot1.sav"),
        &SaveDocument::new(9).with_field(LEVEL, 1i64),
    );

    let c = open(dir.path(), Player::new(4, 40));
    let completion = finish(&c, &c.load("slot1").unwrap());

    let err = completion.error().expect("load fails");
    assert_eq!(err.stage(), Some(Stage::Migrate));
    c.with_state(|p| {
        assert_eq!(p.level, 4);
        assert_eq!(p.loads, 0);
    });
}
